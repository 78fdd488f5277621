//! Declarative stack descriptions handed to a [`crate::Provisioner`].
//!
//! Resource types and property shapes follow CloudFormation, so a
//! descriptor renders directly into a template.

use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackDescriptor {
    pub name: String,
    pub description: String,
    pub resources: Vec<ResourceDescriptor>,
    pub outputs: Vec<OutputDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceDescriptor {
    pub logical_id: String,
    pub kind: ResourceKind,
    pub properties: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputDescriptor {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    Vpc,
    InternetGateway,
    GatewayAttachment,
    Subnet,
    RouteTable,
    Route,
    SubnetRouteTableAssociation,
    Eip,
    NatGateway,
    SecurityGroup,
    Cluster,
    Repository,
    LoadBalancer,
    TargetGroup,
    Listener,
    Role,
    LogGroup,
    TaskDefinition,
    Service,
}

impl ResourceKind {
    /// CloudFormation resource type name.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Vpc => "AWS::EC2::VPC",
            Self::InternetGateway => "AWS::EC2::InternetGateway",
            Self::GatewayAttachment => "AWS::EC2::VPCGatewayAttachment",
            Self::Subnet => "AWS::EC2::Subnet",
            Self::RouteTable => "AWS::EC2::RouteTable",
            Self::Route => "AWS::EC2::Route",
            Self::SubnetRouteTableAssociation => "AWS::EC2::SubnetRouteTableAssociation",
            Self::Eip => "AWS::EC2::EIP",
            Self::NatGateway => "AWS::EC2::NatGateway",
            Self::SecurityGroup => "AWS::EC2::SecurityGroup",
            Self::Cluster => "AWS::ECS::Cluster",
            Self::Repository => "AWS::ECR::Repository",
            Self::LoadBalancer => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            Self::TargetGroup => "AWS::ElasticLoadBalancingV2::TargetGroup",
            Self::Listener => "AWS::ElasticLoadBalancingV2::Listener",
            Self::Role => "AWS::IAM::Role",
            Self::LogGroup => "AWS::Logs::LogGroup",
            Self::TaskDefinition => "AWS::ECS::TaskDefinition",
            Self::Service => "AWS::ECS::Service",
        }
    }
}

impl StackDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            resources: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn resource(&mut self, logical_id: impl Into<String>, kind: ResourceKind, properties: Value) {
        self.resources.push(ResourceDescriptor {
            logical_id: logical_id.into(),
            kind,
            properties,
            depends_on: Vec::new(),
        });
    }

    pub fn resource_after(
        &mut self,
        logical_id: impl Into<String>,
        kind: ResourceKind,
        properties: Value,
        depends_on: &[&str],
    ) {
        self.resources.push(ResourceDescriptor {
            logical_id: logical_id.into(),
            kind,
            properties,
            depends_on: depends_on.iter().map(|s| (*s).to_owned()).collect(),
        });
    }

    pub fn output(&mut self, key: impl Into<String>, value: Value) {
        self.outputs.push(OutputDescriptor {
            key: key.into(),
            value,
        });
    }

    pub fn find(&self, logical_id: &str) -> Option<&ResourceDescriptor> {
        self.resources.iter().find(|r| r.logical_id == logical_id)
    }

    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceDescriptor> {
        self.resources.iter().filter(move |r| r.kind == kind)
    }
}

// ── Intrinsic functions ──

pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn join(separator: &str, values: Vec<Value>) -> Value {
    json!({ "Fn::Join": [separator, values] })
}

pub fn stack_region() -> Value {
    reference("AWS::Region")
}
