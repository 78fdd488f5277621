//! Shared infrastructure layer: cluster, registry repository and load balancer.

use ecsroll_core::{FixedConfig, LoadBalancerConfig};
use serde::Serialize;
use serde_json::json;

use crate::collaborator::{Provisioner, StackHandle};
use crate::descriptor::{ResourceKind, StackDescriptor, get_att, reference};
use crate::error::{DeployError, Layer};
use crate::network::NetworkHandle;
use crate::outputs;

/// Read-only view of the shared infrastructure consumed by the service layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfraHandle {
    pub cluster_name: String,
    pub cluster_arn: String,
    pub target_group_arn: String,
    pub load_balancer_dns: String,
    /// Security group of the load balancer, the only allowed ingress source
    /// of the service.
    pub security_group_id: String,
    pub repository_name: String,
}

/// Template of the infrastructure stack. Independent of any image tag.
pub fn descriptor(
    stack_name: &str,
    network: &NetworkHandle,
    load_balancer: &LoadBalancerConfig,
    fixed: &FixedConfig,
) -> StackDescriptor {
    let mut stack = StackDescriptor::new(stack_name, "ecsroll infrastructure layer");
    let listener_port = load_balancer.listener_port;

    stack.resource("Cluster", ResourceKind::Cluster, json!({}));
    stack.resource(
        "Repository",
        ResourceKind::Repository,
        json!({
            "RepositoryName": fixed.repository,
            "ImageScanningConfiguration": { "ScanOnPush": true },
        }),
    );
    stack.resource(
        "LoadBalancerSecurityGroup",
        ResourceKind::SecurityGroup,
        json!({
            "GroupDescription": format!("{stack_name} load balancer"),
            "VpcId": network.vpc_id,
            "SecurityGroupIngress": [{
                "IpProtocol": "tcp",
                "FromPort": listener_port,
                "ToPort": listener_port,
                "CidrIp": "0.0.0.0/0",
                "Description": "Allow inbound HTTP from anywhere",
            }],
        }),
    );

    let (scheme, subnets) = if load_balancer.public {
        ("internet-facing", &network.public_subnet_ids)
    } else {
        ("internal", &network.private_subnet_ids)
    };
    stack.resource(
        "LoadBalancer",
        ResourceKind::LoadBalancer,
        json!({
            "Type": "application",
            "Scheme": scheme,
            "Subnets": subnets,
            "SecurityGroups": [get_att("LoadBalancerSecurityGroup", "GroupId")],
        }),
    );
    stack.resource(
        "TargetGroup",
        ResourceKind::TargetGroup,
        json!({
            "TargetType": "ip",
            "Protocol": "HTTP",
            "Port": fixed.port,
            "VpcId": network.vpc_id,
            "HealthCheckProtocol": "HTTP",
            "HealthCheckPath": load_balancer.health_check_path,
        }),
    );
    stack.resource(
        "Listener",
        ResourceKind::Listener,
        json!({
            "LoadBalancerArn": reference("LoadBalancer"),
            "Port": listener_port,
            "Protocol": "HTTP",
            "DefaultActions": [{
                "Type": "forward",
                "TargetGroupArn": reference("TargetGroup"),
            }],
        }),
    );

    stack.output("ClusterName", reference("Cluster"));
    stack.output("ClusterArn", get_att("Cluster", "Arn"));
    stack.output("TargetGroupArn", reference("TargetGroup"));
    stack.output("LoadBalancerDns", get_att("LoadBalancer", "DNSName"));
    stack.output(
        "SecurityGroupId",
        get_att("LoadBalancerSecurityGroup", "GroupId"),
    );
    stack.output("RepositoryName", reference("Repository"));

    stack
}

pub async fn materialize<P: Provisioner>(
    provisioner: &P,
    stack_name: &str,
    network: &NetworkHandle,
    load_balancer: &LoadBalancerConfig,
    fixed: &FixedConfig,
) -> Result<InfraHandle, DeployError> {
    tracing::info!(stack = stack_name, "materializing infrastructure layer");
    let stack = descriptor(stack_name, network, load_balancer, fixed);
    let handle = provisioner
        .create_or_update(&stack)
        .await
        .map_err(|e| DeployError::Provision {
            layer: Layer::Infra,
            source: e,
        })?;
    read(provisioner, &handle).await
}

/// Reference the existing infrastructure without touching it.
pub async fn resolve<P: Provisioner>(
    provisioner: &P,
    stack_name: &str,
) -> Result<InfraHandle, DeployError> {
    let handle = outputs::locate(provisioner, Layer::Infra, stack_name).await?;
    read(provisioner, &handle).await
}

async fn read<P: Provisioner>(
    provisioner: &P,
    handle: &StackHandle,
) -> Result<InfraHandle, DeployError> {
    let layer = Layer::Infra;
    Ok(InfraHandle {
        cluster_name: outputs::require(provisioner, layer, handle, "ClusterName").await?,
        cluster_arn: outputs::require(provisioner, layer, handle, "ClusterArn").await?,
        target_group_arn: outputs::require(provisioner, layer, handle, "TargetGroupArn").await?,
        load_balancer_dns: outputs::require(provisioner, layer, handle, "LoadBalancerDns").await?,
        security_group_id: outputs::require(provisioner, layer, handle, "SecurityGroupId").await?,
        repository_name: outputs::require(provisioner, layer, handle, "RepositoryName").await?,
    })
}
