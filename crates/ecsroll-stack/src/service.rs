//! Per-deployment service layer: task definition, service and its security group.
//!
//! This is the only layer whose descriptor depends on the image tag. It
//! receives the upstream handles by shared reference and refers to upstream
//! resources by id only; it never declares a network or infrastructure
//! resource of its own.

use ecsroll_core::{DeploymentSpec, RevisionIdentity, ServiceConfig};
use serde::Serialize;
use serde_json::json;

use crate::collaborator::{Provisioner, PullableImage, ServiceReference, StackHandle};
use crate::descriptor::{ResourceKind, StackDescriptor, get_att, reference, stack_region};
use crate::error::{DeployError, Layer};
use crate::infra::InfraHandle;
use crate::network::NetworkHandle;
use crate::outputs;

const TASK_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";
const EXECUTION_POLICY: &str =
    "arn:${AWS::Partition}:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";
const LOG_RETENTION_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHandle {
    pub cluster_name: String,
    pub service_name: String,
    pub service_arn: String,
}

impl ServiceHandle {
    pub fn reference(&self) -> ServiceReference {
        ServiceReference {
            cluster: self.cluster_name.clone(),
            service_name: self.service_name.clone(),
            service_arn: self.service_arn.clone(),
        }
    }
}

/// Logical id of the task definition.
///
/// Embedding the revision makes every new tag a new resource, which the
/// provisioning engine registers as a new task definition revision.
pub fn task_definition_id(revision: Option<&RevisionIdentity>) -> String {
    match revision {
        Some(rev) => format!("TaskDefinition{rev}"),
        None => "TaskDefinition".to_owned(),
    }
}

pub fn descriptor(
    stack_name: &str,
    network: &NetworkHandle,
    infra: &InfraHandle,
    spec: &DeploymentSpec,
    image: &PullableImage,
    revision: Option<&RevisionIdentity>,
    service: &ServiceConfig,
) -> StackDescriptor {
    let mut stack = StackDescriptor::new(stack_name, "ecsroll service layer");
    let task_definition = task_definition_id(revision);
    let assume_role = json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": TASK_PRINCIPAL },
            "Action": "sts:AssumeRole",
        }],
    });

    stack.resource(
        "TaskExecutionRole",
        ResourceKind::Role,
        json!({
            "AssumeRolePolicyDocument": assume_role,
            "ManagedPolicyArns": [{ "Fn::Sub": EXECUTION_POLICY }],
        }),
    );

    let mut task_statements = vec![json!({
        "Effect": "Allow",
        "Action": [
            "ecr:GetAuthorizationToken",
            "ecr:BatchCheckLayerAvailability",
            "ecr:GetDownloadUrlForLayer",
            "ecr:BatchGetImage",
        ],
        "Resource": "*",
    })];
    if service.enable_execute_command {
        task_statements.push(json!({
            "Effect": "Allow",
            "Action": [
                "ssmmessages:CreateControlChannel",
                "ssmmessages:CreateDataChannel",
                "ssmmessages:OpenControlChannel",
                "ssmmessages:OpenDataChannel",
            ],
            "Resource": "*",
        }));
    }
    stack.resource(
        "TaskRole",
        ResourceKind::Role,
        json!({
            "AssumeRolePolicyDocument": assume_role,
            "Policies": [{
                "PolicyName": "task",
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": task_statements,
                },
            }],
        }),
    );

    stack.resource(
        "LogGroup",
        ResourceKind::LogGroup,
        json!({ "RetentionInDays": LOG_RETENTION_DAYS }),
    );

    stack.resource(
        &task_definition,
        ResourceKind::TaskDefinition,
        json!({
            "Family": spec.family,
            "Cpu": spec.cpu.to_string(),
            "Memory": spec.memory.to_string(),
            "NetworkMode": "awsvpc",
            "RequiresCompatibilities": ["FARGATE"],
            "ExecutionRoleArn": get_att("TaskExecutionRole", "Arn"),
            "TaskRoleArn": get_att("TaskRole", "Arn"),
            "ContainerDefinitions": [{
                "Name": spec.container_name,
                "Image": image.0,
                "Essential": true,
                "PortMappings": [{
                    "ContainerPort": spec.port,
                    "Protocol": "tcp",
                }],
                "LogConfiguration": {
                    "LogDriver": spec.logging.driver,
                    "Options": {
                        "awslogs-group": reference("LogGroup"),
                        "awslogs-region": stack_region(),
                        "awslogs-stream-prefix": spec.logging.stream_prefix,
                    },
                },
            }],
        }),
    );

    stack.resource(
        "ServiceSecurityGroup",
        ResourceKind::SecurityGroup,
        json!({
            "GroupDescription": format!("{stack_name} service"),
            "VpcId": network.vpc_id,
            "SecurityGroupIngress": [{
                "IpProtocol": "tcp",
                "FromPort": spec.port,
                "ToPort": spec.port,
                "SourceSecurityGroupId": infra.security_group_id,
                "Description": "Allow inbound traffic from load balancer",
            }],
            "SecurityGroupEgress": [{
                "IpProtocol": "-1",
                "CidrIp": "0.0.0.0/0",
            }],
        }),
    );

    stack.resource(
        "Service",
        ResourceKind::Service,
        json!({
            "Cluster": infra.cluster_name,
            "TaskDefinition": reference(&task_definition),
            "DesiredCount": service.desired_count,
            "LaunchType": "FARGATE",
            "EnableExecuteCommand": service.enable_execute_command,
            "NetworkConfiguration": {
                "AwsvpcConfiguration": {
                    "AssignPublicIp": "DISABLED",
                    "Subnets": network.private_subnet_ids,
                    "SecurityGroups": [get_att("ServiceSecurityGroup", "GroupId")],
                },
            },
            "LoadBalancers": [{
                "ContainerName": spec.container_name,
                "ContainerPort": spec.port,
                "TargetGroupArn": infra.target_group_arn,
            }],
        }),
    );

    stack.output("ServiceName", get_att("Service", "Name"));
    stack.output("ServiceArn", reference("Service"));

    stack
}

/// Register the revision and point the service at it.
#[allow(clippy::too_many_arguments)]
pub async fn materialize<P: Provisioner>(
    provisioner: &P,
    stack_name: &str,
    network: &NetworkHandle,
    infra: &InfraHandle,
    spec: &DeploymentSpec,
    image: &PullableImage,
    revision: Option<&RevisionIdentity>,
    service: &ServiceConfig,
) -> Result<ServiceHandle, DeployError> {
    tracing::info!(family = %spec.family, "creating task definition");
    tracing::info!(image = %image, "using image");

    let stack = descriptor(stack_name, network, infra, spec, image, revision, service);
    let handle = provisioner
        .create_or_update(&stack)
        .await
        .map_err(|e| DeployError::Provision {
            layer: Layer::Service,
            source: e,
        })?;
    read(provisioner, &handle, &infra.cluster_name).await
}

/// Reference the existing service stack without touching it.
pub async fn resolve<P: Provisioner>(
    provisioner: &P,
    stack_name: &str,
    cluster_name: &str,
) -> Result<ServiceHandle, DeployError> {
    let handle = outputs::locate(provisioner, Layer::Service, stack_name).await?;
    read(provisioner, &handle, cluster_name).await
}

async fn read<P: Provisioner>(
    provisioner: &P,
    handle: &StackHandle,
    cluster_name: &str,
) -> Result<ServiceHandle, DeployError> {
    Ok(ServiceHandle {
        cluster_name: cluster_name.to_owned(),
        service_name: outputs::require(provisioner, Layer::Service, handle, "ServiceName").await?,
        service_arn: outputs::require(provisioner, Layer::Service, handle, "ServiceArn").await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecsroll_core::{ImageTag, RevisionLength, derive_revision_identity};

    fn network() -> NetworkHandle {
        NetworkHandle {
            vpc_id: "vpc-1".to_owned(),
            cidr: "10.0.0.0/16".to_owned(),
            availability_zones: vec!["us-east-2a".to_owned(), "us-east-2b".to_owned()],
            public_subnet_ids: vec!["subnet-pub-a".to_owned(), "subnet-pub-b".to_owned()],
            private_subnet_ids: vec!["subnet-priv-a".to_owned(), "subnet-priv-b".to_owned()],
        }
    }

    fn infra() -> InfraHandle {
        InfraHandle {
            cluster_name: "app-cluster".to_owned(),
            cluster_arn: "arn:aws:ecs:us-east-2:1:cluster/app-cluster".to_owned(),
            target_group_arn: "arn:aws:elasticloadbalancing:tg/app".to_owned(),
            load_balancer_dns: "app-123.us-east-2.elb.amazonaws.com".to_owned(),
            security_group_id: "sg-lb".to_owned(),
            repository_name: "ecsroll-app".to_owned(),
        }
    }

    fn render(tag: &str, with_revision: bool) -> StackDescriptor {
        let config = ServiceConfig::default();
        let tag = ImageTag::new(tag).unwrap();
        let spec = DeploymentSpec::build(&tag, &config.fixed());
        let image = PullableImage(format!("1.dkr.ecr.us-east-2.amazonaws.com/{}", spec.image));
        let revision = derive_revision_identity(&tag, RevisionLength::DEFAULT);
        descriptor(
            "app-service",
            &network(),
            &infra(),
            &spec,
            &image,
            with_revision.then_some(&revision),
            &config,
        )
    }

    #[test]
    fn task_definition_id_embeds_revision() {
        let stack = render("abcdef1234567890", true);
        let task = stack.find("TaskDefinitionabcdef12").unwrap();
        assert_eq!(task.kind, ResourceKind::TaskDefinition);
        assert_eq!(
            stack.find("Service").unwrap().properties["TaskDefinition"],
            reference("TaskDefinitionabcdef12")
        );
    }

    #[test]
    fn legacy_mode_keeps_stable_task_definition_id() {
        let a = render("v1", false);
        let b = render("v2", false);
        assert!(a.find("TaskDefinition").is_some());
        assert!(b.find("TaskDefinition").is_some());
    }

    #[test]
    fn new_tag_changes_only_the_task_definition() {
        let a = render("v1", true);
        let b = render("v2", true);

        assert!(a.find("TaskDefinitionv1").is_some());
        assert!(b.find("TaskDefinitionv2").is_some());
        for id in ["TaskExecutionRole", "TaskRole", "LogGroup", "ServiceSecurityGroup"] {
            assert_eq!(a.find(id), b.find(id), "{id} changed between tags");
        }
    }

    #[test]
    fn ingress_is_restricted_to_load_balancer_security_group() {
        let stack = render("v1", true);
        let sg = stack.find("ServiceSecurityGroup").unwrap();
        let ingress = sg.properties["SecurityGroupIngress"].as_array().unwrap();

        assert_eq!(ingress.len(), 1);
        assert_eq!(ingress[0]["SourceSecurityGroupId"], "sg-lb");
        assert_eq!(ingress[0]["FromPort"], 3000);
        assert_eq!(ingress[0]["ToPort"], 3000);
        assert!(ingress[0].get("CidrIp").is_none());
    }

    #[test]
    fn declares_no_upstream_resources() {
        let stack = render("v1", true);
        let allowed = [
            ResourceKind::Role,
            ResourceKind::LogGroup,
            ResourceKind::TaskDefinition,
            ResourceKind::SecurityGroup,
            ResourceKind::Service,
        ];
        assert!(stack.resources.iter().all(|r| allowed.contains(&r.kind)));
    }

    #[test]
    fn service_runs_in_private_subnets_behind_target_group() {
        let stack = render("v1", true);
        let svc = &stack.find("Service").unwrap().properties;
        let vpc = &svc["NetworkConfiguration"]["AwsvpcConfiguration"];

        assert_eq!(vpc["AssignPublicIp"], "DISABLED");
        assert_eq!(vpc["Subnets"], json!(["subnet-priv-a", "subnet-priv-b"]));
        assert_eq!(
            svc["LoadBalancers"][0]["TargetGroupArn"],
            "arn:aws:elasticloadbalancing:tg/app"
        );
        assert_eq!(svc["Cluster"], "app-cluster");
        assert_eq!(svc["EnableExecuteCommand"], true);
    }

    #[test]
    fn container_uses_resolved_image_and_log_prefix() {
        let stack = render("v1", true);
        let container = &stack.find("TaskDefinitionv1").unwrap().properties["ContainerDefinitions"][0];
        assert_eq!(
            container["Image"],
            "1.dkr.ecr.us-east-2.amazonaws.com/ecsroll-app:v1"
        );
        assert_eq!(container["LogConfiguration"]["LogDriver"], "awslogs");
        assert_eq!(
            container["LogConfiguration"]["Options"]["awslogs-stream-prefix"],
            "ecsroll-app"
        );
    }
}
