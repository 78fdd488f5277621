//! Composition of the three layers: network → infrastructure → service.
//!
//! ```text
//! ecsroll deploy --image-tag <tag>
//!   0. Tag        ── validate, derive RevisionIdentity + TriggerKey (no calls yet)
//!   1. Network    ── create_or_update <name>-network   (or adopt imported VPC)
//!   2. Infra      ── create_or_update <name>-infra     (cluster, ALB, target group)
//!   3. Registry   ── resolve <repository>:<tag>
//!   4. Service    ── create_or_update <name>-service   (new task definition revision)
//!   5. Trigger    ── force new deployment keyed by force-update-<tag>
//! ```
//!
//! Upstream handles flow downward by shared reference only. Steps 1 and 2
//! never see the tag, so re-composing with another tag leaves their stacks
//! unchanged. Any error aborts the remaining steps.

use ecsroll_core::{
    DeploymentSpec, EcsrollConfig, ImageTag, NetworkConfig, RevisionIdentity, TagSelection,
    TagSource, TriggerKey, derive_revision_identity, derive_trigger_key,
};
use serde::Serialize;

use crate::collaborator::{ActionInvoker, Provisioner, PullableImage, Registry};
use crate::error::DeployError;
use crate::trigger::{Outcome, SkipReason, TriggerAction, skip_reason};
use crate::{infra, network, service};

/// How the upstream layers are obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpstreamMode {
    /// Reconcile the network and infrastructure stacks before the service.
    #[default]
    Provision,
    /// Read the existing stacks' outputs; fail if they are missing.
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub tag: TagSelection,
    pub upstream: UpstreamMode,
}

impl DeployRequest {
    /// Validate the raw operator input. Fails before any external call.
    pub fn new(raw_tag: Option<&str>, upstream: UpstreamMode) -> Result<Self, DeployError> {
        Ok(Self {
            tag: TagSelection::resolve(raw_tag)?,
            upstream,
        })
    }
}

/// Everything derived from a tag before touching any external system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployPlan {
    pub image_tag: ImageTag,
    pub tag_source: TagSource,
    pub revision: Option<RevisionIdentity>,
    pub task_definition_id: String,
    /// `None` when the trigger will be skipped.
    pub trigger_key: Option<TriggerKey>,
    pub skip_reason: Option<SkipReason>,
    pub spec: DeploymentSpec,
    pub stacks: Vec<String>,
}

/// Derive the plan for `tag`. Pure.
pub fn plan(config: &EcsrollConfig, tag: &TagSelection) -> DeployPlan {
    let revision = config
        .trigger
        .enabled
        .then(|| derive_revision_identity(&tag.tag, config.trigger.revision_length));
    let skip = skip_reason(&config.trigger, tag);

    DeployPlan {
        image_tag: tag.tag.clone(),
        tag_source: tag.source,
        task_definition_id: service::task_definition_id(revision.as_ref()),
        revision,
        trigger_key: skip.is_none().then(|| derive_trigger_key(&tag.tag)),
        skip_reason: skip,
        spec: DeploymentSpec::build(&tag.tag, &config.service.fixed()),
        stacks: provisioned_stacks(config),
    }
}

/// Stacks a full deploy creates or updates. An imported network has none.
fn provisioned_stacks(config: &EcsrollConfig) -> Vec<String> {
    let network = match config.network {
        NetworkConfig::Create { .. } => Some(config.project.network_stack()),
        NetworkConfig::Import { .. } => None,
    };
    network
        .into_iter()
        .chain([config.project.infra_stack(), config.project.service_stack()])
        .collect()
}

/// Observable outputs of a successful composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub image_tag: ImageTag,
    pub revision: Option<RevisionIdentity>,
    pub image: PullableImage,
    pub vpc_id: String,
    pub load_balancer_dns: String,
    pub cluster_name: String,
    pub target_group_arn: String,
    pub service_name: String,
    pub service_arn: String,
    pub outcome: Outcome,
}

pub struct StackGraph<'a, P, A, R> {
    config: &'a EcsrollConfig,
    provisioner: &'a P,
    actions: &'a A,
    registry: &'a R,
}

impl<'a, P, A, R> StackGraph<'a, P, A, R>
where
    P: Provisioner,
    A: ActionInvoker,
    R: Registry,
{
    pub fn new(config: &'a EcsrollConfig, provisioner: &'a P, actions: &'a A, registry: &'a R) -> Self {
        Self {
            config,
            provisioner,
            actions,
            registry,
        }
    }

    /// Run one deployment request through all layers and the trigger.
    pub async fn compose(&self, request: &DeployRequest) -> Result<DeployReport, DeployError> {
        let config = self.config;
        let project = &config.project;
        let plan = plan(config, &request.tag);

        tracing::info!(
            tag = %plan.image_tag,
            revision = plan.revision.as_ref().map(|r| r.as_str()),
            "starting deployment"
        );

        let (network, infra) = match request.upstream {
            UpstreamMode::Provision => {
                let network = network::materialize(
                    self.provisioner,
                    &config.network,
                    &project.network_stack(),
                )
                .await?;
                let infra = infra::materialize(
                    self.provisioner,
                    &project.infra_stack(),
                    &network,
                    &config.load_balancer,
                    &config.service.fixed(),
                )
                .await?;
                (network, infra)
            }
            UpstreamMode::Reference => {
                let network = network::resolve(
                    self.provisioner,
                    &config.network,
                    &project.network_stack(),
                )
                .await?;
                let infra = infra::resolve(self.provisioner, &project.infra_stack()).await?;
                (network, infra)
            }
        };

        let image = self
            .registry
            .resolve(&plan.spec.image)
            .await
            .map_err(|e| DeployError::Registry {
                image: plan.spec.image.to_string(),
                source: e,
            })?;

        let service = service::materialize(
            self.provisioner,
            &project.service_stack(),
            &network,
            &infra,
            &plan.spec,
            &image,
            plan.revision.as_ref(),
            &config.service,
        )
        .await?;

        let outcome = TriggerAction::new(self.actions, &config.trigger)
            .force_redeploy(&service.reference(), &request.tag)
            .await?;

        Ok(DeployReport {
            image_tag: plan.image_tag,
            revision: plan.revision,
            image,
            vpc_id: network.vpc_id,
            load_balancer_dns: infra.load_balancer_dns,
            cluster_name: infra.cluster_name,
            target_group_arn: infra.target_group_arn,
            service_name: service.service_name,
            service_arn: service.service_arn,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecsroll_core::OnDefaultTag;

    #[test]
    fn plan_for_commit_sha() {
        let config = EcsrollConfig::default();
        let tag = TagSelection::resolve(Some("abcdef1234567890")).unwrap();

        let plan = plan(&config, &tag);

        assert_eq!(plan.revision.as_ref().unwrap().as_str(), "abcdef12");
        assert_eq!(plan.task_definition_id, "TaskDefinitionabcdef12");
        assert_eq!(
            plan.trigger_key.as_ref().unwrap().as_str(),
            "force-update-abcdef1234567890"
        );
        assert!(plan.skip_reason.is_none());
        assert_eq!(
            plan.stacks,
            vec!["ecsroll-app-network", "ecsroll-app-infra", "ecsroll-app-service"]
        );
    }

    #[test]
    fn plan_with_imported_network_lists_no_network_stack() {
        let config = EcsrollConfig {
            network: NetworkConfig::Import {
                vpc_id: "vpc-0123".to_owned(),
                cidr: "10.1.0.0/16".to_owned(),
                availability_zones: vec!["us-east-2a".to_owned(), "us-east-2b".to_owned()],
                public_subnet_ids: vec!["subnet-a".to_owned(), "subnet-b".to_owned()],
                private_subnet_ids: vec!["subnet-c".to_owned()],
            },
            ..EcsrollConfig::default()
        };
        let tag = TagSelection::resolve(Some("v1")).unwrap();

        let plan = plan(&config, &tag);

        assert_eq!(plan.stacks, vec!["ecsroll-app-infra", "ecsroll-app-service"]);
    }

    #[test]
    fn plan_for_omitted_tag_skips_trigger_by_default() {
        let config = EcsrollConfig::default();
        let tag = TagSelection::resolve(None).unwrap();

        let plan = plan(&config, &tag);

        assert_eq!(plan.spec.image.to_string(), "ecsroll-app:latest");
        assert_eq!(plan.revision.as_ref().unwrap().as_str(), "latest");
        assert!(plan.trigger_key.is_none());
        assert_eq!(plan.skip_reason, Some(SkipReason::DefaultTag));
    }

    #[test]
    fn plan_for_omitted_tag_with_invoke_policy() {
        let mut config = EcsrollConfig::default();
        config.trigger.on_default_tag = OnDefaultTag::Invoke;
        let tag = TagSelection::resolve(None).unwrap();

        let plan = plan(&config, &tag);

        assert_eq!(
            plan.trigger_key.as_ref().unwrap().as_str(),
            "force-update-latest"
        );
    }

    #[test]
    fn legacy_plan_has_no_revision() {
        let mut config = EcsrollConfig::default();
        config.trigger.enabled = false;
        let tag = TagSelection::resolve(Some("v1")).unwrap();

        let plan = plan(&config, &tag);

        assert!(plan.revision.is_none());
        assert_eq!(plan.task_definition_id, "TaskDefinition");
        assert_eq!(plan.skip_reason, Some(SkipReason::Disabled));
    }

    #[test]
    fn invalid_tag_fails_request_construction() {
        let err = DeployRequest::new(Some("::"), UpstreamMode::Provision).unwrap_err();
        assert!(matches!(err, DeployError::InvalidTag(_)));
    }
}
