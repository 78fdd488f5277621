//! Contracts of the external systems the stack graph drives.
//!
//! Production code uses the AWS implementations in `ecsroll-cloud`; tests
//! use in-memory fakes or mockall-generated mocks.

use ecsroll_core::{ImageReference, TriggerKey};
use serde::Serialize;
use std::fmt;

use crate::descriptor::StackDescriptor;

/// Reference to a materialized stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackHandle {
    pub name: String,
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("stack {stack} failed to reconcile: {detail}")]
    Reconcile { stack: String, detail: String },

    #[error("failed to read stack {stack}: {detail}")]
    Read { stack: String, detail: String },
}

/// Declarative resource provisioning with an opaque diff engine.
#[allow(async_fn_in_trait)]
pub trait Provisioner: Send + Sync {
    /// Reconcile the live stack to `stack` and wait for completion.
    /// Applying an unchanged descriptor must not modify any resource.
    async fn create_or_update(&self, stack: &StackDescriptor)
    -> Result<StackHandle, ProvisionError>;

    /// Look up an existing stack by name.
    async fn find(&self, name: &str) -> Result<Option<StackHandle>, ProvisionError>;

    /// Read one output value; `None` when the stack does not export `key`.
    async fn read_output(
        &self,
        handle: &StackHandle,
        key: &str,
    ) -> Result<Option<String>, ProvisionError>;
}

/// The running service a forced redeploy targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReference {
    pub cluster: String,
    pub service_name: String,
    pub service_arn: String,
}

impl fmt::Display for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster, self.service_name)
    }
}

/// Side-effecting actions understood by the action API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// Replace running tasks with tasks of the latest registered revision.
    ForceNewDeployment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRequest {
    pub action: ActionKind,
    pub service: ServiceReference,
    pub key: TriggerKey,
}

/// Lifecycle event under which an action executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    /// No key had been applied to the service before.
    Attach,
    /// A different key had been applied before.
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionReceipt {
    Executed(LifecycleEvent),
    /// The key was already applied; nothing was executed.
    AlreadyApplied,
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// Denied or targeting a service that does not exist. Not retriable.
    #[error("action rejected: {reason}")]
    Rejected { reason: String },

    /// Network failure, timeout or throttling. Safe to retry with the same key.
    #[error("transient action failure: {reason}")]
    Transient { reason: String },
}

/// Executes an action at most once per distinct idempotency key.
#[allow(async_fn_in_trait)]
pub trait ActionInvoker: Send + Sync {
    async fn invoke(&self, request: &ActionRequest) -> Result<ActionReceipt, ActionError>;
}

/// An image URI the container runtime can pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PullableImage(pub String);

impl fmt::Display for PullableImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("repository {repository} not found")]
    RepositoryNotFound { repository: String },

    #[error("tag {tag} not found in repository {repository}")]
    TagNotFound { repository: String, tag: String },

    #[error("registry lookup failed: {detail}")]
    Lookup { detail: String },
}

/// Resolves `repository:tag` to a pullable image.
#[allow(async_fn_in_trait)]
pub trait Registry: Send + Sync {
    async fn resolve(&self, image: &ImageReference) -> Result<PullableImage, RegistryError>;
}
