//! Layered stack graph for ecsroll.
//!
//! Three layers are composed in order: network, shared infrastructure and
//! the per-deployment service. Only the service layer depends on the image
//! tag; the [`TriggerAction`] then forces a rollout once per distinct tag.

pub mod collaborator;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod infra;
pub mod network;
mod outputs;
pub mod service;
pub mod trigger;

pub use collaborator::{
    ActionError, ActionInvoker, ActionKind, ActionReceipt, ActionRequest, LifecycleEvent,
    ProvisionError, Provisioner, PullableImage, Registry, RegistryError, ServiceReference,
    StackHandle,
};
pub use descriptor::{OutputDescriptor, ResourceDescriptor, ResourceKind, StackDescriptor};
pub use error::{DeployError, Layer};
pub use graph::{DeployPlan, DeployReport, DeployRequest, StackGraph, UpstreamMode, plan};
pub use infra::InfraHandle;
pub use network::NetworkHandle;
pub use service::ServiceHandle;
pub use trigger::{Outcome, RetryPolicy, SkipReason, TriggerAction, skip_reason};
