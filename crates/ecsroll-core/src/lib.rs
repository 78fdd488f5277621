//! Core types and configuration for ecsroll.
//!
//! This crate defines the `ecsroll.toml` schema ([`EcsrollConfig`]), the
//! tag-derived identities ([`RevisionIdentity`], [`TriggerKey`]), the
//! per-revision [`DeploymentSpec`], and shared error types.

pub mod config;
pub mod error;
pub mod identity;
pub mod spec;

pub use config::{
    CONFIG_FILE, EcsrollConfig, LoadBalancerConfig, NetworkConfig, OnDefaultTag, ProjectConfig,
    ServiceConfig, TriggerConfig,
};
pub use error::{Error, Result};
pub use identity::{
    DEFAULT_TAG, ImageTag, RevisionIdentity, RevisionLength, TRIGGER_KEY_PREFIX, TagSelection,
    TagSource, TriggerKey, derive_revision_identity, derive_trigger_key,
};
pub use spec::{DeploymentSpec, FixedConfig, ImageReference, LogSink};
