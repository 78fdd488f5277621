use serde::Serialize;
use std::fmt;

use crate::collaborator::{ProvisionError, RegistryError};

/// The three layers of the stack graph, upstream first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Network,
    Infra,
    Service,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Network => "network",
            Self::Infra => "infra",
            Self::Service => "service",
        })
    }
}

/// Failure of a deployment request. Any variant fails the request as a whole.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    InvalidTag(#[from] ecsroll_core::Error),

    #[error("{layer} stack {stack} is unavailable: {detail}")]
    UpstreamUnavailable {
        layer: Layer,
        stack: String,
        detail: String,
    },

    #[error("failed to provision {layer} stack")]
    Provision {
        layer: Layer,
        source: ProvisionError,
    },

    #[error("image {image} could not be resolved")]
    Registry {
        image: String,
        source: RegistryError,
    },

    #[error("forced redeploy of {service} ({key}) was rejected: {reason}")]
    ActionRejected {
        service: String,
        key: String,
        reason: String,
    },

    #[error("forced redeploy of {service} ({key}) failed after {attempts} attempt(s): {reason}")]
    TransientActionError {
        service: String,
        key: String,
        attempts: u32,
        reason: String,
    },
}

impl DeployError {
    /// Only transient action failures may be retried, and only with the same key.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::TransientActionError { .. })
    }
}
