use serde::Serialize;
use std::fmt;

use crate::identity::ImageTag;

/// Log driver used by every container.
pub const LOG_DRIVER: &str = "awslogs";

/// Per-service settings that never vary between deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixedConfig {
    /// Task definition family.
    pub family: String,
    pub container_name: String,
    /// Registry repository the image is pulled from.
    pub repository: String,
    pub port: u16,
    /// Fargate CPU units.
    pub cpu: u32,
    /// Fargate memory in MiB.
    pub memory: u32,
    pub log_stream_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSink {
    pub driver: String,
    pub stream_prefix: String,
}

/// `repository:tag`, before the registry resolves it to a pullable URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReference {
    pub repository: String,
    pub tag: ImageTag,
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Desired state of one versioned unit of compute.
///
/// Every field except [`DeploymentSpec::image`] is copied from the
/// [`FixedConfig`] and stays the same across revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentSpec {
    pub family: String,
    pub container_name: String,
    pub port: u16,
    pub cpu: u32,
    pub memory: u32,
    pub logging: LogSink,
    pub image: ImageReference,
}

impl DeploymentSpec {
    /// Assemble the spec for `tag`. Pure; nothing is materialized here.
    ///
    /// ```
    /// use ecsroll_core::{DeploymentSpec, ImageTag, ServiceConfig};
    ///
    /// let fixed = ServiceConfig::default().fixed();
    /// let spec = DeploymentSpec::build(&ImageTag::latest(), &fixed);
    /// assert_eq!(spec.image.to_string(), format!("{}:latest", fixed.repository));
    /// ```
    pub fn build(tag: &ImageTag, fixed: &FixedConfig) -> Self {
        Self {
            family: fixed.family.clone(),
            container_name: fixed.container_name.clone(),
            port: fixed.port,
            cpu: fixed.cpu,
            memory: fixed.memory,
            logging: LogSink {
                driver: LOG_DRIVER.to_owned(),
                stream_prefix: fixed.log_stream_prefix.clone(),
            },
            image: ImageReference {
                repository: fixed.repository.clone(),
                tag: tag.clone(),
            },
        }
    }
}
