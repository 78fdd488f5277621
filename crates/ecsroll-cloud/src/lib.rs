//! AWS implementations of the stack graph collaborators, driven through the
//! `aws` CLI: CloudFormation provisions, ECS forces deployments and ECR
//! resolves images.

pub mod aws;
pub mod client;
pub mod executor;
pub mod template;

pub use aws::AwsError;
pub use client::{
    AwsClient, CheckResult, DoctorReport, ServiceStatus, StackCheck, TRIGGER_KEY_TAG, classify,
};
pub use executor::{AwsExecutor, RealExecutor};
