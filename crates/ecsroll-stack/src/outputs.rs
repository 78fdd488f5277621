use crate::collaborator::{Provisioner, StackHandle};
use crate::error::{DeployError, Layer};

/// Read an output an upstream consumer depends on.
pub(crate) async fn require<P: Provisioner>(
    provisioner: &P,
    layer: Layer,
    handle: &StackHandle,
    key: &str,
) -> Result<String, DeployError> {
    let value = provisioner
        .read_output(handle, key)
        .await
        .map_err(|e| DeployError::UpstreamUnavailable {
            layer,
            stack: handle.name.clone(),
            detail: e.to_string(),
        })?;

    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_owned()),
        _ => Err(DeployError::UpstreamUnavailable {
            layer,
            stack: handle.name.clone(),
            detail: format!("output {key} is missing"),
        }),
    }
}

/// Like [`require`], for comma-separated list outputs.
pub(crate) async fn require_list<P: Provisioner>(
    provisioner: &P,
    layer: Layer,
    handle: &StackHandle,
    key: &str,
) -> Result<Vec<String>, DeployError> {
    let raw = require(provisioner, layer, handle, key).await?;
    Ok(split_list(&raw))
}

/// Locate an existing stack without modifying it.
pub(crate) async fn locate<P: Provisioner>(
    provisioner: &P,
    layer: Layer,
    stack: &str,
) -> Result<StackHandle, DeployError> {
    provisioner
        .find(stack)
        .await
        .map_err(|e| DeployError::UpstreamUnavailable {
            layer,
            stack: stack.to_owned(),
            detail: e.to_string(),
        })?
        .ok_or_else(|| DeployError::UpstreamUnavailable {
            layer,
            stack: stack.to_owned(),
            detail: "stack does not exist".to_owned(),
        })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
