//! Forced redeploy keyed by the image tag.
//!
//! Registering a new task definition revision is not always enough to roll
//! the running tasks (a mutable tag such as `latest` resolves to the same
//! descriptor). The trigger makes the rollout explicit: it asks the action
//! API to force a new deployment, keyed by [`TriggerKey`], so each distinct
//! tag rolls the service exactly once.

use ecsroll_core::{OnDefaultTag, TagSelection, TriggerConfig, TriggerKey, derive_trigger_key};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::collaborator::{
    ActionError, ActionInvoker, ActionKind, ActionReceipt, ActionRequest, LifecycleEvent,
    ServiceReference,
};
use crate::error::DeployError;

/// Result of [`TriggerAction::force_redeploy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Outcome {
    /// A new deployment was forced.
    Triggered {
        key: TriggerKey,
        event: LifecycleEvent,
    },
    /// The key had already been applied; nothing happened.
    AlreadyApplied { key: TriggerKey },
    /// No action was requested.
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// The tag was omitted and `on_default_tag = "skip"`.
    DefaultTag,
    /// Triggering is turned off (`trigger.enabled = false`).
    Disabled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triggered { key, event } => write!(f, "triggered {key} ({event:?})"),
            Self::AlreadyApplied { key } => write!(f, "{key} already applied"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DefaultTag => "no image tag given",
            Self::Disabled => "trigger disabled",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based), doubling each time.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(factor)
    }
}

impl From<&TriggerConfig> for RetryPolicy {
    fn from(config: &TriggerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Why `tag` would not trigger a redeploy under `config`, if it would not.
pub fn skip_reason(config: &TriggerConfig, tag: &TagSelection) -> Option<SkipReason> {
    if !config.enabled {
        Some(SkipReason::Disabled)
    } else if tag.is_default() && config.on_default_tag == OnDefaultTag::Skip {
        Some(SkipReason::DefaultTag)
    } else {
        None
    }
}

pub struct TriggerAction<'a, A> {
    invoker: &'a A,
    config: &'a TriggerConfig,
    retry: RetryPolicy,
}

impl<'a, A: ActionInvoker> TriggerAction<'a, A> {
    pub fn new(invoker: &'a A, config: &'a TriggerConfig) -> Self {
        Self {
            invoker,
            config,
            retry: RetryPolicy::from(config),
        }
    }

    /// Force `service` onto its latest revision, once per distinct tag.
    ///
    /// The service must already run the new revision's task definition;
    /// call this only after the service layer has been materialized.
    /// Transient failures are retried with the same key.
    pub async fn force_redeploy(
        &self,
        service: &ServiceReference,
        tag: &TagSelection,
    ) -> Result<Outcome, DeployError> {
        if let Some(reason) = skip_reason(self.config, tag) {
            tracing::info!(?reason, "not forcing a redeploy");
            return Ok(Outcome::Skipped { reason });
        }

        let key = derive_trigger_key(&tag.tag);
        let request = ActionRequest {
            action: ActionKind::ForceNewDeployment,
            service: service.clone(),
            key: key.clone(),
        };

        let mut attempt = 1;
        loop {
            match self.invoker.invoke(&request).await {
                Ok(ActionReceipt::Executed(event)) => {
                    tracing::info!(%service, %key, ?event, "forced new deployment");
                    return Ok(Outcome::Triggered { key, event });
                }
                Ok(ActionReceipt::AlreadyApplied) => {
                    tracing::info!(%service, %key, "trigger key already applied");
                    return Ok(Outcome::AlreadyApplied { key });
                }
                Err(ActionError::Rejected { reason }) => {
                    return Err(DeployError::ActionRejected {
                        service: service.to_string(),
                        key: key.to_string(),
                        reason,
                    });
                }
                Err(ActionError::Transient { reason }) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(DeployError::TransientActionError {
                            service: service.to_string(),
                            key: key.to_string(),
                            attempts: attempt,
                            reason,
                        });
                    }
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(%key, attempt, ?delay, %reason, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(800));
    }

    #[test]
    fn skip_reason_follows_config() {
        let default_tag = TagSelection::resolve(None).unwrap();
        let explicit = TagSelection::resolve(Some("v1")).unwrap();
        let mut config = TriggerConfig::default();

        assert_eq!(skip_reason(&config, &default_tag), Some(SkipReason::DefaultTag));
        assert_eq!(skip_reason(&config, &explicit), None);

        config.on_default_tag = OnDefaultTag::Invoke;
        assert_eq!(skip_reason(&config, &default_tag), None);

        config.enabled = false;
        assert_eq!(skip_reason(&config, &explicit), Some(SkipReason::Disabled));
    }

    #[test]
    fn zero_attempts_is_treated_as_one() {
        let config = TriggerConfig {
            max_attempts: 0,
            ..TriggerConfig::default()
        };
        assert_eq!(RetryPolicy::from(&config).max_attempts, 1);
    }
}
