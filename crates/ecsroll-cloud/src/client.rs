use crate::aws::AwsError;
use crate::executor::{AwsExecutor, RealExecutor};
use crate::template;
use ecsroll_core::{EcsrollConfig, ImageReference};
use ecsroll_stack::{
    ActionError, ActionInvoker, ActionReceipt, ActionRequest, LifecycleEvent, ProvisionError,
    Provisioner, PullableImage, Registry, RegistryError, StackDescriptor, StackHandle,
};
use serde_json::Value;
use std::fmt;
use std::io::Write;
use std::time::Duration;

/// ECS service tag holding the last applied trigger key.
pub const TRIGGER_KEY_TAG: &str = "ecsroll:trigger-key";

const STACK_MISSING: &str = "does not exist";
const REPOSITORY_MISSING: &str = "RepositoryNotFoundException";
const IMAGE_MISSING: &str = "ImageNotFoundException";

const TAG_WRITE_ATTEMPTS: u32 = 3;
const TAG_WRITE_BACKOFF: Duration = Duration::from_millis(200);

/// AWS operations client, parameterized over the executor for testability.
pub struct AwsClient<E: AwsExecutor = RealExecutor> {
    executor: E,
    region: String,
}

impl AwsClient<RealExecutor> {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            executor: RealExecutor,
            region: region.into(),
        }
    }
}

impl<E: AwsExecutor> AwsClient<E> {
    pub fn with_executor(executor: E, region: impl Into<String>) -> Self {
        Self {
            executor,
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Run a regional command and capture trimmed stdout.
    async fn call<const N: usize>(&self, a: [&str; N]) -> Result<String, AwsError> {
        let out = self.executor.exec(&self.regional(a)).await?;
        Ok(out.trim().to_owned())
    }

    fn regional<const N: usize>(&self, a: [&str; N]) -> Vec<String> {
        let mut cmd = args(a);
        cmd.push("--region".to_owned());
        cmd.push(self.region.clone());
        cmd
    }

    // ── Doctor ──

    /// Run all diagnostic checks without early return.
    /// Returns a report with pass/fail for each check item.
    pub async fn doctor(&self, config: Option<&EcsrollConfig>) -> DoctorReport {
        let mut report = DoctorReport::default();

        // 1. aws CLI
        match self.executor.exec(&args(["--version"])).await {
            Ok(v) => {
                // "aws-cli/2.15.0 Python/3.11.6 ..."
                let version = v
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.strip_prefix("aws-cli/"))
                    // arch-lint: allow(no-silent-result-drop) reason="Option default: version string without an aws-cli/ prefix is reported verbatim"
                    .unwrap_or(v.trim());
                report.aws_cli = CheckResult::ok(version);
            }
            Err(e) => report.aws_cli = CheckResult::fail(&e.to_string()),
        }

        // 2. Credentials
        let account = match self
            .call(["sts", "get-caller-identity", "--query", "Account", "--output", "text"])
            .await
        {
            Ok(a) if !a.is_empty() => {
                report.identity = CheckResult::ok(&a);
                Some(a)
            }
            _ => {
                report.identity = CheckResult::fail("no valid credentials");
                None
            }
        };

        // 3. Account pin
        let expected = config.and_then(|c| c.project.account.as_deref());
        report.account = match (expected, account.as_deref()) {
            (None, Some(actual)) => CheckResult::ok(&format!("{actual} (not pinned)")),
            (Some(want), Some(actual)) if want == actual => CheckResult::ok(actual),
            (Some(want), Some(actual)) => {
                CheckResult::fail(&format!("expected {want}, credentials are for {actual}"))
            }
            (_, None) => CheckResult::fail("unknown, credentials missing"),
        };

        // 4. Region
        match self
            .call([
                "ec2",
                "describe-availability-zones",
                "--query",
                "AvailabilityZones[].ZoneName",
                "--output",
                "text",
            ])
            .await
        {
            Ok(zones) if !zones.is_empty() => {
                let count = zones.split_whitespace().count();
                report.region = CheckResult::ok(&format!("{} ({count} zones)", self.region));
            }
            _ => {
                report.region = CheckResult::fail(&format!("{} is not reachable", self.region));
            }
        }

        // 5. Stacks
        let Some(config) = config else {
            return report;
        };
        for name in [
            config.project.network_stack(),
            config.project.infra_stack(),
            config.project.service_stack(),
        ] {
            let result = match self.stack_status(&name).await {
                Ok(Some(status)) if status.ends_with("_COMPLETE") && !status.contains("ROLLBACK") => {
                    CheckResult::ok(&status)
                }
                Ok(Some(status)) => CheckResult::fail(&status),
                Ok(None) => CheckResult::fail("Not deployed"),
                Err(e) => CheckResult::fail(&e.to_string()),
            };
            report.stacks.push(StackCheck { name, result });
        }

        report
    }

    // ── CloudFormation ──

    /// Current status of a stack, `None` when it does not exist.
    pub async fn stack_status(&self, name: &str) -> Result<Option<String>, AwsError> {
        let result = self
            .call([
                "cloudformation",
                "describe-stacks",
                "--stack-name",
                name,
                "--query",
                "Stacks[0].StackStatus",
                "--output",
                "text",
            ])
            .await;
        match result {
            Ok(status) => Ok(Some(status)),
            Err(e) if e.is_missing(STACK_MISSING) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ── ECS ──

    pub async fn describe_service(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<ServiceStatus, AwsError> {
        let raw = self
            .call([
                "ecs",
                "describe-services",
                "--cluster",
                cluster,
                "--services",
                service,
                "--query",
                "services[0]",
                "--output",
                "json",
            ])
            .await?;
        let value: Value =
            serde_json::from_str(&raw).map_err(|e| AwsError::InvalidJson { source: e })?;
        Ok(ServiceStatus::from_json(&value))
    }

    /// Trigger key recorded on the service, if any.
    pub async fn last_trigger_key(&self, service_arn: &str) -> Result<Option<String>, AwsError> {
        let query = format!("tags[?key=='{TRIGGER_KEY_TAG}'].value | [0]");
        let value = self
            .call([
                "ecs",
                "list-tags-for-resource",
                "--resource-arn",
                service_arn,
                "--query",
                &query,
                "--output",
                "text",
            ])
            .await?;
        Ok(present(value))
    }
}

impl<E: AwsExecutor> AwsClient<E> {
    /// Tag the service with `key`, retrying transient failures.
    async fn record_trigger_key(&self, service_arn: &str, key: &str) -> Result<(), AwsError> {
        let tag = format!("key={TRIGGER_KEY_TAG},value={key}");
        let mut delay = TAG_WRITE_BACKOFF;
        let mut attempt = 1;
        loop {
            let result = self
                .call(["ecs", "tag-resource", "--resource-arn", service_arn, "--tags", &tag])
                .await;
            match result {
                Ok(_) => return Ok(()),
                Err(e) if attempt < TAG_WRITE_ATTEMPTS && is_transient(&e) => {
                    tracing::debug!(attempt, error = %e, "retrying trigger key tag");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<E: AwsExecutor> Provisioner for AwsClient<E> {
    async fn create_or_update(
        &self,
        stack: &StackDescriptor,
    ) -> Result<StackHandle, ProvisionError> {
        let reconcile = |detail: String| ProvisionError::Reconcile {
            stack: stack.name.clone(),
            detail,
        };

        let body = template::render(stack).to_string();
        let mut file = tempfile::Builder::new()
            .prefix("ecsroll-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| reconcile(AwsError::TemplateWrite { source: e }.to_string()))?;
        file.write_all(body.as_bytes())
            .map_err(|e| reconcile(AwsError::TemplateWrite { source: e }.to_string()))?;
        let path = file.path().to_string_lossy().to_string();

        tracing::info!(stack = %stack.name, resources = stack.resources.len(), "deploying stack");
        self.executor
            .exec_streaming(&self.regional([
                "cloudformation",
                "deploy",
                "--template-file",
                &path,
                "--stack-name",
                &stack.name,
                "--capabilities",
                "CAPABILITY_IAM",
                "--no-fail-on-empty-changeset",
            ]))
            .await
            .map_err(|e| reconcile(e.to_string()))?;

        self.find(&stack.name)
            .await?
            .ok_or_else(|| reconcile("stack not found after deploy".to_owned()))
    }

    async fn find(&self, name: &str) -> Result<Option<StackHandle>, ProvisionError> {
        let result = self
            .call([
                "cloudformation",
                "describe-stacks",
                "--stack-name",
                name,
                "--query",
                "Stacks[0].StackId",
                "--output",
                "text",
            ])
            .await;
        match result {
            Ok(id) => Ok(present(id).map(|id| StackHandle {
                name: name.to_owned(),
                id,
            })),
            Err(e) if e.is_missing(STACK_MISSING) => Ok(None),
            Err(e) => Err(ProvisionError::Read {
                stack: name.to_owned(),
                detail: e.to_string(),
            }),
        }
    }

    async fn read_output(
        &self,
        handle: &StackHandle,
        key: &str,
    ) -> Result<Option<String>, ProvisionError> {
        let query = format!("Stacks[0].Outputs[?OutputKey=='{key}'].OutputValue | [0]");
        let value = self
            .call([
                "cloudformation",
                "describe-stacks",
                "--stack-name",
                &handle.id,
                "--query",
                &query,
                "--output",
                "text",
            ])
            .await
            .map_err(|e| ProvisionError::Read {
                stack: handle.name.clone(),
                detail: e.to_string(),
            })?;
        Ok(present(value))
    }
}

impl<E: AwsExecutor> ActionInvoker for AwsClient<E> {
    /// Force a new deployment unless the service tag already records `key`.
    ///
    /// The tag is written after the deployment is accepted, so a key is
    /// never recorded for a deployment that did not happen. Errors are only
    /// returned before `update-service` succeeds.
    async fn invoke(&self, request: &ActionRequest) -> Result<ActionReceipt, ActionError> {
        let service = &request.service;
        let key = request.key.as_str();

        let previous = self
            .last_trigger_key(&service.service_arn)
            .await
            .map_err(classify)?;
        if previous.as_deref() == Some(key) {
            return Ok(ActionReceipt::AlreadyApplied);
        }

        self.call([
            "ecs",
            "update-service",
            "--cluster",
            &service.cluster,
            "--service",
            &service.service_name,
            "--force-new-deployment",
            "--query",
            "service.serviceArn",
            "--output",
            "text",
        ])
        .await
        .map_err(classify)?;

        // The deployment is accepted from here on. A failed tag write must not
        // surface as retriable, or the caller would force a second rollout.
        // arch-lint: allow(no-error-swallowing) reason="deployment already accepted; retrying would force a second rollout"
        if let Err(e) = self.record_trigger_key(&service.service_arn, key).await {
            tracing::warn!(
                service = %service.service_name,
                key,
                error = %e,
                "forced deployment succeeded but the trigger key was not recorded"
            );
        }

        Ok(ActionReceipt::Executed(match previous {
            None => LifecycleEvent::Attach,
            Some(_) => LifecycleEvent::Update,
        }))
    }
}

impl<E: AwsExecutor> Registry for AwsClient<E> {
    async fn resolve(&self, image: &ImageReference) -> Result<PullableImage, RegistryError> {
        let repository = image.repository.as_str();
        let tag = image.tag.as_str();

        let uri = self
            .call([
                "ecr",
                "describe-repositories",
                "--repository-names",
                repository,
                "--query",
                "repositories[0].repositoryUri",
                "--output",
                "text",
            ])
            .await
            .map_err(|e| {
                if e.is_missing(REPOSITORY_MISSING) {
                    RegistryError::RepositoryNotFound {
                        repository: repository.to_owned(),
                    }
                } else {
                    RegistryError::Lookup {
                        detail: e.to_string(),
                    }
                }
            })?;

        let image_id = format!("imageTag={tag}");
        self.call([
            "ecr",
            "describe-images",
            "--repository-name",
            repository,
            "--image-ids",
            &image_id,
            "--query",
            "imageDetails[0].imageDigest",
            "--output",
            "text",
        ])
        .await
        .map_err(|e| {
            if e.is_missing(IMAGE_MISSING) {
                RegistryError::TagNotFound {
                    repository: repository.to_owned(),
                    tag: tag.to_owned(),
                }
            } else {
                RegistryError::Lookup {
                    detail: e.to_string(),
                }
            }
        })?;

        Ok(PullableImage(format!("{uri}:{tag}")))
    }
}

// ── Helper ──

fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}

/// `--output text` prints `None` for a missing value.
fn present(value: String) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == "None" {
        None
    } else {
        Some(value.to_owned())
    }
}

const TRANSIENT_MARKERS: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "Rate exceeded",
    "ServiceUnavailable",
    "InternalError",
    "ServerException",
    "timed out",
    "Could not connect",
    "Connection reset",
];

/// Map a failed action call onto retriable or terminal.
///
/// Unknown failures are terminal, so a key is never retried blindly.
pub fn classify(err: AwsError) -> ActionError {
    let transient = is_transient(&err);
    let reason = failure_reason(&err);
    if transient {
        ActionError::Transient { reason }
    } else {
        ActionError::Rejected { reason }
    }
}

fn is_transient(err: &AwsError) -> bool {
    let reason = failure_reason(err);
    TRANSIENT_MARKERS.iter().any(|m| reason.contains(m))
}

fn failure_reason(err: &AwsError) -> String {
    match err {
        AwsError::CommandFailed { stderr, .. } => stderr.trim().to_owned(),
        other => other.to_string(),
    }
}

// ── Status types ──

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceStatus {
    pub status: String,
    pub running_count: u64,
    pub desired_count: u64,
    pub task_definition: String,
    pub rollout_state: Option<String>,
}

impl ServiceStatus {
    fn from_json(value: &Value) -> Self {
        let text = |v: &Value| v.as_str().map(str::to_owned);
        Self {
            // arch-lint: allow(no-silent-result-drop) reason="Option default: missing status field reads as UNKNOWN"
            status: text(&value["status"]).unwrap_or_else(|| "UNKNOWN".to_owned()),
            // arch-lint: allow(no-silent-result-drop) reason="Option default: missing count reads as zero"
            running_count: value["runningCount"].as_u64().unwrap_or(0),
            // arch-lint: allow(no-silent-result-drop) reason="Option default: missing count reads as zero"
            desired_count: value["desiredCount"].as_u64().unwrap_or(0),
            // arch-lint: allow(no-silent-result-drop) reason="Option default: missing task definition reads as empty"
            task_definition: text(&value["taskDefinition"]).unwrap_or_else(String::new),
            rollout_state: text(&value["deployments"][0]["rolloutState"]),
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Status:          {}", self.status)?;
        writeln!(
            f,
            "  Tasks:           {}/{} running",
            self.running_count, self.desired_count
        )?;
        writeln!(f, "  Task definition: {}", self.task_definition)?;
        if let Some(rollout) = &self.rollout_state {
            writeln!(f, "  Rollout:         {rollout}")?;
        }
        Ok(())
    }
}

// ── Doctor types ──

#[derive(Debug, Default)]
pub struct DoctorReport {
    pub aws_cli: CheckResult,
    pub identity: CheckResult,
    pub account: CheckResult,
    pub region: CheckResult,
    pub stacks: Vec<StackCheck>,
    pub config_file: CheckResult,
}

impl DoctorReport {
    pub fn all_passed(&self) -> bool {
        self.aws_cli.passed
            && self.identity.passed
            && self.account.passed
            && self.region.passed
            && self.config_file.passed
            && self.stacks.iter().all(|s| s.result.passed)
    }
}

impl fmt::Display for DoctorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("aws CLI", &self.aws_cli),
            ("Credentials", &self.identity),
            ("Account", &self.account),
            ("Region", &self.region),
            ("ecsroll.toml", &self.config_file),
        ];
        for (label, check) in rows {
            writeln!(f, "[{}] {label:<14} {}", check.icon(), check.detail)?;
        }
        for stack in &self.stacks {
            writeln!(
                f,
                "[{}] {:<14} {}",
                stack.result.icon(),
                stack.name,
                stack.result.detail
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    pub fn ok(detail: &str) -> Self {
        Self {
            passed: true,
            detail: detail.to_owned(),
        }
    }

    pub fn fail(detail: &str) -> Self {
        Self {
            passed: false,
            detail: detail.to_owned(),
        }
    }

    pub fn icon(&self) -> &'static str {
        if self.passed { "OK" } else { "NG" }
    }
}

#[derive(Debug, Clone)]
pub struct StackCheck {
    pub name: String,
    pub result: CheckResult,
}
