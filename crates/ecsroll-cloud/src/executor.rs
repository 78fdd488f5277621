use crate::aws::AwsError;

/// Abstraction over aws CLI execution for testability.
///
/// Production code uses [`RealExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait AwsExecutor: Send + Sync {
    /// Execute an aws command and capture stdout.
    async fn exec(&self, args: &[String]) -> Result<String, AwsError>;

    /// Execute an aws command, streaming its progress to stderr.
    async fn exec_streaming(&self, args: &[String]) -> Result<(), AwsError>;
}

/// Real aws CLI executor.
pub struct RealExecutor;

impl AwsExecutor for RealExecutor {
    async fn exec(&self, args: &[String]) -> Result<String, AwsError> {
        use std::process::Stdio;

        tracing::debug!(?args, "aws");
        let output = tokio::process::Command::new("aws")
            .args(args)
            .env("AWS_PAGER", "")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AwsError::NotFound { source: e })?;

        if output.status.success() {
            String::from_utf8(output.stdout).map_err(|e| AwsError::InvalidUtf8 { source: e })
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            Err(AwsError::CommandFailed {
                args: args.to_vec(),
                stderr,
            })
        }
    }

    async fn exec_streaming(&self, args: &[String]) -> Result<(), AwsError> {
        use std::process::Stdio;

        tracing::debug!(?args, "aws (streaming)");
        let output = tokio::process::Command::new("aws")
            .args(args)
            .env("AWS_PAGER", "")
            // Progress goes to stderr; stdout is reserved for command results.
            .stdout(Stdio::from(std::io::stderr()))
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AwsError::NotFound { source: e })?;

        if output.status.success() {
            Ok(())
        } else {
            // stderr is captured so failures can be classified.
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            eprint!("{stderr}");
            Err(AwsError::CommandFailed {
                args: args.to_vec(),
                stderr,
            })
        }
    }
}
