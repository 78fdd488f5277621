#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    #[error("aws CLI not found: install https://docs.aws.amazon.com/cli/latest/userguide/getting-started-install.html")]
    NotFound { source: std::io::Error },

    #[error("aws command failed: {args:?}\n{stderr}")]
    CommandFailed { args: Vec<String>, stderr: String },

    #[error("aws output was not valid UTF-8")]
    InvalidUtf8 { source: std::string::FromUtf8Error },

    #[error("aws output was not valid JSON")]
    InvalidJson { source: serde_json::Error },

    #[error("failed to write stack template")]
    TemplateWrite { source: std::io::Error },
}

impl AwsError {
    /// Captured stderr of a failed command, empty for other failures.
    pub fn stderr(&self) -> &str {
        match self {
            Self::CommandFailed { stderr, .. } => stderr,
            _ => "",
        }
    }

    /// `true` when the API reported that the addressed resource is absent.
    pub fn is_missing(&self, marker: &str) -> bool {
        self.stderr().contains(marker)
    }
}
