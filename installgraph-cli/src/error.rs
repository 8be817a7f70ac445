//! CLI error type.

use installgraph::config::ConfigError;
use installgraph::download::DownloadError;
use installgraph::executor::PipelineError;
use installgraph::logging::LoggingError;
use thiserror::Error;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) | Self::Config(_) | Self::ConfigFile(_) => 2,
            Self::Pipeline(e) if e.cause.is_cancelled() => 130,
            _ => 1,
        }
    }
}
