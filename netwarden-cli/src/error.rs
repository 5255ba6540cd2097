//! CLI-specific error types and exit code mapping

use netwarden_core::error::{NetwardenError, SourceError};

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Logging or metrics setup failed.
    #[error("setup failed: {0}")]
    Setup(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from the library crates.
    #[error("{0}")]
    Core(#[from] NetwardenError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                         |
    /// |------|---------------------------------|
    /// | 0    | Success or graceful stop        |
    /// | 1    | Any other failure               |
    /// | 2    | Configuration invalid           |
    /// | 3    | Event source unavailable        |
    /// | 4    | Detection or alert sink failure |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Core(NetwardenError::Config(_)) => 2,
            Self::Core(NetwardenError::Source(SourceError::Unavailable { .. })) => 3,
            Self::Core(NetwardenError::Sink(_)) => 4,
            Self::Core(_) | Self::Command(_) | Self::Setup(_) | Self::JsonSerialize(_) | Self::Io(_) => 1,
        }
    }
}

impl From<SourceError> for CliError {
    fn from(e: SourceError) -> Self {
        Self::Core(e.into())
    }
}

impl From<netwarden_core::error::SinkError> for CliError {
    fn from(e: netwarden_core::error::SinkError) -> Self {
        Self::Core(e.into())
    }
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        Self::Setup(format!("{e:#}"))
    }
}
