// Batch orchestration errors
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop a batch from being planned, started or finished.
///
/// `Config` and `State` are raised before any process exists. `Spawn` means
/// the runner could not be created at all. `BatchFailure` and `Cancelled`
/// are only ever produced once the batch has terminated.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to start batch: {0}")]
    Spawn(String),

    #[error("Invalid executor state: {0}")]
    State(String),

    #[error(
        "Batch exited with code {exit_code}. Please check the log file for details: {}",
        log_file.display()
    )]
    BatchFailure { exit_code: i32, log_file: PathBuf },

    #[error("Batch was cancelled (exit code {exit_code})")]
    Cancelled { exit_code: i32 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl BatchError {
    pub fn config(message: impl Into<String>) -> Self {
        BatchError::Config(message.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BatchError::Io {
            context: context.into(),
            source,
        }
    }

    /// True when the batch ended because the user asked it to stop.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BatchError::Cancelled { .. })
    }

    /// Exit code of the terminated batch, if it got that far.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            BatchError::BatchFailure { exit_code, .. } | BatchError::Cancelled { exit_code } => {
                Some(*exit_code)
            }
            _ => None,
        }
    }
}

pub type BatchResult<T> = Result<T, BatchError>;
