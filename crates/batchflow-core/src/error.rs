use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BatchflowError>;

#[derive(Debug, Error)]
pub enum BatchflowError {
    /// A mandatory job or queue setting is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation was invoked before the task or queue was ready for it.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Copying to/from the remote host or running a command there failed.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The batch scheduler printed something we could not interpret.
    #[error("unexpected scheduler output: {0}")]
    Scheduler(String),

    /// The final-stage derivation of a workflow failed.
    #[error("derivation failed for {task}: {message}")]
    Derivation { task: String, message: String },

    #[error("I/O error at '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("failed to render report: {0}")]
    Report(#[from] serde_yaml::Error),
}

impl BatchflowError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn derivation(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Derivation {
            task: task.into(),
            message: message.into(),
        }
    }
}
