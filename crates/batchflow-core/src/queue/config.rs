use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::SchedulerProfile;
use crate::error::{BatchflowError, Result};

/// Queue configuration, fixed for the whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Concurrent submission cap; unbounded when absent.
    pub max_jobs: Option<usize>,
    pub scheduler: SchedulerProfile,
    pub remote: Option<RemoteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Root under which each task gets its own `c<nnnnn>` directory.
    pub temporary_dir: PathBuf,
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_jobs == Some(0) {
            return Err(BatchflowError::Configuration(
                "max_jobs must be at least 1".to_string(),
            ));
        }
        if self.scheduler.submit_command.trim().is_empty() {
            return Err(BatchflowError::Configuration(
                "scheduler submit command is empty".to_string(),
            ));
        }
        if self.scheduler.list_command.trim().is_empty() {
            return Err(BatchflowError::Configuration(
                "scheduler list command is empty".to_string(),
            ));
        }
        Ok(())
    }
}
