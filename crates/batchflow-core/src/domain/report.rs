//! Per-task YAML report.
//!
//! Written next to the task directory as `<work_dir>.yaml` whenever a staged
//! task begins, crosses a stage boundary or reaches a terminal status.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::outcome::Observables;
use super::spec::RelaxationSettings;
use crate::error::{BatchflowError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_type: String,
    pub name: String,
    pub directory: PathBuf,
    pub stage: usize,
    pub status: String,
    pub traverse: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<RelaxationSettings>,
    pub stages: Vec<StageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Observables>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: usize,
    pub tasks: Vec<ChildReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChildReport {
    pub id: String,
    pub name: String,
    pub status: String,
}

/// `runs/bulk` -> `runs/bulk.yaml`
pub fn report_path(work_dir: &Path) -> PathBuf {
    let mut path = work_dir.as_os_str().to_owned();
    path.push(".yaml");
    PathBuf::from(path)
}

impl TaskReport {
    pub fn write(&self) -> Result<PathBuf> {
        let path = report_path(&self.directory);
        let text = serde_yaml::to_string(self)?;
        std::fs::write(&path, text).map_err(|e| BatchflowError::io(&path, e))?;
        Ok(path)
    }
}
