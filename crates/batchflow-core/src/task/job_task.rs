use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::Task;
use crate::domain::{Job, JobStatus, Observables, Step, TaskId, TaskStatus, Traverse};
use crate::error::{BatchflowError, Result};
use crate::impls::JsonResultReader;
use crate::ports::{OutputReader, Verdict};

/// File the job script reads its parameters from.
pub const INPUT_FILE: &str = "input.json";

/// Leaf task: one job run in its own directory.
///
/// The status follows the job. Once the queue reports the job done, the
/// output reader decides between `done` (with observables) and `terminate`.
pub struct JobTask {
    id: TaskId,
    name: String,
    work_dir: PathBuf,
    job: Job,
    inputs: serde_json::Value,
    reader: Arc<dyn OutputReader>,
    traverse: Traverse,
    status: TaskStatus,
    observables: Option<Observables>,
    begun: bool,
    retired: bool,
}

impl JobTask {
    pub fn new(work_dir: impl Into<PathBuf>, job: Job, inputs: serde_json::Value) -> Self {
        let work_dir = work_dir.into();
        let name = work_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| work_dir.display().to_string());
        Self {
            id: TaskId::allocate(),
            name,
            work_dir,
            job,
            inputs,
            reader: Arc::new(JsonResultReader),
            traverse: Traverse::Off,
            status: TaskStatus::Preparing,
            observables: None,
            begun: false,
            retired: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_traverse(mut self, traverse: Traverse) -> Self {
        self.traverse = traverse;
        self
    }

    pub fn with_reader(mut self, reader: Arc<dyn OutputReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn inputs(&self) -> &serde_json::Value {
        &self.inputs
    }
}

impl Task for JobTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "job"
    }

    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn stage(&self) -> usize {
        0
    }

    fn status(&self) -> &TaskStatus {
        &self.status
    }

    fn traverse(&self) -> Traverse {
        self.traverse
    }

    fn job(&self) -> Option<&Job> {
        Some(&self.job)
    }

    fn job_mut(&mut self) -> Option<&mut Job> {
        Some(&mut self.job)
    }

    fn has_job_binding(&self) -> bool {
        true
    }

    fn begin(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.work_dir)
            .map_err(|e| BatchflowError::io(&self.work_dir, e))?;
        let path = self.work_dir.join(INPUT_FILE);
        let text = serde_json::to_string_pretty(&self.inputs)?;
        std::fs::write(&path, text).map_err(|e| BatchflowError::io(&path, e))?;
        self.status = TaskStatus::Preparing;
        self.begun = true;
        Ok(())
    }

    fn set_status(&mut self) -> Result<()> {
        if !self.begun {
            return Err(BatchflowError::Precondition(format!(
                "{} ({}) has not begun",
                self.name, self.id
            )));
        }
        if self.status.is_terminal() {
            return Ok(());
        }
        self.status = match self.job.status() {
            JobStatus::Done => match self.reader.read(&self.work_dir)? {
                Verdict::Success(observables) => {
                    self.observables = Some(observables);
                    TaskStatus::Done
                }
                Verdict::Failure(reason) => {
                    warn!(task = %self.id, name = %self.name, %reason, "step terminated");
                    TaskStatus::Terminate
                }
            },
            JobStatus::Terminate => TaskStatus::Terminate,
            JobStatus::Unset | JobStatus::Preparing => TaskStatus::Preparing,
            other => TaskStatus::Stage(other.to_string()),
        };
        Ok(())
    }

    fn next(&mut self) -> Step {
        if !self.status.is_terminal() {
            return Step::Failed(BatchflowError::Precondition(format!(
                "next() on {} while it is {}",
                self.id, self.status
            )));
        }
        self.retired = true;
        info!(task = %self.id, name = %self.name, status = %self.status, "step finished");
        Step::Terminal(self.status.clone())
    }

    fn observables(&self) -> Option<&Observables> {
        self.observables.as_ref()
    }

    fn is_retired(&self) -> bool {
        self.retired
    }
}
