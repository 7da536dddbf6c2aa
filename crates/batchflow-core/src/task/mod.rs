//! Task model: the capability set every workflow step exposes.
//!
//! A Task is either a leaf that owns exactly one [`Job`] ([`JobTask`]) or a
//! staged composite that owns its sub-tasks ([`StagedTask`]). The dispatcher
//! treats both through this trait only.

mod job_task;
mod staged;

pub use self::job_task::{INPUT_FILE, JobTask};
pub use self::staged::{History, StageContext, StagedTask, Workflow};

use std::path::Path;

use crate::domain::{Job, Observables, Step, TaskId, TaskStatus, Traverse};
use crate::error::Result;

pub trait Task: Send {
    fn id(&self) -> TaskId;

    fn name(&self) -> &str;

    /// Workflow type shown in reports (`bulk_modulus`, `job`, ...).
    fn kind(&self) -> &str;

    fn work_dir(&self) -> &Path;

    fn stage(&self) -> usize;

    fn status(&self) -> &TaskStatus;

    fn traverse(&self) -> Traverse;

    /// The schedulable job; `Some` only for leaves.
    fn job(&self) -> Option<&Job> {
        None
    }

    fn job_mut(&mut self) -> Option<&mut Job> {
        None
    }

    /// Whether a job template is bound, so sub-tasks can be created.
    fn has_job_binding(&self) -> bool;

    /// Prepare the working directory and the first stage.
    fn begin(&mut self) -> Result<()>;

    /// Re-aggregate status from the job or the current stage's sub-tasks.
    fn set_status(&mut self) -> Result<()>;

    fn done(&self) -> bool {
        let status = self.status();
        status.is_terminal() || *status == TaskStatus::Next
    }

    /// Consume a `done()` status: advance, finish, restart or stop.
    fn next(&mut self) -> Step;

    fn active_tasks(&self) -> &[Box<dyn Task>] {
        &[]
    }

    fn active_tasks_mut(&mut self) -> &mut [Box<dyn Task>] {
        Default::default()
    }

    /// Results, once the task is `done`.
    fn observables(&self) -> Option<&Observables>;

    /// True once `next()` returned `Terminal`.
    fn is_retired(&self) -> bool;
}
