//! Submission path shared by the local and remote queues.

use std::path::Path;

use tracing::{debug, info, warn};

use super::book::{Slot, SubmissionBook, Tracked};
use crate::domain::{Job, JobStatus, SchedulerProfile, TaskId, Traverse};
use crate::error::{BatchflowError, Result};
use crate::ports::Shell;
use crate::task::Task;

pub(crate) struct Submitter {
    pub(crate) profile: SchedulerProfile,
    pub(crate) book: SubmissionBook,
}

impl Submitter {
    pub(crate) fn new(profile: SchedulerProfile, max_jobs: Option<usize>) -> Self {
        Self {
            profile,
            book: SubmissionBook::new(max_jobs),
        }
    }

    pub(crate) fn register(&mut self, task: &mut dyn Task) -> Result<()> {
        let task_id = task.id();
        let job = leaf_job(task)?;
        self.book.register(task_id)?;
        job.set_status(JobStatus::Preparing, None);
        debug!(task = %task_id, "registered");
        Ok(())
    }

    /// Run the listing command and retire jobs that left it.
    pub(crate) async fn refresh<S: Shell + ?Sized>(
        &mut self,
        shell: &S,
        cwd: Option<&Path>,
    ) -> Result<Vec<TaskId>> {
        let argv = self.profile.list_argv();
        let output = shell.run(&argv, cwd).await?.ensure_success(&argv)?;
        let entries = self.profile.parse_listing(&output.output);
        debug!(listed = entries.len(), "refreshed scheduler listing");
        let finished = self.book.apply_listing(entries);
        for task_id in &finished {
            debug!(task = %task_id, "job left the listing");
        }
        Ok(finished)
    }

    /// Hand the head of the FIFO to the scheduler from `run_dir`.
    ///
    /// A refused submission marks the job `Terminate` instead of failing.
    pub(crate) async fn launch<S: Shell + ?Sized>(
        &mut self,
        shell: &S,
        task_id: TaskId,
        job: &mut Job,
        run_dir: &Path,
        traverse: Traverse,
    ) -> Result<()> {
        if traverse.skips_submission() {
            self.book.record_submission(task_id, Tracked::Skipped)?;
            job.set_status(JobStatus::Submitted, None);
            info!(task = %task_id, traverse = %traverse, "submission skipped");
            return Ok(());
        }

        let argv = self.profile.submit_argv();
        let output = shell.run(&argv, Some(run_dir)).await?;
        if !output.success {
            warn!(
                task = %task_id,
                code = ?output.code,
                output = %output.output.trim(),
                "scheduler refused submission"
            );
            self.book.reject(task_id)?;
            job.set_status(JobStatus::Terminate, None);
            return Ok(());
        }

        let job_id = self.profile.parse_job_id(&output.output)?;
        self.book
            .record_submission(task_id, Tracked::Scheduled(job_id))?;
        job.set_status(JobStatus::Submitted, Some(job_id));
        info!(task = %task_id, job_id = %job_id, job_name = job.job_name(), "submitted");
        Ok(())
    }

    pub(crate) fn observe(&self, task_id: TaskId) -> Result<Slot> {
        self.book.observe(task_id).ok_or_else(|| {
            BatchflowError::Precondition(format!(
                "{task_id} was submitted without being registered"
            ))
        })
    }

    pub(crate) fn forget(&mut self, task_id: TaskId) {
        if self.book.forget(task_id) {
            debug!(task = %task_id, "forgotten");
        }
    }
}

pub(crate) fn leaf_job(task: &mut dyn Task) -> Result<&mut Job> {
    let task_id = task.id();
    task.job_mut().ok_or_else(|| {
        BatchflowError::Precondition(format!("{task_id} has no job to submit"))
    })
}
