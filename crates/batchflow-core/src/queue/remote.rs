//! Remote queue: stage the task directory to a remote host, submit there,
//! and bring the directory back once the job has left the listing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use super::archive::{ARCHIVE_NAME, pack_directory, unpack_into};
use super::book::Slot;
use super::config::QueueConfig;
use super::submitter::{Submitter, leaf_job};
use super::JobQueue;
use crate::domain::{JobStatus, TaskId};
use crate::error::{BatchflowError, Result};
use crate::observability::QueueCounts;
use crate::ports::RemoteShell;
use crate::task::Task;

pub struct RemoteQueue<S: RemoteShell> {
    shell: S,
    temporary_dir: PathBuf,
    submitter: Submitter,
}

impl<S: RemoteShell> RemoteQueue<S> {
    pub fn new(shell: S, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        let remote = config.remote.ok_or_else(|| {
            BatchflowError::Configuration("remote queue needs [queue.remote] temporary_dir".to_string())
        })?;
        Ok(Self {
            shell,
            temporary_dir: remote.temporary_dir,
            submitter: Submitter::new(config.scheduler, config.max_jobs),
        })
    }

    pub fn remote_dir(&self, task_id: TaskId) -> PathBuf {
        self.temporary_dir.join(task_id.remote_dir_name())
    }

    async fn run_checked(&self, argv: Vec<String>, cwd: Option<&Path>) -> Result<String> {
        let output = self.shell.run(&argv, cwd).await?.ensure_success(&argv)?;
        Ok(output.output)
    }

    /// Copy the local directory into a fresh remote directory.
    async fn stage_out(&self, local_dir: &Path, remote_dir: &Path) -> Result<()> {
        let remote = remote_dir.display().to_string();
        self.run_checked(argv(&["mkdir", "-p", &remote]), None).await?;

        let archive = pack_directory(local_dir)?;
        let archive_path = remote_dir.join(ARCHIVE_NAME);
        let mut writer = self.shell.open_write(&archive_path).await?;
        writer
            .write_all(&archive)
            .await
            .map_err(|e| BatchflowError::transport_io(format!("failed to write {}", archive_path.display()), e))?;
        writer
            .shutdown()
            .await
            .map_err(|e| BatchflowError::transport_io(format!("failed to close {}", archive_path.display()), e))?;

        self.run_checked(argv(&["tar", "xvf", ARCHIVE_NAME]), Some(remote_dir))
            .await?;
        self.run_checked(argv(&["rm", ARCHIVE_NAME]), Some(remote_dir))
            .await?;
        debug!(local = %local_dir.display(), remote = %remote, bytes = archive.len(), "staged out");
        Ok(())
    }

    /// Copy everything in the remote directory back into the local one.
    async fn stage_in(&self, remote_dir: &Path, local_dir: &Path) -> Result<()> {
        let listing = self.run_checked(argv(&["/bin/ls"]), Some(remote_dir)).await?;
        let mut tar_argv = argv(&["tar", "cvf", ARCHIVE_NAME]);
        tar_argv.extend(listing.split_whitespace().map(str::to_string));
        self.run_checked(tar_argv, Some(remote_dir)).await?;

        let archive_path = remote_dir.join(ARCHIVE_NAME);
        let mut reader = self.shell.open_read(&archive_path).await?;
        let mut archive = Vec::new();
        reader
            .read_to_end(&mut archive)
            .await
            .map_err(|e| BatchflowError::transport_io(format!("failed to read {}", archive_path.display()), e))?;
        unpack_into(&archive, local_dir)?;

        self.run_checked(argv(&["rm", ARCHIVE_NAME]), Some(remote_dir))
            .await?;
        debug!(remote = %remote_dir.display(), local = %local_dir.display(), bytes = archive.len(), "staged in");
        Ok(())
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl<S: RemoteShell> JobQueue for RemoteQueue<S> {
    fn register(&mut self, task: &mut dyn Task) -> Result<()> {
        self.submitter.register(task)
    }

    async fn submit(&mut self, task: &mut dyn Task) -> Result<()> {
        let task_id = task.id();
        let traverse = task.traverse();
        let work_dir = task.work_dir().to_path_buf();
        let remote_dir = self.remote_dir(task_id);
        let job = leaf_job(task)?;
        if job.status().is_terminal() {
            return Ok(());
        }

        match self.submitter.observe(task_id)? {
            Slot::Ready => {
                job.write_script(&work_dir, &self.submitter.profile)?;
                self.stage_out(&work_dir, &remote_dir).await?;
                self.submitter
                    .launch(&self.shell, task_id, job, &remote_dir, traverse)
                    .await?;
            }
            Slot::Waiting => {}
            Slot::InFlight(status) => job.set_status(status, None),
            Slot::Finished(job_id) => {
                // Consumed only once the results are back.
                self.stage_in(&remote_dir, &work_dir).await?;
                self.submitter.book.take_finished(task_id);
                job.set_status(JobStatus::Done, job_id);
                info!(task = %task_id, remote = %remote_dir.display(), "job finished");
            }
        }
        Ok(())
    }

    fn forget(&mut self, task_id: TaskId) {
        self.submitter.forget(task_id);
    }

    async fn qstat(&mut self) -> Result<()> {
        self.submitter.refresh(&self.shell, None).await?;
        Ok(())
    }

    fn counts(&self) -> QueueCounts {
        self.submitter.book.counts()
    }
}
