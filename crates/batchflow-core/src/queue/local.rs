use async_trait::async_trait;
use tracing::info;

use super::book::Slot;
use super::config::QueueConfig;
use super::submitter::{Submitter, leaf_job};
use super::JobQueue;
use crate::domain::{JobStatus, TaskId};
use crate::error::Result;
use crate::impls::LocalShell;
use crate::observability::QueueCounts;
use crate::ports::Shell;
use crate::task::Task;

/// Queue that submits from the task's own directory on this host.
pub struct LocalQueue<S: Shell = LocalShell> {
    shell: S,
    submitter: Submitter,
}

impl LocalQueue<LocalShell> {
    pub fn new(config: QueueConfig) -> Result<Self> {
        Self::with_shell(LocalShell, config)
    }
}

impl<S: Shell> LocalQueue<S> {
    pub fn with_shell(shell: S, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shell,
            submitter: Submitter::new(config.scheduler, config.max_jobs),
        })
    }
}

#[async_trait]
impl<S: Shell> JobQueue for LocalQueue<S> {
    fn register(&mut self, task: &mut dyn Task) -> Result<()> {
        self.submitter.register(task)
    }

    async fn submit(&mut self, task: &mut dyn Task) -> Result<()> {
        let task_id = task.id();
        let traverse = task.traverse();
        let work_dir = task.work_dir().to_path_buf();
        let job = leaf_job(task)?;
        if job.status().is_terminal() {
            return Ok(());
        }

        match self.submitter.observe(task_id)? {
            Slot::Ready => {
                job.write_script(&work_dir, &self.submitter.profile)?;
                self.submitter
                    .launch(&self.shell, task_id, job, &work_dir, traverse)
                    .await?;
            }
            Slot::Waiting => {}
            Slot::InFlight(status) => job.set_status(status, None),
            Slot::Finished(job_id) => {
                if self.submitter.book.take_finished(task_id) {
                    job.set_status(JobStatus::Done, job_id);
                    info!(task = %task_id, "job finished");
                }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, Traverse};
    use crate::testing::FakeScheduler;
    use crate::task::JobTask;

    fn queue(fake: &FakeScheduler, max_jobs: Option<usize>) -> LocalQueue<FakeScheduler> {
        LocalQueue::with_shell(
            fake.clone(),
            QueueConfig {
                max_jobs,
                ..QueueConfig::default()
            },
        )
        .unwrap()
    }

    fn leaf(root: &std::path::Path, name: &str) -> JobTask {
        let job = Job::new("echo hi", "gr10260f").unwrap();
        let mut task = JobTask::new(root.join(name), job, serde_json::json!({}));
        task.begin().unwrap();
        task
    }

    #[tokio::test]
    async fn register_marks_job_preparing() {
        let root = tempfile::tempdir().unwrap();
        let fake = FakeScheduler::new();
        let mut q = queue(&fake, None);
        let mut a = leaf(root.path(), "a");
        q.register(&mut a).unwrap();
        assert_eq!(a.job().unwrap().status(), &JobStatus::Preparing);
        assert_eq!(q.counts().pending, 1);
    }

    #[tokio::test]
    async fn submit_writes_script_and_records_job_id() {
        let root = tempfile::tempdir().unwrap();
        let fake = FakeScheduler::new();
        let mut q = queue(&fake, None);
        let mut a = leaf(root.path(), "a");
        q.register(&mut a).unwrap();

        q.qstat().await.unwrap();
        q.submit(&mut a).await.unwrap();

        let job = a.job().unwrap();
        assert_eq!(job.status(), &JobStatus::Submitted);
        assert_eq!(job.external_id().map(|id| id.value()), Some(1001));
        assert!(root.path().join("a/job.sh").exists());
        assert_eq!(fake.submissions(), vec![root.path().join("a")]);
    }

    #[tokio::test]
    async fn cap_keeps_second_task_pending_until_first_leaves_listing() {
        let root = tempfile::tempdir().unwrap();
        let fake = FakeScheduler::new();
        let mut q = queue(&fake, Some(1));
        let mut a = leaf(root.path(), "a");
        let mut b = leaf(root.path(), "b");
        q.register(&mut a).unwrap();
        q.register(&mut b).unwrap();

        q.qstat().await.unwrap();
        q.submit(&mut a).await.unwrap();
        q.submit(&mut b).await.unwrap();
        assert_eq!(fake.submissions().len(), 1);
        assert_eq!(b.job().unwrap().status(), &JobStatus::Preparing);

        fake.set_state(1001, "RUN");
        q.qstat().await.unwrap();
        q.submit(&mut a).await.unwrap();
        q.submit(&mut b).await.unwrap();
        assert_eq!(a.job().unwrap().status(), &JobStatus::Running);
        assert_eq!(fake.submissions().len(), 1);

        fake.finish(1001);
        q.qstat().await.unwrap();
        assert_eq!(q.counts().tracked, 0);
        q.submit(&mut b).await.unwrap();
        assert_eq!(fake.submissions().len(), 2);
        assert_eq!(b.job().unwrap().status(), &JobStatus::Submitted);

        q.submit(&mut a).await.unwrap();
        assert_eq!(a.job().unwrap().status(), &JobStatus::Done);
    }

    #[tokio::test]
    async fn later_task_never_overtakes_earlier_one() {
        let root = tempfile::tempdir().unwrap();
        let fake = FakeScheduler::new();
        let mut q = queue(&fake, Some(2));
        let mut a = leaf(root.path(), "a");
        let mut b = leaf(root.path(), "b");
        q.register(&mut a).unwrap();
        q.register(&mut b).unwrap();

        q.qstat().await.unwrap();
        q.submit(&mut b).await.unwrap();
        assert!(fake.submissions().is_empty());
        q.submit(&mut a).await.unwrap();
        q.submit(&mut b).await.unwrap();
        assert_eq!(
            fake.submissions(),
            vec![root.path().join("a"), root.path().join("b")]
        );
    }

    #[tokio::test]
    async fn refused_submission_terminates_job_and_frees_the_head() {
        let root = tempfile::tempdir().unwrap();
        let fake = FakeScheduler::new();
        fake.refuse_submissions(true);
        let mut q = queue(&fake, Some(1));
        let mut a = leaf(root.path(), "a");
        let mut b = leaf(root.path(), "b");
        q.register(&mut a).unwrap();
        q.register(&mut b).unwrap();

        q.qstat().await.unwrap();
        q.submit(&mut a).await.unwrap();
        assert_eq!(a.job().unwrap().status(), &JobStatus::Terminate);

        fake.refuse_submissions(false);
        q.submit(&mut b).await.unwrap();
        assert_eq!(b.job().unwrap().status(), &JobStatus::Submitted);
    }

    #[tokio::test]
    async fn traversed_task_is_never_submitted_but_finishes() {
        let root = tempfile::tempdir().unwrap();
        let fake = FakeScheduler::new();
        let mut q = queue(&fake, None);
        let mut a = leaf(root.path(), "a").with_traverse(Traverse::On);
        q.register(&mut a).unwrap();

        q.qstat().await.unwrap();
        q.submit(&mut a).await.unwrap();
        assert!(root.path().join("a/job.sh").exists());
        assert_eq!(a.job().unwrap().status(), &JobStatus::Submitted);

        q.qstat().await.unwrap();
        q.submit(&mut a).await.unwrap();
        assert_eq!(a.job().unwrap().status(), &JobStatus::Done);
        assert!(fake.submissions().is_empty());
    }

    #[tokio::test]
    async fn unregistered_task_is_a_precondition_error() {
        let root = tempfile::tempdir().unwrap();
        let fake = FakeScheduler::new();
        let mut q = queue(&fake, None);
        let mut a = leaf(root.path(), "a");
        let err = q.submit(&mut a).await.unwrap_err();
        assert!(matches!(err, crate::error::BatchflowError::Precondition(_)));
    }
}
