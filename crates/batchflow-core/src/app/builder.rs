//! DispatcherBuilder - ディスパッチャの構築とワイヤリング
//!
//! Fail-fast: build() の時点でキューの有無とジョブの紐付けを検証し、
//! ルートタスクを begin() してキューに登録します。

use std::time::Duration;

use super::dispatcher::{Dispatcher, launch};
use crate::error::{BatchflowError, Result};
use crate::queue::JobQueue;
use crate::task::Task;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// # 使用例
/// ```ignore
/// let dispatcher = DispatcherBuilder::new()
///     .queue(LocalQueue::new(config)?)
///     .task(StagedTask::new("si", BulkModulus::new(settings)).with_job(job))
///     .poll_interval(Duration::from_secs(60))
///     .build()?;
/// let report = dispatcher.run().await?;
/// ```
pub struct DispatcherBuilder {
    queue: Option<Box<dyn JobQueue>>,
    roots: Vec<Box<dyn Task>>,
    poll_interval: Duration,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            queue: None,
            roots: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn queue(mut self, queue: impl JobQueue + 'static) -> Self {
        self.queue = Some(Box::new(queue));
        self
    }

    pub fn boxed_queue(mut self, queue: Box<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn task(mut self, task: impl Task + 'static) -> Self {
        self.roots.push(Box::new(task));
        self
    }

    pub fn boxed_task(mut self, task: Box<dyn Task>) -> Self {
        self.roots.push(task);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Validate the wiring, begin every root and register its leaves.
    pub fn build(self) -> Result<Dispatcher> {
        let mut queue = self.queue.ok_or_else(|| {
            BatchflowError::Configuration("dispatcher needs a queue".to_string())
        })?;

        let unbound: Vec<String> = self
            .roots
            .iter()
            .filter(|task| !task.has_job_binding())
            .map(|task| task.name().to_string())
            .collect();
        if !unbound.is_empty() {
            return Err(BatchflowError::Precondition(format!(
                "tasks without a job: {unbound:?}"
            )));
        }

        let mut roots = self.roots;
        for root in roots.iter_mut() {
            launch(root.as_mut(), queue.as_mut())?;
        }
        Ok(Dispatcher::new(queue, roots, self.poll_interval))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
