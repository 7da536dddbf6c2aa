//! Dispatcher - 単一スレッドのポーリングループ
//!
//! # フロー（1 イテレーション）
//! 1. JobQueue::qstat() でスケジューラの一覧を更新
//! 2. 生きているルートタスクを深さ優先で駆動
//!    - leaf: submit → set_status
//!    - composite: 子を駆動 → set_status → done() なら next()
//! 3. Terminal を返したルートを退役
//!
//! next() で捨てられたステージの leaf は JobQueue::forget で台帳から外す。
//!
//! Queue は Dispatcher が所有するのでロックは不要です。

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::domain::{Step, TaskId};
use crate::error::Result;
use crate::observability::QueueCounts;
use crate::queue::JobQueue;
use crate::task::Task;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub iteration: u64,
    pub live_roots: usize,
    /// Roots retired during this iteration.
    pub retired: Vec<TaskId>,
    pub counts: QueueCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootOutcome {
    pub name: String,
    pub kind: String,
    pub directory: PathBuf,
    pub stage: usize,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub iterations: u64,
    /// Stopped by a shutdown request before every root retired.
    pub interrupted: bool,
    pub roots: Vec<RootOutcome>,
}

impl RunReport {
    pub fn all_done(&self) -> bool {
        !self.interrupted && self.roots.iter().all(|root| root.status == "done")
    }
}

pub struct Dispatcher {
    queue: Box<dyn JobQueue>,
    roots: Vec<Box<dyn Task>>,
    poll_interval: Duration,
    iteration: u64,
}

impl Dispatcher {
    pub(crate) fn new(
        queue: Box<dyn JobQueue>,
        roots: Vec<Box<dyn Task>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            roots,
            poll_interval,
            iteration: 0,
        }
    }

    pub fn roots(&self) -> &[Box<dyn Task>] {
        &self.roots
    }

    pub fn counts(&self) -> QueueCounts {
        self.queue.counts()
    }

    /// One polling iteration.
    pub async fn poll_once(&mut self) -> Result<PollSummary> {
        self.iteration += 1;
        self.queue.qstat().await?;

        let mut retired = Vec::new();
        for root in self.roots.iter_mut().filter(|root| !root.is_retired()) {
            drive(root.as_mut(), self.queue.as_mut()).await?;
            if root.is_retired() {
                retired.push(root.id());
            }
        }

        let summary = PollSummary {
            iteration: self.iteration,
            live_roots: self.roots.iter().filter(|root| !root.is_retired()).count(),
            retired,
            counts: self.queue.counts(),
        };
        debug!(
            iteration = summary.iteration,
            live_roots = summary.live_roots,
            pending = summary.counts.pending,
            tracked = summary.counts.tracked,
            running = summary.counts.running,
            "poll finished"
        );
        Ok(summary)
    }

    /// Poll until every root has retired.
    pub async fn run(self) -> Result<RunReport> {
        let (_keep_alive, shutdown) = watch::channel(false);
        self.run_until(shutdown).await
    }

    /// Poll until every root has retired or `shutdown` turns true (or its
    /// sender is dropped).
    pub async fn run_until(mut self, mut shutdown: watch::Receiver<bool>) -> Result<RunReport> {
        info!(roots = self.roots.len(), interval = ?self.poll_interval, "dispatcher started");
        let mut interrupted = false;
        loop {
            let summary = self.poll_once().await?;
            if summary.live_roots == 0 {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        interrupted = true;
                        break;
                    }
                }
            }
        }
        let report = self.report(interrupted);
        info!(iterations = report.iterations, interrupted, "dispatcher stopped");
        Ok(report)
    }

    pub fn report(&self, interrupted: bool) -> RunReport {
        RunReport {
            iterations: self.iteration,
            interrupted,
            roots: self
                .roots
                .iter()
                .map(|root| RootOutcome {
                    name: root.name().to_string(),
                    kind: root.kind().to_string(),
                    directory: root.work_dir().to_path_buf(),
                    stage: root.stage(),
                    status: root.status().to_string(),
                })
                .collect(),
        }
    }
}

/// Begin `task` and register every leaf below it.
pub(crate) fn launch(task: &mut dyn Task, queue: &mut dyn JobQueue) -> Result<()> {
    task.begin()?;
    if task.job().is_some() {
        return queue.register(task);
    }
    for child in task.active_tasks_mut() {
        launch(child.as_mut(), queue)?;
    }
    Ok(())
}

fn leaf_ids(task: &dyn Task) -> Vec<TaskId> {
    if task.job().is_some() {
        return vec![task.id()];
    }
    task.active_tasks().iter().flat_map(|child| leaf_ids(child.as_ref())).collect()
}

type DriveFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Drive one task depth-first. Boxed because the tree is recursive.
fn drive<'a>(task: &'a mut dyn Task, queue: &'a mut dyn JobQueue) -> DriveFuture<'a> {
    Box::pin(async move {
        if task.is_retired() {
            return Ok(());
        }
        if task.job().is_some() {
            queue.submit(&mut *task).await?;
        } else {
            for child in task.active_tasks_mut() {
                drive(child.as_mut(), &mut *queue).await?;
            }
        }
        task.set_status()?;
        if !task.done() {
            return Ok(());
        }

        // Leaves of the stage that next() is about to leave behind.
        let previous = leaf_ids(&*task);
        let step = task.next();
        if !matches!(step, Step::Failed(_)) {
            for leaf in previous {
                queue.forget(leaf);
            }
        }

        match step {
            Step::Continue(ids) => {
                debug!(task = %task.id(), children = ids.len(), "launching sub-tasks");
                for child in task.active_tasks_mut() {
                    if ids.contains(&child.id()) {
                        launch(child.as_mut(), &mut *queue)?;
                    }
                }
                Ok(())
            }
            Step::Terminal(_) => Ok(()),
            Step::Failed(err) => Err(err),
        }
    })
}
