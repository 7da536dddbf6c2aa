//! Domain identifiers (strongly-typed IDs).
//!
//! `Id<T>` は Phantom type パターンで TaskId と外部ジョブ ID を区別します。
//! 値そのものは u64 で、TaskId はプロセス内で単調増加に払い出されます。

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "task-"）
    fn prefix() -> &'static str;
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    value: u64,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub const fn new(value: u64) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    pub const fn value(&self) -> u64 {
        self.value
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.value)
    }
}

/// Task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// スケジューラが返すジョブ番号のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExternalJob {}

impl IdMarker for ExternalJob {
    fn prefix() -> &'static str {
        "job-"
    }
}

/// Identifier of a Task, unique within the process.
pub type TaskId = Id<Task>;

/// Identifier the batch scheduler assigned to a submitted job.
pub type ExternalJobId = Id<ExternalJob>;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Allocate the next process-unique task id.
    pub fn allocate() -> Self {
        Self::new(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Name of the per-task directory on the remote host (`c00042`).
    pub fn remote_dir_name(&self) -> String {
        format!("c{:05}", self.value)
    }
}
