//! Queue module: submission throttling, scheduler polling and staging.
//!
//! Both variants share the same bookkeeping ([`book`]) and submission path
//! ([`submitter`]); the remote one adds staging of the task directory.

mod archive;
mod book;
mod config;
mod local;
mod remote;
mod submitter;

pub use archive::ARCHIVE_NAME;
pub use config::{QueueConfig, RemoteConfig};
pub use local::LocalQueue;
pub use remote::RemoteQueue;

use async_trait::async_trait;

use crate::domain::TaskId;
use crate::error::Result;
use crate::observability::QueueCounts;
use crate::task::Task;

/// Queue port.
///
/// Owned by the dispatcher; nothing here is shared across threads.
#[async_trait]
pub trait JobQueue: Send {
    /// Append a leaf to the pending list and mark its job `Preparing`.
    fn register(&mut self, task: &mut dyn Task) -> Result<()>;

    /// Advance one leaf: submit it if it is at the head and a slot is free,
    /// otherwise copy the latest known status onto its job.
    async fn submit(&mut self, task: &mut dyn Task) -> Result<()>;

    /// Stop tracking a leaf whose stage was discarded. Unknown ids are
    /// ignored.
    fn forget(&mut self, task_id: TaskId);

    /// Refresh the scheduler listing once.
    async fn qstat(&mut self) -> Result<()>;

    fn counts(&self) -> QueueCounts;
}
