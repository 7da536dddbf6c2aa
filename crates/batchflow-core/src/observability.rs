use serde::{Deserialize, Serialize};

/// Snapshot of a queue's bookkeeping, logged once per poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Registered, waiting for a submission slot.
    pub pending: usize,
    /// Submitted and not yet seen leaving the scheduler listing.
    pub tracked: usize,
    pub running: usize,
    /// Tracked jobs the scheduler lists as pending.
    pub queued_external: usize,
}
