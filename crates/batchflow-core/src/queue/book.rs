//! Submission book: pending FIFO + task -> external job mapping.
//!
//! Design:
//! - `pending` holds TaskIds only, in registration order. Only the head may
//!   be submitted, so a later task never overtakes an earlier one.
//! - `tracked` holds one entry per submitted job that is still listed by the
//!   scheduler. Its size is what the cap is checked against.
//! - A refresh moves every tracked job missing from the listing to
//!   `finished`; the next `submit` for that task picks it up exactly once.
//! - Traversed (`Skipped`) entries hold a slot until the next refresh, so a
//!   dry run with `max_jobs = 1` walks one leaf per poll.
//! - A forgotten task leaves the FIFO and the maps. If its job was really
//!   handed to the scheduler it keeps holding a slot as an orphan until it
//!   leaves the listing.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::domain::{ExternalJobId, JobStatus, ListingEntry, TaskId};
use crate::error::{BatchflowError, Result};
use crate::observability::QueueCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tracked {
    Scheduled(ExternalJobId),
    /// Traversed: bookkeeping only, nothing was handed to the scheduler.
    Skipped,
}

impl Tracked {
    fn job_id(&self) -> Option<ExternalJobId> {
        match self {
            Tracked::Scheduled(id) => Some(*id),
            Tracked::Skipped => None,
        }
    }
}

/// Where a registered task currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Head of the FIFO with a free slot.
    Ready,
    /// Pending behind another task or the cap.
    Waiting,
    InFlight(JobStatus),
    /// Gone from the listing since the last refresh.
    Finished(Option<ExternalJobId>),
}

#[derive(Debug, Default)]
pub(crate) struct SubmissionBook {
    max_jobs: Option<usize>,
    pending: VecDeque<TaskId>,
    tracked: HashMap<TaskId, Tracked>,
    finished: HashMap<TaskId, Option<ExternalJobId>>,
    listing: HashMap<ExternalJobId, JobStatus>,
    orphans: HashSet<ExternalJobId>,
}

impl SubmissionBook {
    pub(crate) fn new(max_jobs: Option<usize>) -> Self {
        Self {
            max_jobs,
            ..Self::default()
        }
    }

    pub(crate) fn register(&mut self, task_id: TaskId) -> Result<()> {
        if self.pending.contains(&task_id) || self.tracked.contains_key(&task_id) {
            return Err(BatchflowError::Precondition(format!(
                "{task_id} is already registered"
            )));
        }
        self.pending.push_back(task_id);
        Ok(())
    }

    fn has_capacity(&self) -> bool {
        self.max_jobs
            .is_none_or(|max| self.tracked.len() + self.orphans.len() < max)
    }

    /// `None` when the task is not registered (or was forgotten).
    pub(crate) fn observe(&self, task_id: TaskId) -> Option<Slot> {
        if let Some(job_id) = self.finished.get(&task_id) {
            return Some(Slot::Finished(*job_id));
        }
        if let Some(tracked) = self.tracked.get(&task_id) {
            let status = tracked
                .job_id()
                .and_then(|id| self.listing.get(&id).cloned())
                .unwrap_or(JobStatus::Submitted);
            return Some(Slot::InFlight(status));
        }
        if self.pending.front() == Some(&task_id) && self.has_capacity() {
            return Some(Slot::Ready);
        }
        self.pending.contains(&task_id).then_some(Slot::Waiting)
    }

    /// Drop every trace of a task whose stage was discarded.
    ///
    /// Returns true if the task was still known.
    pub(crate) fn forget(&mut self, task_id: TaskId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|id| *id != task_id);
        let mut known = self.pending.len() != before;
        known |= self.finished.remove(&task_id).is_some();
        if let Some(tracked) = self.tracked.remove(&task_id) {
            known = true;
            if let Some(job_id) = tracked.job_id() {
                self.orphans.insert(job_id);
            }
        }
        known
    }

    /// Move the FIFO head into the mapping.
    pub(crate) fn record_submission(&mut self, task_id: TaskId, tracked: Tracked) -> Result<()> {
        self.pop_head(task_id)?;
        self.tracked.insert(task_id, tracked);
        Ok(())
    }

    /// Drop the FIFO head after the scheduler refused it.
    pub(crate) fn reject(&mut self, task_id: TaskId) -> Result<()> {
        self.pop_head(task_id)
    }

    fn pop_head(&mut self, task_id: TaskId) -> Result<()> {
        if self.pending.front() != Some(&task_id) {
            return Err(BatchflowError::Precondition(format!(
                "{task_id} is not at the head of the pending list"
            )));
        }
        self.pending.pop_front();
        Ok(())
    }

    /// Replace the cached listing and retire every tracked job no longer in
    /// it. Returns the tasks that finished with this refresh.
    pub(crate) fn apply_listing(&mut self, entries: Vec<ListingEntry>) -> Vec<TaskId> {
        self.listing = entries
            .into_iter()
            .map(|entry| (entry.job_id, JobStatus::from_scheduler_code(&entry.state)))
            .collect();
        let listing = &self.listing;
        self.orphans.retain(|id| listing.contains_key(id));

        let gone: Vec<TaskId> = self
            .tracked
            .iter()
            .filter(|(_, tracked)| {
                tracked
                    .job_id()
                    .is_none_or(|id| !self.listing.contains_key(&id))
            })
            .map(|(task_id, _)| *task_id)
            .collect();

        for task_id in &gone {
            if let Some(tracked) = self.tracked.remove(task_id) {
                self.finished.insert(*task_id, tracked.job_id());
            }
        }
        gone
    }

    /// Consume a finished entry; returns false if it was already taken.
    pub(crate) fn take_finished(&mut self, task_id: TaskId) -> bool {
        self.finished.remove(&task_id).is_some()
    }

    pub(crate) fn counts(&self) -> QueueCounts {
        let listed = |wanted: JobStatus| {
            self.tracked
                .values()
                .filter_map(Tracked::job_id)
                .filter(|id| self.listing.get(id) == Some(&wanted))
                .count()
        };
        QueueCounts {
            pending: self.pending.len(),
            tracked: self.tracked.len() + self.orphans.len(),
            running: listed(JobStatus::Running),
            queued_external: listed(JobStatus::Pending),
        }
    }
}
