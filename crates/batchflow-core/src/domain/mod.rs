//! Domain model: jobs, task states, identifiers and reports.

pub mod decision;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod report;
pub mod scheduler;
pub mod spec;
pub mod state;

pub use decision::Decision;
pub use ids::{ExternalJobId, TaskId};
pub use job::{Job, JobDirectives, JobSpec, JobStatus, parse_directives};
pub use outcome::{Observables, Step, Tensor3};
pub use report::{ChildReport, StageReport, TaskReport};
pub use scheduler::{ListingEntry, SchedulerProfile};
pub use spec::RelaxationSettings;
pub use state::{TaskStatus, Traverse};
