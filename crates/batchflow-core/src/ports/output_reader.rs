//! OutputReader port - interpret what a finished job left in its directory.

use std::path::Path;

use crate::domain::Observables;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Success(Observables),
    Failure(String),
}

/// `Err` is reserved for I/O trouble; a job that produced no usable output
/// is `Ok(Verdict::Failure)`.
pub trait OutputReader: Send + Sync {
    fn read(&self, work_dir: &Path) -> Result<Verdict>;
}
