//! Outcome model: what a finished step exposes to its parent, and what
//! `Task::next` hands back to the dispatcher.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::state::TaskStatus;
use crate::error::BatchflowError;

pub type Tensor3 = [[f64; 3]; 3];

/// Physical quantities reported by a step.
///
/// The engine never interprets these; workflows read the ones they need.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Observables {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converged: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress: Option<Tensor3>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dielectric_constant: Option<Tensor3>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub born_charges: Option<Vec<Tensor3>>,
    /// Derived values (e.g. `bulk_modulus`).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub derived: BTreeMap<String, serde_json::Value>,
}

/// Result of `Task::next`.
#[derive(Debug)]
pub enum Step {
    /// New sub-tasks were created and have to be launched.
    Continue(Vec<TaskId>),
    /// No more sub-tasks; the task is retired with this status.
    Terminal(TaskStatus),
    /// Unrecoverable error; the run aborts.
    Failed(BatchflowError),
}
