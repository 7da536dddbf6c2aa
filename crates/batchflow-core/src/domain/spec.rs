//! Input specs for workflows.

use serde::{Deserialize, Serialize};

/// Tolerances and iteration limits shared by the relaxation-based workflows.
///
/// The tolerances are passed through to the job scripts untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaxationSettings {
    pub lattice_tolerance: f64,
    pub force_tolerance: f64,
    pub pressure_target: f64,
    pub stress_tolerance: f64,
    pub max_increase: Option<f64>,
    pub max_iteration: usize,
    pub min_iteration: usize,
}

impl Default for RelaxationSettings {
    fn default() -> Self {
        Self {
            lattice_tolerance: 0.1,
            force_tolerance: 1e-3,
            pressure_target: 0.0,
            stress_tolerance: 0.1,
            max_increase: None,
            max_iteration: 10,
            min_iteration: 1,
        }
    }
}

impl RelaxationSettings {
    /// Settings for the short relaxations of strained cells.
    pub fn for_strained_cells(&self) -> Self {
        Self {
            max_iteration: 3,
            min_iteration: 1,
            ..self.clone()
        }
    }
}
