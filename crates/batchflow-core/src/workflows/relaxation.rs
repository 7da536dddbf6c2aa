use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use super::merge_inputs;
use crate::domain::{Decision, Observables, RelaxationSettings};
use crate::error::{BatchflowError, Result};
use crate::task::{History, StageContext, Task, Workflow};

/// Iterative structure optimisation.
///
/// Stage k runs one job in `relax-<k+1>`, continuing from the previous
/// iteration's directory, until the job reports `converged`.
#[derive(Debug, Clone)]
pub struct Relaxation {
    settings: RelaxationSettings,
    inputs: Value,
}

impl Relaxation {
    pub fn new(settings: RelaxationSettings) -> Self {
        Self {
            settings,
            inputs: Value::Null,
        }
    }

    /// Extra keys passed to every iteration (e.g. an applied strain).
    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.inputs = inputs;
        self
    }
}

impl Workflow for Relaxation {
    fn kind(&self) -> &'static str {
        "structure_optimization"
    }

    fn stage_label(&self, _stage: usize) -> String {
        "optimizing".to_string()
    }

    fn build_stage(&self, ctx: &StageContext<'_>, _history: &History) -> Result<Vec<Box<dyn Task>>> {
        let iteration = ctx.stage + 1;
        let mut base = Map::new();
        base.insert("iteration".to_string(), json!(iteration));
        base.insert("settings".to_string(), serde_json::to_value(&self.settings)?);
        if ctx.stage > 0 {
            base.insert("previous".to_string(), json!(format!("../relax-{}", ctx.stage)));
        }
        let inputs = merge_inputs(base, &self.inputs);
        Ok(vec![ctx.job_task(&format!("relax-{iteration}"), inputs)])
    }

    fn decide(&self, stage: usize, history: &History) -> Decision {
        let iteration = stage + 1;
        let converged = history
            .observables(stage, 0)
            .and_then(|obs| obs.converged)
            .unwrap_or(false);
        if converged && iteration >= self.settings.min_iteration {
            Decision::Complete
        } else if iteration >= self.settings.max_iteration {
            Decision::MaxIteration
        } else {
            Decision::Advance
        }
    }

    fn finish(&mut self, history: &History) -> Result<Observables> {
        let last = history.len().saturating_sub(1);
        history.observables(last, 0).cloned().ok_or_else(|| {
            BatchflowError::derivation("structure_optimization", "last iteration has no results")
        })
    }

    fn settings(&self) -> Option<&RelaxationSettings> {
        Some(&self.settings)
    }

    fn report_fields(&self, history: &History) -> BTreeMap<String, Value> {
        BTreeMap::from([("iterations".to_string(), json!(history.len()))])
    }
}
