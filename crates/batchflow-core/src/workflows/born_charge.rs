//! Born effective charges and the dielectric tensor of a relaxed cell.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::Relaxation;
use crate::domain::{Decision, Observables, RelaxationSettings, Tensor3};
use crate::error::{BatchflowError, Result};
use crate::task::{History, StageContext, Task, Workflow};

const EQUILIBRIUM: usize = 0;
const CHARGES: usize = 1;

#[derive(Debug, Clone)]
pub struct BornEffectiveCharge {
    settings: RelaxationSettings,
    relaxed: bool,
    symmetry_tolerance: Option<f64>,
    atoms: Option<usize>,
}

impl BornEffectiveCharge {
    pub fn new(settings: RelaxationSettings) -> Self {
        Self {
            settings,
            relaxed: false,
            symmetry_tolerance: None,
            atoms: None,
        }
    }

    /// Skip the relaxation stage.
    pub fn relaxed(mut self) -> Self {
        self.relaxed = true;
        self
    }

    pub fn with_symmetry_tolerance(mut self, tolerance: f64) -> Self {
        self.symmetry_tolerance = Some(tolerance);
        self
    }
}

/// (ε + εᵀ) / 2
fn symmetrize(m: &Tensor3) -> Tensor3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, value) in row.iter_mut().enumerate() {
            *value = (m[i][j] + m[j][i]) / 2.0;
        }
    }
    out
}

/// Subtract the mean charge tensor so the charges sum to zero.
fn acoustic_sum_rule(charges: &[Tensor3]) -> Vec<Tensor3> {
    let n = charges.len() as f64;
    let mut mean = [[0.0; 3]; 3];
    for charge in charges {
        for i in 0..3 {
            for j in 0..3 {
                mean[i][j] += charge[i][j] / n;
            }
        }
    }
    charges
        .iter()
        .map(|charge| {
            let mut out = *charge;
            for i in 0..3 {
                for j in 0..3 {
                    out[i][j] -= mean[i][j];
                }
            }
            out
        })
        .collect()
}

impl Workflow for BornEffectiveCharge {
    fn kind(&self) -> &'static str {
        "born_effective_charge"
    }

    fn first_stage(&self) -> usize {
        if self.relaxed { CHARGES } else { EQUILIBRIUM }
    }

    fn stage_label(&self, stage: usize) -> String {
        match stage {
            EQUILIBRIUM => "equilibrium",
            _ => "born effective charge",
        }
        .to_string()
    }

    fn build_stage(&self, ctx: &StageContext<'_>, history: &History) -> Result<Vec<Box<dyn Task>>> {
        if ctx.stage == EQUILIBRIUM {
            return Ok(vec![
                ctx.staged("equilibrium", Relaxation::new(self.settings.clone())),
            ]);
        }
        let mut inputs = json!({ "relaxed_in": Value::Null });
        if history.observables(EQUILIBRIUM, 0).is_some() {
            inputs["relaxed_in"] = json!("../equilibrium");
        }
        if let Some(tolerance) = self.symmetry_tolerance {
            inputs["symmetry_tolerance"] = json!(tolerance);
        }
        Ok(vec![ctx.job_task("born", inputs)])
    }

    fn decide(&self, stage: usize, history: &History) -> Decision {
        if stage == EQUILIBRIUM {
            return Decision::Advance;
        }
        match history.observables(CHARGES, 0) {
            Some(obs) if obs.born_charges.is_some() && obs.dielectric_constant.is_some() => {
                Decision::Complete
            }
            _ => Decision::Terminate {
                reason: "born charges or dielectric constant missing".to_string(),
            },
        }
    }

    fn finish(&mut self, history: &History) -> Result<Observables> {
        let fail = |message: &str| BatchflowError::derivation("born_effective_charge", message);
        let obs = history
            .observables(CHARGES, 0)
            .ok_or_else(|| fail("born job has no results"))?;
        let charges = obs
            .born_charges
            .as_deref()
            .filter(|charges| !charges.is_empty())
            .ok_or_else(|| fail("no born charges reported"))?;
        let epsilon = obs
            .dielectric_constant
            .ok_or_else(|| fail("no dielectric constant reported"))?;

        self.atoms = Some(charges.len());
        Ok(Observables {
            energy: history
                .observables(EQUILIBRIUM, 0)
                .and_then(|eq| eq.energy),
            volume: obs.volume,
            dielectric_constant: Some(symmetrize(&epsilon)),
            born_charges: Some(acoustic_sum_rule(charges)),
            ..Observables::default()
        })
    }

    fn settings(&self) -> Option<&RelaxationSettings> {
        Some(&self.settings)
    }

    fn report_fields(&self, history: &History) -> BTreeMap<String, Value> {
        let mut fields = BTreeMap::new();
        if let Some(atoms) = self.atoms {
            fields.insert("atoms".to_string(), json!(atoms));
        }
        if let Some(energy) = history
            .observables(EQUILIBRIUM, 0)
            .and_then(|obs| obs.energy)
        {
            fields.insert("electric_total_energy".to_string(), json!(energy));
        }
        fields
    }
}
