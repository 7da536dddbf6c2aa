//! Bulk modulus from two strained cells.
//!
//! 1. Relax the cell to equilibrium (skipped when the relaxed volume is given).
//! 2. Relax the cell at +1% and -1% volume, or at each explicit strain.
//!
//! With the default strains the result is the finite difference
//! `B = -tr(s+ - s-)/3 * V / (V+ - V-)`.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::Relaxation;
use crate::domain::{Decision, Observables, RelaxationSettings, Tensor3};
use crate::error::{BatchflowError, Result};
use crate::task::{History, StageContext, Task, Workflow};

const EQUILIBRIUM: usize = 0;
const STRAINS: usize = 1;
const DEFAULT_STRAINS: [(&str, f64); 2] = [("plus", 0.01), ("minus", -0.01)];

#[derive(Debug, Clone)]
pub struct BulkModulus {
    settings: RelaxationSettings,
    strains: Option<Vec<f64>>,
    relaxed_volume: Option<f64>,
    bulk_modulus: Option<f64>,
}

impl BulkModulus {
    pub fn new(settings: RelaxationSettings) -> Self {
        Self {
            settings,
            strains: None,
            relaxed_volume: None,
            bulk_modulus: None,
        }
    }

    /// Relax at these volume strains instead of ±1%. No modulus is derived.
    pub fn with_strains(mut self, strains: Vec<f64>) -> Self {
        self.strains = Some(strains);
        self
    }

    /// Treat the input cell as relaxed with this volume.
    pub fn with_relaxed_volume(mut self, volume: f64) -> Self {
        self.relaxed_volume = Some(volume);
        self
    }

    pub fn bulk_modulus(&self) -> Option<f64> {
        self.bulk_modulus
    }

    fn reference_volume(&self, history: &History) -> Option<f64> {
        self.relaxed_volume
            .or_else(|| history.observables(EQUILIBRIUM, 0)?.volume)
    }

    fn strained(&self) -> Vec<(String, f64)> {
        match &self.strains {
            Some(strains) => strains
                .iter()
                .enumerate()
                .map(|(i, s)| (format!("strain-{}", i + 1), *s))
                .collect(),
            None => DEFAULT_STRAINS
                .iter()
                .map(|(name, s)| (name.to_string(), *s))
                .collect(),
        }
    }
}

fn trace(m: &Tensor3) -> f64 {
    m[0][0] + m[1][1] + m[2][2]
}

impl Workflow for BulkModulus {
    fn kind(&self) -> &'static str {
        "bulk_modulus"
    }

    fn first_stage(&self) -> usize {
        if self.relaxed_volume.is_some() {
            STRAINS
        } else {
            EQUILIBRIUM
        }
    }

    fn stage_label(&self, stage: usize) -> String {
        match stage {
            EQUILIBRIUM => "equilibrium",
            _ => "strains",
        }
        .to_string()
    }

    fn build_stage(&self, ctx: &StageContext<'_>, history: &History) -> Result<Vec<Box<dyn Task>>> {
        if ctx.stage == EQUILIBRIUM {
            return Ok(vec![
                ctx.staged("equilibrium", Relaxation::new(self.settings.clone())),
            ]);
        }
        let volume = self.reference_volume(history).ok_or_else(|| {
            BatchflowError::derivation("bulk_modulus", "equilibrium stage reported no volume")
        })?;
        let settings = self.settings.for_strained_cells();
        Ok(self
            .strained()
            .into_iter()
            .map(|(name, strain)| {
                let relaxation = Relaxation::new(settings.clone()).with_inputs(json!({
                    "reference_volume": volume,
                    "volume_strain": strain,
                }));
                ctx.staged(&name, relaxation)
            })
            .collect())
    }

    fn decide(&self, stage: usize, history: &History) -> Decision {
        if stage == EQUILIBRIUM {
            return Decision::Advance;
        }
        if self.strains.is_none() {
            let has_stress = |name: &str| {
                history
                    .observables_of(STRAINS, name)
                    .is_some_and(|obs| obs.stress.is_some())
            };
            if !(has_stress("plus") && has_stress("minus")) {
                return Decision::Terminate {
                    reason: "stress tensor missing for a strained cell".to_string(),
                };
            }
        }
        Decision::Complete
    }

    fn finish(&mut self, history: &History) -> Result<Observables> {
        let volume = self.reference_volume(history);
        let mut result = Observables {
            volume,
            energy: history
                .observables(EQUILIBRIUM, 0)
                .and_then(|obs| obs.energy),
            ..Observables::default()
        };
        if self.strains.is_some() {
            return Ok(result);
        }

        let fail = |message: &str| BatchflowError::derivation("bulk_modulus", message);
        let volume = volume.ok_or_else(|| fail("reference volume unknown"))?;
        let plus = history
            .observables_of(STRAINS, "plus")
            .ok_or_else(|| fail("plus strain has no results"))?;
        let minus = history
            .observables_of(STRAINS, "minus")
            .ok_or_else(|| fail("minus strain has no results"))?;
        let (Some(s_plus), Some(s_minus)) = (plus.stress, minus.stress) else {
            return Err(fail("stress tensor missing"));
        };
        let (Some(v_plus), Some(v_minus)) = (plus.volume, minus.volume) else {
            return Err(fail("strained volume missing"));
        };
        if v_plus == v_minus {
            return Err(fail("strained volumes are identical"));
        }

        let modulus = -(trace(&s_plus) - trace(&s_minus)) / 3.0 * volume / (v_plus - v_minus);
        self.bulk_modulus = Some(modulus);
        result
            .derived
            .insert("bulk_modulus".to_string(), json!(modulus));
        Ok(result)
    }

    fn settings(&self) -> Option<&RelaxationSettings> {
        Some(&self.settings)
    }

    fn report_fields(&self, _history: &History) -> BTreeMap<String, Value> {
        let mut fields = BTreeMap::new();
        if let Some(modulus) = self.bulk_modulus {
            fields.insert("bulk_modulus".to_string(), json!(modulus));
        }
        if let Some(strains) = &self.strains {
            fields.insert("strains".to_string(), json!(strains));
        }
        fields
    }
}
