//! Mode Grüneisen parameters from phonons at three nearby volumes.
//!
//! Stage 0 relaxes the cell, stage 1 runs phonon jobs in `minus`, `orig`
//! and `plus`. The parameters themselves are derived outside batchflow, so
//! the task completes with empty observables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::Relaxation;
use crate::domain::{Decision, Observables, RelaxationSettings, Tensor3};
use crate::error::Result;
use crate::task::{History, StageContext, Task, Workflow};

const EQUILIBRIUM: usize = 0;
const PHONONS: usize = 1;
const POINTS: [&str; 3] = ["minus", "orig", "plus"];
const IDENTITY: Tensor3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Shifts the strain triple to one side of the reference cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Plus,
    Minus,
}

impl Bias {
    fn factors(bias: Option<Bias>) -> [f64; 3] {
        match bias {
            None => [-1.0, 0.0, 1.0],
            Some(Bias::Plus) => [0.0, 1.0, 2.0],
            Some(Bias::Minus) => [-2.0, -1.0, 0.0],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModeGruneisen {
    settings: RelaxationSettings,
    relaxed: bool,
    delta_strain: f64,
    strain: Option<Tensor3>,
    bias: Option<Bias>,
    supercell_matrix: [[i64; 3]; 3],
    primitive_matrix: Option<Tensor3>,
    distance: f64,
}

impl ModeGruneisen {
    pub const DEFAULT_DELTA_STRAIN: f64 = 0.001;
    pub const DEFAULT_DISTANCE: f64 = 0.01;

    pub fn new(settings: RelaxationSettings, supercell_matrix: [[i64; 3]; 3]) -> Self {
        Self {
            settings,
            relaxed: false,
            delta_strain: Self::DEFAULT_DELTA_STRAIN,
            strain: None,
            bias: None,
            supercell_matrix,
            primitive_matrix: None,
            distance: Self::DEFAULT_DISTANCE,
        }
    }

    pub fn relaxed(mut self) -> Self {
        self.relaxed = true;
        self
    }

    /// Isotropic volume step between neighbouring points.
    pub fn with_delta_strain(mut self, delta: f64) -> Self {
        self.delta_strain = delta;
        self
    }

    /// Anisotropic step: the points use `I + f * strain` instead of a
    /// volume scaling.
    pub fn with_strain(mut self, strain: Tensor3) -> Self {
        self.strain = Some(strain);
        self
    }

    pub fn with_bias(mut self, bias: Bias) -> Self {
        self.bias = Some(bias);
        self
    }

    pub fn with_primitive_matrix(mut self, matrix: Tensor3) -> Self {
        self.primitive_matrix = Some(matrix);
        self
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = distance;
        self
    }

    /// Lattice deformation applied at each of `minus`, `orig`, `plus`.
    pub fn deformations(&self) -> [Tensor3; 3] {
        Bias::factors(self.bias).map(|factor| match &self.strain {
            None => {
                let scale = (1.0 + factor * self.delta_strain).cbrt();
                IDENTITY.map(|row| row.map(|v| v * scale))
            }
            Some(strain) => {
                let mut out = IDENTITY;
                for (i, row) in out.iter_mut().enumerate() {
                    for (j, value) in row.iter_mut().enumerate() {
                        *value += factor * strain[i][j];
                    }
                }
                out
            }
        })
    }
}

impl Workflow for ModeGruneisen {
    fn kind(&self) -> &'static str {
        "mode_gruneisen"
    }

    fn first_stage(&self) -> usize {
        if self.relaxed { PHONONS } else { EQUILIBRIUM }
    }

    fn stage_label(&self, stage: usize) -> String {
        match stage {
            EQUILIBRIUM => "equilibrium",
            _ => "phonons",
        }
        .to_string()
    }

    fn build_stage(&self, ctx: &StageContext<'_>, history: &History) -> Result<Vec<Box<dyn Task>>> {
        if ctx.stage == EQUILIBRIUM {
            return Ok(vec![
                ctx.staged("equilibrium", Relaxation::new(self.settings.clone())),
            ]);
        }
        let relaxed_in = history
            .observables(EQUILIBRIUM, 0)
            .map(|_| json!("../equilibrium"))
            .unwrap_or(Value::Null);
        Ok(POINTS
            .iter()
            .zip(self.deformations())
            .map(|(point, deformation)| {
                ctx.job_task(
                    point,
                    json!({
                        "deformation": deformation,
                        "supercell_matrix": self.supercell_matrix,
                        "primitive_matrix": self.primitive_matrix,
                        "distance": self.distance,
                        "relaxed_in": relaxed_in,
                    }),
                )
            })
            .collect())
    }

    fn decide(&self, stage: usize, _history: &History) -> Decision {
        match stage {
            EQUILIBRIUM => Decision::Advance,
            _ => Decision::Complete,
        }
    }

    fn finish(&mut self, _history: &History) -> Result<Observables> {
        Ok(Observables::default())
    }

    fn settings(&self) -> Option<&RelaxationSettings> {
        (!self.relaxed).then_some(&self.settings)
    }

    fn report_fields(&self, _history: &History) -> BTreeMap<String, Value> {
        let mut fields = BTreeMap::from([
            ("supercell_matrix".to_string(), json!(self.supercell_matrix)),
            ("distance".to_string(), json!(self.distance)),
            ("delta_strain".to_string(), json!(self.delta_strain)),
        ]);
        if let Some(matrix) = self.primitive_matrix {
            fields.insert("primitive_matrix".to_string(), json!(matrix));
        }
        if let Some(bias) = self.bias {
            fields.insert("bias".to_string(), json!(bias));
        }
        fields
    }
}
