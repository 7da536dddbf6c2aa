//! Concrete workflows.
//!
//! The physics is left to the job scripts. Each leaf gets an `input.json`
//! describing what to compute (iteration, strain, reference volume, ...) and
//! is expected to leave a `result.json` with the observables its parent reads.

mod born_charge;
mod bulk_modulus;
mod mode_gruneisen;
mod relaxation;

pub use born_charge::BornEffectiveCharge;
pub use bulk_modulus::BulkModulus;
pub use mode_gruneisen::{Bias, ModeGruneisen};
pub use relaxation::Relaxation;

use serde_json::{Map, Value};

/// Merge the keys of `extra` (if it is an object) into `base`.
pub(crate) fn merge_inputs(mut base: Map<String, Value>, extra: &Value) -> Value {
    if let Value::Object(extra) = extra {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    Value::Object(base)
}
