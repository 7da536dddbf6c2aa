use std::path::Path;

use serde::Deserialize;

use crate::domain::Observables;
use crate::error::{BatchflowError, Result};
use crate::ports::{OutputReader, Verdict};

pub const RESULT_FILE: &str = "result.json";

/// Reads the `result.json` a job script leaves in its directory.
///
/// A missing file, unparseable content or `"success": false` all mean the
/// step terminated.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResultReader;

#[derive(Deserialize)]
struct ResultFile {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(flatten)]
    observables: Observables,
}

fn default_success() -> bool {
    true
}

impl OutputReader for JsonResultReader {
    fn read(&self, work_dir: &Path) -> Result<Verdict> {
        let path = work_dir.join(RESULT_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Verdict::Failure(format!("{} not found", path.display())));
            }
            Err(e) => return Err(BatchflowError::io(&path, e)),
        };
        let parsed: ResultFile = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Ok(Verdict::Failure(format!(
                    "{} is malformed: {e}",
                    path.display()
                )));
            }
        };
        if parsed.success {
            Ok(Verdict::Success(parsed.observables))
        } else {
            Ok(Verdict::Failure(
                parsed
                    .reason
                    .unwrap_or_else(|| "job reported failure".to_string()),
            ))
        }
    }
}
