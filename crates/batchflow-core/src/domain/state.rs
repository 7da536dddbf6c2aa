//! State - タスクの状態と traverse モード

use std::fmt;

use serde::{Deserialize, Serialize};

/// TaskStatus はタスクの状態を表現
///
/// # 状態遷移
/// - preparing: サブタスクがまだ存在しない
/// - stage: ステージ名（"equilibrium", "strains" など）で実行中
/// - next: 現ステージのサブタスクが全て成功
/// - terminate / done / max_iteration: 終端
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Preparing,
    Stage(String),
    Next,
    Terminate,
    Done,
    MaxIteration,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Terminate | TaskStatus::Done | TaskStatus::MaxIteration
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Preparing => f.write_str("preparing"),
            TaskStatus::Stage(label) => f.write_str(label),
            TaskStatus::Next => f.write_str("next"),
            TaskStatus::Terminate => f.write_str("terminate"),
            TaskStatus::Done => f.write_str("done"),
            TaskStatus::MaxIteration => f.write_str("max_iteration"),
        }
    }
}

/// Traverse はサブミットを省略するか、失敗ステージを作り直すかを制御
///
/// Run files accept `traverse = false`, `traverse = true` or
/// `traverse = "restart"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "TraverseRepr", into = "TraverseRepr")]
pub enum Traverse {
    #[default]
    Off,
    /// Bookkeeping and scripts only; the submit command is never run.
    On,
    /// Like `On`, and a terminated stage is rebuilt once with the flag cleared.
    Restart,
}

impl Traverse {
    pub fn skips_submission(&self) -> bool {
        matches!(self, Traverse::On | Traverse::Restart)
    }
}

impl fmt::Display for Traverse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Traverse::Off => f.write_str("false"),
            Traverse::On => f.write_str("true"),
            Traverse::Restart => f.write_str("restart"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TraverseRepr {
    Flag(bool),
    Mode(String),
}

impl TryFrom<TraverseRepr> for Traverse {
    type Error = String;

    fn try_from(repr: TraverseRepr) -> Result<Self, Self::Error> {
        match repr {
            TraverseRepr::Flag(false) => Ok(Traverse::Off),
            TraverseRepr::Flag(true) => Ok(Traverse::On),
            TraverseRepr::Mode(mode) if mode == "restart" => Ok(Traverse::Restart),
            TraverseRepr::Mode(other) => Err(format!(
                "traverse must be true, false or \"restart\", got {other:?}"
            )),
        }
    }
}

impl From<Traverse> for TraverseRepr {
    fn from(traverse: Traverse) -> Self {
        match traverse {
            Traverse::Off => TraverseRepr::Flag(false),
            Traverse::On => TraverseRepr::Flag(true),
            Traverse::Restart => TraverseRepr::Mode("restart".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::off("false", Traverse::Off)]
    #[case::on("true", Traverse::On)]
    #[case::restart("\"restart\"", Traverse::Restart)]
    fn traverse_accepts_flag_or_restart(#[case] raw: &str, #[case] expected: Traverse) {
        let parsed: Traverse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn traverse_rejects_other_strings() {
        assert!(serde_json::from_str::<Traverse>("\"sometimes\"").is_err());
    }

    #[rstest]
    #[case::done(TaskStatus::Done, true)]
    #[case::terminate(TaskStatus::Terminate, true)]
    #[case::max_iteration(TaskStatus::MaxIteration, true)]
    #[case::next(TaskStatus::Next, false)]
    #[case::stage(TaskStatus::Stage("strains".to_string()), false)]
    fn terminal_statuses(#[case] status: TaskStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }
}
