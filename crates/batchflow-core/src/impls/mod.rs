//! Impls - ports の実装
//!
//! - **LocalShell**: このホスト上でコマンドを実行
//! - **JsonResultReader**: ジョブが書いた `result.json` を読む

pub mod json_result;
pub mod local_shell;

pub use self::json_result::{JsonResultReader, RESULT_FILE};
pub use self::local_shell::LocalShell;
