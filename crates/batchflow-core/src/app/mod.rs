//! App - アプリケーション層
//!
//! - **DispatcherBuilder**: キューとルートタスクのワイヤリング（起動時検証）
//! - **Dispatcher**: qstat → タスク駆動 → 退役 を繰り返すポーリングループ

pub mod builder;
pub mod dispatcher;

pub use self::builder::DispatcherBuilder;
pub use self::dispatcher::{Dispatcher, PollSummary, RootOutcome, RunReport};
