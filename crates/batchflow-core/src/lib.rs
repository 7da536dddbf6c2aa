//! batchflow-core
//!
//! Drives multi-stage calculation workflows through a batch scheduler.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, job, scheduler profile, task status, observables, report）
//! - **ports**: 抽象化レイヤー（Shell, RemoteShell, OutputReader）
//! - **impls**: 実装（LocalShell, JsonResultReader）
//! - **queue**: LocalQueue / RemoteQueue（投入上限, qstat ポーリング, ステージング）
//! - **task**: Task trait, JobTask, StagedTask + Workflow
//! - **workflows**: Relaxation, BulkModulus, BornEffectiveCharge, ModeGruneisen
//! - **app**: DispatcherBuilder と Dispatcher のポーリングループ

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod task;
pub mod workflows;

#[cfg(test)]
mod testing;

pub use app::{Dispatcher, DispatcherBuilder, RunReport};
pub use domain::{Job, JobStatus, SchedulerProfile, TaskStatus, Traverse};
pub use error::{BatchflowError, Result};
pub use queue::{JobQueue, LocalQueue, QueueConfig, RemoteQueue};
pub use task::{JobTask, StagedTask, Task, Workflow};
