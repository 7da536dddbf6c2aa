//! Ports - 抽象化レイヤー
//!
//! バッチスケジューラ、リモートホスト、ジョブの出力ファイルへの
//! インターフェースを定義します。SSH の実装は提供しません。

pub mod output_reader;
pub mod shell;

pub use self::output_reader::{OutputReader, Verdict};
pub use self::shell::{BoxedReader, BoxedWriter, CommandOutput, RemoteShell, Shell};
