//! Shell port - run scheduler commands, locally or on a remote host.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{BatchflowError, Result};

/// Exit status and combined stdout/stderr of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    /// Turn a failed exit into a transport error mentioning `argv`.
    pub fn ensure_success(self, argv: &[String]) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(BatchflowError::transport(format!(
                "`{}` exited with {:?}: {}",
                argv.join(" "),
                self.code,
                self.output.trim()
            )))
        }
    }
}

/// Runs one command and waits for it.
///
/// `Err` means the command could not be run at all; a command that ran and
/// failed is `Ok` with `success == false`.
#[async_trait]
pub trait Shell: Send + Sync {
    async fn run(&self, argv: &[String], cwd: Option<&Path>) -> Result<CommandOutput>;
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A shell on another host that can also stream files to and from it.
#[async_trait]
pub trait RemoteShell: Shell {
    async fn open_read(&self, path: &Path) -> Result<BoxedReader>;
    async fn open_write(&self, path: &Path) -> Result<BoxedWriter>;
}
