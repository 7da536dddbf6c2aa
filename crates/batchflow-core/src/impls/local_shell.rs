use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{BatchflowError, Result};
use crate::ports::{CommandOutput, Shell};

/// Runs commands on this host with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalShell;

#[async_trait]
impl Shell for LocalShell {
    async fn run(&self, argv: &[String], cwd: Option<&Path>) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| BatchflowError::Configuration("empty command line".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        debug!(command = %argv.join(" "), cwd = ?cwd, "running command");
        let output = cmd
            .output()
            .await
            .map_err(|e| BatchflowError::transport_io(format!("failed to run `{program}`"), e))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            output: text,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn captures_output_and_status() {
        let out = LocalShell
            .run(&argv(&["sh", "-c", "echo hello; echo oops >&2; exit 3"]), None)
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert!(out.output.contains("hello"));
        assert!(out.output.contains("oops"));
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "x").unwrap();
        let out = LocalShell
            .run(&argv(&["ls"]), Some(dir.path()))
            .await
            .unwrap();
        assert!(out.success);
        assert!(out.output.contains("marker"));
    }

    #[tokio::test]
    async fn missing_program_is_transport_error() {
        let err = LocalShell
            .run(&argv(&["batchflow-no-such-program"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchflowError::Transport { .. }));
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        let err = LocalShell.run(&[], None).await.unwrap_err();
        assert!(matches!(err, BatchflowError::Configuration(_)));
    }
}
