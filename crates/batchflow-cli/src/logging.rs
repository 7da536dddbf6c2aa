use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "batchflow=info,batchflow_core=info";

fn default_filter(verbosity: u8) -> String {
    match verbosity {
        0 => DEFAULT_FILTER.to_string(),
        1 => "batchflow=debug,batchflow_core=debug".to_string(),
        _ => "batchflow=trace,batchflow_core=trace".to_string(),
    }
}

/// stderr は常に、`log_file` があればファイルにも出力する。
pub fn setup_logging(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry().with(filter).with(stderr_layer);

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true);
            subscriber.with(file_layer).init();
        }
        None => subscriber.init(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(default_filter(0), DEFAULT_FILTER);
        assert!(default_filter(1).contains("debug"));
        assert!(default_filter(5).contains("trace"));
    }

    #[test]
    fn unwritable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = setup_logging(0, Some(dir.path()));
        assert!(result.is_err());
    }
}
