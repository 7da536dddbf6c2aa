use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "batchflow", version, about = "Drive staged calculations through a batch scheduler")]
pub struct Cli {
    /// -v for debug, -vv for trace. RUST_LOG overrides both.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also write plain-text logs to this file.
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every task in the run file until all of them retire.
    Run(RunArgs),
    /// Print the job script the run file would submit.
    Script(ScriptArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    pub run_file: PathBuf,

    /// Walk the tasks without submitting, reusing results already on disk.
    #[arg(long)]
    pub dry_run: bool,

    /// Seconds between scheduler polls.
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ScriptArgs {
    pub run_file: PathBuf,
}
