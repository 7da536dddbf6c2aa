mod cli;
mod config;
mod logging;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use batchflow_core::{DispatcherBuilder, LocalQueue, RunReport};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::cli::{Cli, Command, RunArgs, ScriptArgs};
use crate::config::Run;

const DEFAULT_POLL_SECS: u64 = 30;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::setup_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Script(args) => script(args).map(|()| true),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn script(args: ScriptArgs) -> Result<()> {
    let run = Run::load(&args.run_file)?;
    let job = run.job()?;
    let text = job
        .render_script(&run.file.queue.scheduler)
        .context("failed to render job script")?;
    print!("{text}");
    Ok(())
}

/// Ok(false) when some root did not finish `done`.
async fn run(args: RunArgs) -> Result<bool> {
    let run = Run::load(&args.run_file)?;
    if run.file.queue.remote.is_some() {
        bail!("[queue.remote] needs a remote transport; the batchflow binary only drives local queues");
    }
    let tasks = run.tasks(args.dry_run)?;
    let queue = LocalQueue::new(run.file.queue.clone()).context("invalid [queue] table")?;
    let interval = args
        .interval
        .or(run.file.poll_interval)
        .unwrap_or(DEFAULT_POLL_SECS);

    let mut builder = DispatcherBuilder::new()
        .queue(queue)
        .poll_interval(Duration::from_secs(interval));
    for task in tasks {
        builder = builder.boxed_task(task);
    }
    let dispatcher = builder.build().context("failed to start dispatcher")?;
    info!(
        run_file = %args.run_file.display(),
        roots = dispatcher.roots().len(),
        dry_run = args.dry_run,
        interval,
        "run loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping after the current poll");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        }
    });

    let report = dispatcher.run_until(shutdown_rx).await?;
    print_report(&report);
    Ok(report.all_done())
}

fn print_report(report: &RunReport) {
    for root in &report.roots {
        println!(
            "{:<24} {:<24} stage {:<3} {}",
            root.name, root.kind, root.stage, root.status
        );
    }
    if report.interrupted {
        println!("interrupted after {} polls", report.iterations);
    } else {
        println!("finished after {} polls", report.iterations);
    }
}
