use anyhow::Result;
use clap::Parser;
use ems_core::{PrewarmConfiguration, PrewarmRunner, PrewarmScheduler, ScanService};
use ems_store::PrewarmStore;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{event, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli_args::{Cli, Commands, ScanArgs};
use crate::configuration::{scan_request, scanner_configuration};

mod cli_args;
mod configuration;
mod report;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Cli { esi, command } = Cli::parse();
    let cfg = scanner_configuration(&esi);

    match command {
        Commands::Scan(args) => {
            let service = ScanService::from_configuration(&cfg).await?;
            run_scan(&service, &args).await
        }
        Commands::Prewarm => {
            let service = ScanService::from_configuration(&cfg).await?;
            let runner = PrewarmRunner::new(PrewarmConfiguration::from_env()?, service.orchestrator());
            let summary = runner.run().await?;

            println!("{}", report::history_table(std::slice::from_ref(&summary)));
            if summary.failures > 0 {
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::PrewarmDaemon => {
            let service = ScanService::from_configuration(&cfg).await?;
            let runner = PrewarmRunner::new(PrewarmConfiguration::from_env()?, service.orchestrator());
            let scheduler = PrewarmScheduler::new(Arc::new(runner));
            let mut job_scheduler = scheduler.start().await?;

            tokio::signal::ctrl_c().await?;
            event!(Level::INFO, "Shutting down prewarm scheduler");
            job_scheduler.shutdown().await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::History { last } => {
            let prewarm_cfg = PrewarmConfiguration::from_env()?;
            let store = PrewarmStore::new(prewarm_cfg.output_dir.clone(), prewarm_cfg.status_file(), prewarm_cfg.history_file());
            let runs = store.read_history_tail(last).await?;

            if runs.is_empty() {
                println!("no prewarm runs recorded in {}", prewarm_cfg.history_file().display());
            } else {
                println!("{}", report::history_table(&runs));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_scan(service: &ScanService, args: &ScanArgs) -> Result<ExitCode> {
    let request = scan_request(args);

    let result = match service.scan(&request).await {
        Ok(result) => result,
        Err(e) if e.is_bad_input() => {
            event!(Level::ERROR, "Invalid scan request: {e}");
            return Ok(ExitCode::from(2));
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", report::scan_overview(&result));
    if request.mode.includes_instant() {
        println!("instant ({} opportunities)", result.results.instant.len());
        println!("{}", report::opportunities_table(&result.results.instant));
    }
    if request.mode.includes_list() {
        println!("list ({} opportunities)", result.results.list.len());
        println!("{}", report::opportunities_table(&result.results.list));
    }
    Ok(ExitCode::SUCCESS)
}
