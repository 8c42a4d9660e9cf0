mod cli;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};
use common::storage::create_object_store;
use common::store::create_claim_store;
use dispatcher::JobDispatcher;
use eraser::ErasureOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::init_logging(&cli);

    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command.clone().unwrap_or_default() {
        Commands::Config { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("{config:#?}");
            }
            Ok(())
        }
        Commands::Validate => {
            create_claim_store(&config.store).context("store configuration invalid")?;
            create_object_store(&config.storage).context("storage configuration invalid")?;
            println!("configuration OK");
            Ok(())
        }
        Commands::Run => run(config).await,
    }
}

async fn run(config: common::config::Configuration) -> Result<()> {
    // Backend wiring fails here, at startup, never at first statement.
    let claim_store = create_claim_store(&config.store).context("store bootstrap failed")?;
    let object_store = create_object_store(&config.storage).context("storage bootstrap failed")?;

    let orchestrator = ErasureOrchestrator::from_config(claim_store, &config.erasure);
    let dispatcher = JobDispatcher::new(
        object_store,
        orchestrator,
        &config.dispatcher,
        config.erasure.worker_width,
    );

    let files = dispatcher.list_files().await.context("listing delete-request files")?;
    if files.is_empty() {
        log::info!(
            "no delete-request files under prefix '{}'",
            config.dispatcher.source_prefix
        );
        return Ok(());
    }

    log::info!("dispatching {} delete-request file(s)", files.len());
    let summary = dispatcher.process_files(files).await;

    let mut failed_members = 0;
    for report in &summary.reports {
        for failure in &report.failures {
            failed_members += 1;
            log::error!(
                "unerased member {} from {}: {}",
                failure.key,
                report.file,
                failure.reason
            );
        }
    }

    if !summary.is_clean() {
        anyhow::bail!(
            "{} file(s) failed, {} member(s) left unerased",
            summary.failed_files.len(),
            failed_members
        );
    }

    log::info!(
        "all {} file(s) processed, every member erased",
        summary.reports.len()
    );
    Ok(())
}
