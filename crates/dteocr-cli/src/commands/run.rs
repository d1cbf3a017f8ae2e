//! Run command - process pending documents from directory stores.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use console::style;
use tokio::sync::watch;
use tracing::{info, warn};

use dteocr_core::models::config::DteConfig;
use dteocr_core::ocr::HttpOcrBackend;
use dteocr_core::pipeline::{BatchReport, Orchestrator, Worker};
use dteocr_core::store::{FsBlobStore, FsDocumentStore};

use super::build_registry;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Directory of document JSON files (<account>/<document>.json)
    #[arg(long)]
    documents: PathBuf,

    /// Directory image references are resolved against
    #[arg(long)]
    blobs: PathBuf,

    /// Process a single batch and exit
    #[arg(long)]
    once: bool,
}

pub async fn run(args: RunArgs, config: &DteConfig) -> anyhow::Result<()> {
    config.validate()?;

    let ocr = HttpOcrBackend::from_config(&config.ocr)
        .context("Set ocr.endpoint in the config file or OCR_ENDPOINT in the environment")?;
    if !args.documents.is_dir() {
        anyhow::bail!("Documents directory not found: {}", args.documents.display());
    }

    let registry = build_registry(config).await?;
    let orchestrator = Orchestrator::new(
        Arc::new(FsDocumentStore::new(&args.documents)),
        Arc::new(FsBlobStore::new(&args.blobs)),
        Arc::new(ocr),
        Arc::new(registry),
    );
    let worker = Worker::new(Arc::new(orchestrator), config.processor.clone());

    let report = if args.once {
        worker.run_once().await?
    } else {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, stopping after the current document");
                    let _ = tx.send(true);
                }
                Err(e) => warn!("Could not listen for Ctrl-C: {}", e),
            }
        });

        println!(
            "{} Watching {} for pending documents (Ctrl-C to stop)",
            style("ℹ").blue(),
            args.documents.display()
        );
        worker.run(rx).await
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &BatchReport) {
    println!(
        "{} Processed {} documents: {} done, {} failed",
        style("✓").green(),
        report.fetched,
        style(report.done).green(),
        style(report.failed).red()
    );
}
