use anyhow::{Context, Result};
use clap::Parser;
use dasware_processor::cli::{Args, discover_inputs, setup_logging};
use dasware_processor::{BatchProcessor, ProcessingStats};
use std::process;
use tracing::info;

fn main() {
    let args = Args::parse();
    setup_logging(&args);

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        tokio::select! {
            result = run(args) => result,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nReceived CTRL+C, shutting down gracefully...");
                Err(anyhow::anyhow!("Processing interrupted by user"))
            }
        }
    });

    if let Err(error) = result {
        eprintln!("Error: {:#}", error);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<ProcessingStats> {
    let config = args.build_config().context("Invalid configuration")?;
    let files = discover_inputs(&args.inputs).context("Failed to resolve inputs")?;
    info!("Converting {} exports into {}", files.len(), args.output.display());

    let stats = BatchProcessor::new(files, args.output.clone())
        .with_config(config)
        .with_overrides(args.overrides())
        .with_progress(!args.quiet)
        .process()
        .await
        .context("Batch conversion failed")?;

    if stats.files_processed == 0 && stats.files_failed > 0 {
        anyhow::bail!("all {} exports failed to convert", stats.files_failed);
    }
    Ok(stats)
}
