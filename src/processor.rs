//! Batch processing engine.
//!
//! Converts many DASware exports concurrently: each file is parsed and
//! written on a blocking worker, bounded by `max_concurrent_files`. A
//! failing file is reported and counted, never fatal for the batch.

use crate::config::ProcessorConfig;
use crate::error::{DaswareError, Result};
use crate::models::ProcessingStats;
use crate::pipeline::{DaswareParser, InoculationOverrides};
use crate::writer::{ParquetWriter, WriteSummary};

use colored::*;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tracing::{debug, error, info};

/// Main processor for DASware export conversion
pub struct BatchProcessor {
    files: Vec<PathBuf>,
    output_path: PathBuf,
    config: ProcessorConfig,
    overrides: InoculationOverrides,
    show_progress: bool,
}

impl BatchProcessor {
    pub fn new(files: Vec<PathBuf>, output_path: PathBuf) -> Self {
        Self {
            files,
            output_path,
            config: ProcessorConfig::default(),
            overrides: InoculationOverrides::new(),
            show_progress: true,
        }
    }

    /// Configure the processor
    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Inoculation instants applied to every processed export
    pub fn with_overrides(mut self, overrides: InoculationOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Main processing entry point
    pub async fn process(&self) -> Result<ProcessingStats> {
        let start_time = Instant::now();
        let parser = Arc::new(DaswareParser::new(self.config.clone())?);
        let writer = Arc::new(ParquetWriter::new(&self.output_path, &self.config));

        if self.show_progress {
            println!("{}", "Starting DASware export conversion".bright_green().bold());
            println!("  {} {}", "Exports:".bright_cyan(), self.files.len());
            println!("  {} {}", "Output:".bright_cyan(), self.output_path.display());
        }

        let mut stats = ProcessingStats {
            output_path: self.output_path.clone(),
            ..Default::default()
        };
        if self.files.is_empty() {
            info!("No DASware exports to process");
            return Ok(stats);
        }

        tokio::fs::create_dir_all(&self.output_path).await?;

        let pb = self.progress_bar();
        let concurrent_limit = self.config.max_concurrent_files.clamp(1, self.files.len());
        debug!(
            "Processing {} files with concurrency {}",
            self.files.len(),
            concurrent_limit
        );

        let results: Vec<Result<WriteSummary>> = stream::iter(self.files.iter().cloned())
            .map(|file_path| {
                let parser = Arc::clone(&parser);
                let writer = Arc::clone(&writer);
                let overrides = self.overrides.clone();
                let pb = pb.clone();
                async move {
                    if let Some(file_name) = file_path.file_name() {
                        pb.set_message(format!("Processing: {}", file_name.to_string_lossy()));
                    }

                    let path = file_path.clone();
                    let result = task::spawn_blocking(move || {
                        convert_file(&path, &parser, &writer, &overrides)
                    })
                    .await
                    .map_err(|e| DaswareError::Io(std::io::Error::other(e)))
                    .and_then(|result| result);
                    pb.inc(1);

                    match &result {
                        Ok(summary) => debug!(
                            "Converted {}: {} units",
                            file_path.display(),
                            summary.units_written
                        ),
                        Err(e) => error!("Failed to process {}: {}", file_path.display(), e),
                    }
                    result
                }
            })
            .buffer_unordered(concurrent_limit)
            .collect()
            .await;

        pb.finish_with_message("All exports processed");

        for result in results {
            match result {
                Ok(summary) => {
                    stats.files_processed += 1;
                    stats.units_written += summary.units_written;
                    stats.total_rows += summary.rows_written;
                }
                Err(_) => stats.files_failed += 1,
            }
        }
        stats.processing_time_ms = start_time.elapsed().as_millis();

        if self.show_progress {
            print_summary(&stats);
        }
        Ok(stats)
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(self.files.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb.set_message("Processing exports");
        pb
    }
}

/// Parse one export and write its outputs
pub fn convert_file(
    path: &Path,
    parser: &DaswareParser,
    writer: &ParquetWriter,
    overrides: &InoculationOverrides,
) -> Result<WriteSummary> {
    let parsed = parser.parse_file(path, overrides)?;
    writer.write_export(path, &parsed.model)
}

fn print_summary(stats: &ProcessingStats) {
    println!("\n{}", "Processing Summary".bright_green().bold());
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        stats.processing_time_ms.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Files processed:".bright_cyan(),
        stats.files_processed.to_string().bright_white()
    );
    if stats.files_failed > 0 {
        println!(
            "  {} {}",
            "Files failed:".bright_red(),
            stats.files_failed.to_string().bright_red().bold()
        );
    }
    println!(
        "  {} {}",
        "Units written:".bright_cyan(),
        stats.units_written.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Total rows:".bright_cyan(),
        stats.total_rows.to_string().bright_white().bold()
    );
}
