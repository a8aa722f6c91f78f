//! Command-line interface components.

use crate::config::{CompressionAlgorithm, ProcessorConfig};
use crate::error::{DaswareError, Result};
use crate::models::FormatVersion;
use crate::pipeline::InoculationOverrides;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(name = "dasware")]
#[command(about = "Convert DASware bioreactor exports to per-unit Parquet time series")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Export files, directories (searched for *.csv) or glob patterns
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<String>,

    /// Output directory for Parquet files
    #[arg(short, long, default_value = "parquet")]
    pub output: PathBuf,

    /// Force the export version instead of detecting it (v4, v5)
    #[arg(long)]
    pub format: Option<FormatVersion>,

    /// Inoculation instant of a unit, e.g. 3=2019-02-06T10:00:00Z (repeatable)
    #[arg(long = "inoculation", value_name = "UNIT=TIME", value_parser = parse_inoculation)]
    pub inoculations: Vec<(u32, DateTime<Utc>)>,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON column mapping replacing the built-in one
    #[arg(long)]
    pub mapping: Option<PathBuf>,

    /// Parquet compression algorithm (snappy, zstd, lz4, none)
    #[arg(long)]
    pub compression: Option<CompressionAlgorithm>,

    /// Also write a long-format table along AXIS (timestamp, duration, process_time)
    #[arg(
        long,
        value_name = "AXIS",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "process_time"
    )]
    pub narrow: Option<String>,

    /// Number of exports converted concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Inoculation overrides keyed by unit; a repeated unit keeps its last value
    pub fn overrides(&self) -> InoculationOverrides {
        self.inoculations.iter().copied().collect()
    }

    /// Merge the configuration file (if any) with command-line options
    pub fn build_config(&self) -> Result<ProcessorConfig> {
        let mut config = match &self.config {
            Some(path) => ProcessorConfig::from_file(path)?,
            None => ProcessorConfig::default(),
        };

        if let Some(format) = self.format {
            config = config.with_format(format);
        }
        if let Some(mapping) = &self.mapping {
            config = config.with_column_mapping(mapping);
        }
        if let Some(compression) = self.compression {
            config = config.with_compression(compression);
        }
        if let Some(axis) = &self.narrow {
            config = config.with_narrow_export(axis.clone());
        }
        if let Some(jobs) = self.jobs {
            config = config.with_max_concurrent_files(jobs);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse `UNIT=RFC3339` into a unit number and UTC instant
pub fn parse_inoculation(value: &str) -> std::result::Result<(u32, DateTime<Utc>), String> {
    let (unit, instant) = value
        .split_once('=')
        .ok_or_else(|| format!("expected UNIT=TIME, got '{}'", value))?;

    let unit: u32 = unit
        .trim()
        .parse()
        .map_err(|_| format!("invalid unit number '{}'", unit))?;
    if unit == 0 {
        return Err("unit numbers start at 1".to_string());
    }

    let instant = DateTime::parse_from_rfc3339(instant.trim())
        .map_err(|e| format!("invalid RFC 3339 time '{}': {}", instant, e))?;
    Ok((unit, instant.with_timezone(&Utc)))
}

/// Resolve files, directories and glob patterns into a sorted list of exports
pub fn discover_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();

    for input in inputs {
        let path = Path::new(input);
        if path.is_file() {
            files.insert(path.to_path_buf());
        } else if path.is_dir() {
            files.extend(csv_files_in(path));
        } else {
            let matches = glob::glob(input).map_err(|e| {
                DaswareError::usage(format!("invalid input pattern '{}': {}", input, e))
            })?;
            let before = files.len();
            for entry in matches {
                match entry {
                    Ok(found) if found.is_file() => {
                        files.insert(found);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable path: {}", e),
                }
            }
            if files.len() == before {
                warn!("No exports match '{}'", input);
            }
        }
    }

    if files.is_empty() {
        return Err(DaswareError::usage(format!(
            "no DASware exports found in {}",
            inputs.join(", ")
        )));
    }

    debug!("Discovered {} export files", files.len());
    Ok(files.into_iter().collect())
}

fn csv_files_in(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect()
}

/// Set up structured logging on stderr
pub fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dasware_processor={}", log_level)));

    if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
