//! Configuration management and validation.
//!
//! Processing parameters for single-file parsing and batch conversion,
//! loadable from a JSON file and adjustable through builder methods.

use crate::column_mapping::ColumnMapping;
use crate::constants::{DEFAULT_DELIMITER, PROCESS_TIME_COLUMN, TIME_AXES};
use crate::error::{DaswareError, Result};
use crate::models::FormatVersion;
use chrono::FixedOffset;
use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Supported compression algorithms for parquet files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    #[serde(rename = "none")]
    Uncompressed,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(&self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = DaswareError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "snappy" => Ok(CompressionAlgorithm::Snappy),
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            "lz4" => Ok(CompressionAlgorithm::Lz4),
            "none" | "uncompressed" => Ok(CompressionAlgorithm::Uncompressed),
            other => Err(DaswareError::configuration(format!(
                "invalid compression algorithm '{}' (expected snappy, zstd, lz4 or none)",
                other
            ))),
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionAlgorithm::Snappy => "snappy",
            CompressionAlgorithm::Zstd => "zstd",
            CompressionAlgorithm::Lz4 => "lz4",
            CompressionAlgorithm::Uncompressed => "none",
        };
        f.write_str(name)
    }
}

/// Global configuration for DASware processing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Field delimiter of the export blocks
    pub delimiter: char,

    /// Fixed offset of raw timestamps from UTC, in minutes
    pub timestamp_utc_offset_minutes: i32,

    /// Force an export version instead of detecting it from the signature line
    pub format: Option<FormatVersion>,

    /// Column mapping document replacing the built-in one
    pub column_mapping_path: Option<PathBuf>,

    /// Maximum concurrent file processing
    pub max_concurrent_files: usize,

    /// Compression of written parquet files
    pub compression: CompressionAlgorithm,

    /// Enable column statistics in written parquet files
    pub enable_statistics: bool,

    /// Also write the stacked long-format table per file
    pub export_narrow: bool,

    /// Time axis of the long-format table
    pub narrow_time_axis: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            timestamp_utc_offset_minutes: 0,
            format: None,
            column_mapping_path: None,
            max_concurrent_files: num_cpus::get(),
            compression: CompressionAlgorithm::Snappy,
            enable_statistics: true,
            export_narrow: false,
            narrow_time_axis: PROCESS_TIME_COLUMN.to_string(),
        }
    }
}

impl ProcessorConfig {
    /// Load configuration from a JSON file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            DaswareError::configuration(format!("invalid config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check values that serde alone cannot reject
    pub fn validate(&self) -> Result<()> {
        if !self.delimiter.is_ascii() {
            return Err(DaswareError::configuration(format!(
                "delimiter {:?} must be a single ASCII character",
                self.delimiter
            )));
        }
        if self.max_concurrent_files == 0 {
            return Err(DaswareError::configuration(
                "max_concurrent_files must be at least 1",
            ));
        }
        if !TIME_AXES.contains(&self.narrow_time_axis.as_str()) {
            return Err(DaswareError::configuration(format!(
                "narrow_time_axis must be one of {:?}, got '{}'",
                TIME_AXES, self.narrow_time_axis
            )));
        }
        self.utc_offset()?;
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.timestamp_utc_offset_minutes * 60).ok_or_else(|| {
            DaswareError::configuration(format!(
                "timestamp offset of {} minutes is out of range",
                self.timestamp_utc_offset_minutes
            ))
        })
    }

    /// The configured mapping document, or the built-in mapping of `version`
    pub fn column_mapping(&self, version: FormatVersion) -> Result<ColumnMapping> {
        match &self.column_mapping_path {
            Some(path) => ColumnMapping::from_path(path),
            None => ColumnMapping::builtin(version),
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.timestamp_utc_offset_minutes = minutes;
        self
    }

    pub fn with_format(mut self, format: FormatVersion) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_column_mapping(mut self, path: impl Into<PathBuf>) -> Self {
        self.column_mapping_path = Some(path.into());
        self
    }

    /// Set maximum concurrent files
    pub fn with_max_concurrent_files(mut self, max_files: usize) -> Self {
        self.max_concurrent_files = max_files;
        self
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    /// Write the long-format table along the given time axis
    pub fn with_narrow_export(mut self, time_axis: impl Into<String>) -> Self {
        self.export_narrow = true;
        self.narrow_time_axis = time_axis.into();
        self
    }
}
