//! Parquet writing of parsed exports.
//!
//! Each export gets its own directory under the output root, holding one
//! `unit_<N>.parquet` per derived unit series and optionally `narrow.parquet`.

use crate::config::{CompressionAlgorithm, ProcessorConfig};
use crate::error::{DaswareError, Result};
use crate::result_model::ResultModel;
use polars::prelude::{DataFrame, ParquetWriter as PolarsParquetWriter, StatisticsOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What was written for one export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub units_written: usize,
    pub rows_written: usize,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ParquetWriter {
    output_root: PathBuf,
    compression: CompressionAlgorithm,
    enable_statistics: bool,
    narrow_time_axis: Option<String>,
}

impl ParquetWriter {
    pub fn new(output_root: impl Into<PathBuf>, config: &ProcessorConfig) -> Self {
        Self {
            output_root: output_root.into(),
            compression: config.compression,
            enable_statistics: config.enable_statistics,
            narrow_time_axis: config
                .export_narrow
                .then(|| config.narrow_time_axis.clone()),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Output directory of one source export, named after its file stem
    pub fn export_dir(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export".to_string());
        self.output_root.join(stem)
    }

    /// Write every derived unit series (and the narrow table when enabled)
    pub fn write_export(&self, source: &Path, model: &ResultModel) -> Result<WriteSummary> {
        let dir = self.export_dir(source);
        std::fs::create_dir_all(&dir)?;

        let mut summary = WriteSummary::default();
        for record in model.units() {
            let Some(series) = record.time_series() else {
                continue;
            };

            let path = dir.join(format!("unit_{}.parquet", record.id()));
            let mut series = series.clone();
            self.write_frame(&mut series, &path)?;

            summary.units_written += 1;
            summary.rows_written += series.height();
            summary.files.push(path);
        }

        if let Some(axis) = &self.narrow_time_axis {
            let path = dir.join("narrow.parquet");
            let mut narrow = model.narrow_data(axis)?;
            self.write_frame(&mut narrow, &path)?;
            summary.files.push(path);
        }

        debug!(
            "Wrote {} unit series ({} rows) to {}",
            summary.units_written,
            summary.rows_written,
            dir.display()
        );
        Ok(summary)
    }

    /// Write one frame with the configured compression
    pub fn write_frame(&self, df: &mut DataFrame, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let statistics = if self.enable_statistics {
            StatisticsOptions::full()
        } else {
            StatisticsOptions::empty()
        };

        PolarsParquetWriter::new(file)
            .with_compression(self.compression.to_polars_compression())
            .with_statistics(statistics)
            .finish(df)
            .map_err(|e| DaswareError::WriteFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}
