//! Single-file parsing pipeline.
//!
//! read -> detect version -> split -> (V5 unit filter) -> dispatch ->
//! derive per unit -> apply inoculation overrides.

use crate::column_mapping::ColumnMapping;
use crate::config::ProcessorConfig;
use crate::constants::{SIGNATURE_LINE_INDEX, TRACK_DATA_HEADER};
use crate::dispatcher::BlockDispatcher;
use crate::error::{DaswareError, Result};
use crate::models::{DispatchStats, FormatVersion};
use crate::result_model::ResultModel;
use crate::schema::SchemaTable;
use crate::splitter::{ScopeSplitter, read_export_text};
use crate::timebase::{TimeBaseDeriver, apply_inoculation_override};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Externally known inoculation instants, by unit number
pub type InoculationOverrides = BTreeMap<u32, DateTime<Utc>>;

/// A parsed export together with how its blocks fared
#[derive(Debug, Clone)]
pub struct ParsedExport {
    pub model: ResultModel,
    pub dispatch: DispatchStats,
}

/// Parses DASware exports into result models
#[derive(Debug, Clone)]
pub struct DaswareParser {
    config: ProcessorConfig,
    splitter: ScopeSplitter,
}

impl DaswareParser {
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            splitter: ScopeSplitter::new()?,
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Parse an export file
    pub fn parse_file(&self, path: &Path, overrides: &InoculationOverrides) -> Result<ParsedExport> {
        debug!("Parsing {}", path.display());
        let content = read_export_text(path)?;
        self.parse_content(&content, Some(path), overrides)
    }

    /// Parse an export already held in memory
    pub fn parse_str(&self, content: &str, overrides: &InoculationOverrides) -> Result<ParsedExport> {
        self.parse_content(content, None, overrides)
    }

    fn parse_content(
        &self,
        content: &str,
        path: Option<&Path>,
        overrides: &InoculationOverrides,
    ) -> Result<ParsedExport> {
        let lines: Vec<&str> = content.lines().collect();
        let version = self.resolve_version(&lines, path)?;
        let mapping = self.config.column_mapping(version)?;
        if mapping.version() != version {
            warn!(
                "Column mapping is for {} but the export is {}",
                mapping.version(),
                version
            );
        }

        let mut blocks = self.splitter.split(&lines);
        if version.requires_track_data() {
            blocks.retain_units_with(TRACK_DATA_HEADER);
        }

        let schema = SchemaTable::for_version(version).with_delimiter(self.config.delimiter_byte());
        let (mut model, dispatch) = BlockDispatcher::new(&schema).dispatch(&blocks);

        self.derive_time_series(&mut model, &mapping)?;
        apply_overrides(&mut model, overrides)?;

        info!(
            "Parsed {} export: {} units, {} blocks ({} failed)",
            version,
            model.unit_count(),
            dispatch.total(),
            dispatch.failed
        );
        Ok(ParsedExport { model, dispatch })
    }

    fn resolve_version(&self, lines: &[&str], path: Option<&Path>) -> Result<FormatVersion> {
        if let Some(version) = self.config.format {
            return Ok(version);
        }

        FormatVersion::detect(lines).ok_or_else(|| DaswareError::UnsupportedFormat {
            path: path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("<memory>")),
            signature: lines
                .get(SIGNATURE_LINE_INDEX)
                .map(|line| line.to_string())
                .unwrap_or_default(),
        })
    }

    fn derive_time_series(&self, model: &mut ResultModel, mapping: &ColumnMapping) -> Result<()> {
        let deriver = TimeBaseDeriver::new(mapping).with_utc_offset(self.config.utc_offset()?);

        for record in model.units_mut() {
            let Some(raw) = record.track_data() else {
                warn!("Unit {} has no logged values, no time series derived", record.id());
                continue;
            };
            let series = deriver.derive(record.id(), raw)?;
            record.set_time_series(series);
        }
        Ok(())
    }
}

/// Recompute process time of every overridden unit from its inoculation instant
pub fn apply_overrides(model: &mut ResultModel, overrides: &InoculationOverrides) -> Result<()> {
    for (&unit, &instant) in overrides {
        let record = model
            .unit_mut(unit)
            .ok_or(DaswareError::UnitNotFound { unit })?;
        let series = record.time_series_mut().ok_or_else(|| {
            DaswareError::derivation(unit, "inoculation override for a unit without time series")
        })?;

        apply_inoculation_override(series, instant)?;
        debug!("Unit {}: process time rebased on {}", unit, instant);
    }
    Ok(())
}

/// Parse one export file with the given configuration
pub fn parse_file(
    path: &Path,
    config: &ProcessorConfig,
    overrides: &InoculationOverrides,
) -> Result<ResultModel> {
    let parser = DaswareParser::new(config.clone())?;
    Ok(parser.parse_file(path, overrides)?.model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PROCESS_TIME_COLUMN;

    fn export(signature: &str) -> String {
        format!(
            "\"[Info]\"\n\"Module\";\"Version\"\n{}\n\n\
             \"[TrackData1]\"\n\"Timestamp\";\"Duration\";\"Unit1.pH1.PV\"\n\
             \"2019-02-06 10:00:00\";0;7.0\n\"2019-02-06 10:01:00\";0.000694;7.1\n\n\
             \"[Setup2]\"\n\"Name\";\"Value\"\n\"Volume\";1\n",
            signature
        )
    }

    fn parser() -> DaswareParser {
        DaswareParser::new(ProcessorConfig::default()).unwrap()
    }

    #[test]
    fn test_v5_drops_units_without_track_data() {
        let parsed = parser()
            .parse_str(&export("\"FngArchiv\";\"5.0.0\""), &InoculationOverrides::new())
            .unwrap();

        assert_eq!(parsed.model.version(), FormatVersion::V5);
        assert_eq!(parsed.model.unit_ids(), vec![1]);
        assert!(parsed.model.unit(1).unwrap().time_series().is_some());
    }

    #[test]
    fn test_v4_keeps_setup_only_units() {
        let parsed = parser()
            .parse_str(&export("\"FngArchiv\";\"4.0.1\""), &InoculationOverrides::new())
            .unwrap();

        assert_eq!(parsed.model.version(), FormatVersion::V4);
        assert_eq!(parsed.model.unit_ids(), vec![1, 2]);
        assert!(parsed.model.unit(2).unwrap().time_series().is_none());
    }

    #[test]
    fn test_unknown_signature_is_usage_error() {
        let err = parser()
            .parse_str(&export("\"FngArchiv\";\"3.1.0\""), &InoculationOverrides::new())
            .unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn test_forced_version_skips_detection() {
        let parser = DaswareParser::new(ProcessorConfig::default().with_format(FormatVersion::V5)).unwrap();
        let parsed = parser
            .parse_str(&export("\"Archive\";\"unknown\""), &InoculationOverrides::new())
            .unwrap();
        assert_eq!(parsed.model.version(), FormatVersion::V5);
    }

    #[test]
    fn test_override_for_missing_unit() {
        let mut overrides = InoculationOverrides::new();
        overrides.insert(9, Utc::now());

        let err = parser()
            .parse_str(&export("\"FngArchiv\";\"5.0.0\""), &overrides)
            .unwrap_err();
        assert!(matches!(err, DaswareError::UnitNotFound { unit: 9 }));
    }

    #[test]
    fn test_override_rebases_process_time() {
        let mut overrides = InoculationOverrides::new();
        overrides.insert(1, "2019-02-06T10:00:00Z".parse().unwrap());

        let parsed = parser()
            .parse_str(&export("\"FngArchiv\";\"5.0.0\""), &overrides)
            .unwrap();
        let series = parsed.model.unit(1).unwrap().time_series().unwrap();
        let process_time: Vec<Option<f64>> = series
            .column(PROCESS_TIME_COLUMN)
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(process_time, vec![Some(0.0), Some(1.0 / 60.0)]);
    }
}
