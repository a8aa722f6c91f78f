//! Versioned column mappings.
//!
//! A mapping names the raw timestamp and duration columns of a TrackData
//! table, the pattern of the inoculation-time column, and an ordered list of
//! canonical column names with the pattern identifying their raw column.
//! Mappings are plain JSON documents; the built-in ones live in `mappings/`.

use crate::constants::{DURATION_COLUMN, PROCESS_TIME_COLUMN, TIMESTAMP_COLUMN};
use crate::error::{DaswareError, Result};
use crate::models::FormatVersion;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

const DASWARE4_MAPPING: &str = include_str!("../mappings/dasware4.json");
const DASWARE5_MAPPING: &str = include_str!("../mappings/dasware5.json");

/// On-disk shape of a mapping document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDocument {
    pub version: FormatVersion,
    pub timestamp_column: String,
    pub duration_column: String,
    pub inoculation_pattern: String,
    pub columns: Vec<MappingEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone)]
pub struct CanonicalColumn {
    pub name: String,
    pub pattern: Regex,
}

impl CanonicalColumn {
    /// Raw column names matched by this entry, in table order
    pub fn matching<'a>(&self, raw_columns: &[&'a str]) -> Vec<&'a str> {
        raw_columns
            .iter()
            .copied()
            .filter(|name| self.pattern.is_match(name))
            .collect()
    }
}

/// Compiled column mapping for one export version
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    version: FormatVersion,
    timestamp_column: String,
    duration_column: String,
    inoculation: Regex,
    columns: Vec<CanonicalColumn>,
}

impl ColumnMapping {
    /// The mapping shipped with the crate
    pub fn builtin(version: FormatVersion) -> Result<Self> {
        let document = match version {
            FormatVersion::V4 => DASWARE4_MAPPING,
            FormatVersion::V5 => DASWARE5_MAPPING,
        };
        Self::from_json_str(document)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: MappingDocument = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mapping = Self::from_json_str(&content).map_err(|e| {
            DaswareError::configuration(format!(
                "invalid column mapping {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!(
            "Loaded {} column mapping with {} entries from {}",
            mapping.version,
            mapping.columns.len(),
            path.display()
        );
        Ok(mapping)
    }

    pub fn from_document(document: MappingDocument) -> Result<Self> {
        let reserved = [TIMESTAMP_COLUMN, DURATION_COLUMN, PROCESS_TIME_COLUMN];
        let mut seen = HashSet::new();

        let mut columns = Vec::with_capacity(document.columns.len());
        for entry in document.columns {
            if reserved.contains(&entry.name.as_str()) {
                return Err(DaswareError::configuration(format!(
                    "canonical column '{}' clashes with a time-base column",
                    entry.name
                )));
            }
            if !seen.insert(entry.name.clone()) {
                return Err(DaswareError::configuration(format!(
                    "canonical column '{}' is mapped twice",
                    entry.name
                )));
            }
            columns.push(CanonicalColumn {
                pattern: compile(&entry.pattern)?,
                name: entry.name,
            });
        }

        Ok(Self {
            version: document.version,
            timestamp_column: document.timestamp_column,
            duration_column: document.duration_column,
            inoculation: compile(&document.inoculation_pattern)?,
            columns,
        })
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// Raw column holding the wall-clock timestamp
    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    /// Raw column holding elapsed days since logging start
    pub fn duration_column(&self) -> &str {
        &self.duration_column
    }

    pub fn inoculation_pattern(&self) -> &Regex {
        &self.inoculation
    }

    pub fn columns(&self) -> &[CanonicalColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        DaswareError::configuration(format!("invalid column pattern '{}': {}", pattern, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_mappings_compile() {
        let v4 = ColumnMapping::builtin(FormatVersion::V4).unwrap();
        let v5 = ColumnMapping::builtin(FormatVersion::V5).unwrap();

        assert_eq!(v4.version(), FormatVersion::V4);
        assert_eq!(v5.version(), FormatVersion::V5);
        assert_eq!(v4.columns()[0].name, "volume_pv");
        assert_eq!(v5.timestamp_column(), "Timestamp");
        assert!(v4.inoculation_pattern().is_match("R1.Inoculation Time []"));
        assert!(v5.inoculation_pattern().is_match("Unit1.InoculationTime1.InoculationTime"));
        assert!(!v4.inoculation_pattern().is_match("Unit1.InoculationTime1.InoculationTime"));
    }

    #[test]
    fn test_patterns_search_anywhere_in_name() {
        let v5 = ColumnMapping::builtin(FormatVersion::V5).unwrap();
        let ph_pv = v5.columns().iter().find(|c| c.name == "ph_pv").unwrap();

        let raw = ["Timestamp", "Unit1.pH1.PV [pH]", "Unit1.pH1.SP [pH]"];
        assert_eq!(ph_pv.matching(&raw), vec!["Unit1.pH1.PV [pH]"]);
    }

    #[test]
    fn test_v5_temperature_pv_requires_double_dot() {
        let v5 = ColumnMapping::builtin(FormatVersion::V5).unwrap();
        let temperature = v5.columns().iter().find(|c| c.name == "temperature_pv").unwrap();

        let raw = ["Unit1.T1.PV [\u{b0}C]", "Unit1..T1.PV [\u{b0}C]"];
        assert_eq!(temperature.matching(&raw), vec!["Unit1..T1.PV [\u{b0}C]"]);
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let json = r#"{"version":"v5","timestamp_column":"Timestamp","duration_column":"Duration",
            "inoculation_pattern":"Inoc","columns":[{"name":"ph_pv","pattern":"pH(\\d"}]}"#;
        let err = ColumnMapping::from_json_str(json).unwrap_err();
        assert!(matches!(err, DaswareError::Configuration { .. }));
    }

    #[test]
    fn test_reserved_and_duplicate_names_rejected() {
        let reserved = r#"{"version":"v4","timestamp_column":"Timestamp","duration_column":"Duration",
            "inoculation_pattern":"Inoc","columns":[{"name":"duration","pattern":"D"}]}"#;
        let duplicate = r#"{"version":"v4","timestamp_column":"Timestamp","duration_column":"Duration",
            "inoculation_pattern":"Inoc","columns":[{"name":"ph","pattern":"a"},{"name":"ph","pattern":"b"}]}"#;

        assert!(ColumnMapping::from_json_str(reserved).is_err());
        assert!(ColumnMapping::from_json_str(duplicate).is_err());
    }

    #[test]
    fn test_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version":"v4","timestamp_column":"Time","duration_column":"Days",
                "inoculation_pattern":"Inoc","columns":[{{"name":"glucose","pattern":"Glc\\d"}}]}}"#
        )
        .unwrap();

        let mapping = ColumnMapping::from_path(file.path()).unwrap();
        assert_eq!(mapping.timestamp_column(), "Time");
        assert_eq!(mapping.duration_column(), "Days");
        assert_eq!(mapping.len(), 1);
    }
}
