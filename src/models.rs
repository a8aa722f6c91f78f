//! Core data structures for DASware export processing.
//!
//! Defines export format versions, block scoping, the scoped block set the
//! splitter produces and the statistics reported by dispatch and batch runs.

use crate::constants::{SIGNATURE_LINE_INDEX, SIGNATURE_V4, SIGNATURE_V5};
use crate::error::DaswareError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// DASware export format versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatVersion {
    V4,
    V5,
}

impl FormatVersion {
    /// Detect the export version from the archive signature line
    pub fn detect<S: AsRef<str>>(lines: &[S]) -> Option<Self> {
        let signature = lines.get(SIGNATURE_LINE_INDEX)?.as_ref();
        if signature.starts_with(SIGNATURE_V4) {
            Some(FormatVersion::V4)
        } else if signature.starts_with(SIGNATURE_V5) {
            Some(FormatVersion::V5)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatVersion::V4 => "v4",
            FormatVersion::V5 => "v5",
        }
    }

    /// V5 exports list setup blocks for units that never logged data;
    /// those scopes are dropped unless they carry a TrackData block.
    pub fn requires_track_data(&self) -> bool {
        matches!(self, FormatVersion::V5)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatVersion {
    type Err = DaswareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v4" | "4" => Ok(FormatVersion::V4),
            "v5" | "5" => Ok(FormatVersion::V5),
            other => Err(DaswareError::usage(format!(
                "unknown DASware format version '{}' (expected v4 or v5)",
                other
            ))),
        }
    }
}

/// The unit a block belongs to, or the file-global scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    Global,
    Unit(u32),
}

impl Scope {
    pub fn unit(&self) -> Option<u32> {
        match self {
            Scope::Global => None,
            Scope::Unit(n) => Some(*n),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Scope::Global)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global scope"),
            Scope::Unit(n) => write!(f, "unit {}", n),
        }
    }
}

/// A header line plus its content lines, tagged with the scope it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedBlock {
    pub scope: Scope,
    /// Header name without bracket/quote decoration or unit suffix
    pub header: String,
    /// Content lines following the header line
    pub lines: Vec<String>,
}

impl ScopedBlock {
    /// Content lines joined back into one trimmed text block
    pub fn text(&self) -> String {
        self.lines.join("\n").trim().to_string()
    }
}

/// Mapping from scope to (header name -> raw block text)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopedBlockSet {
    blocks: BTreeMap<Scope, BTreeMap<String, String>>,
}

impl ScopedBlockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a block, returning the text it replaced if the header repeats
    pub fn insert(&mut self, scope: Scope, header: impl Into<String>, text: impl Into<String>) -> Option<String> {
        self.blocks
            .entry(scope)
            .or_default()
            .insert(header.into(), text.into())
    }

    pub fn get(&self, scope: Scope, header: &str) -> Option<&str> {
        self.blocks
            .get(&scope)
            .and_then(|headers| headers.get(header))
            .map(String::as_str)
    }

    pub fn contains(&self, scope: Scope, header: &str) -> bool {
        self.get(scope, header).is_some()
    }

    pub fn contains_scope(&self, scope: Scope) -> bool {
        self.blocks.contains_key(&scope)
    }

    pub fn scopes(&self) -> impl Iterator<Item = Scope> + '_ {
        self.blocks.keys().copied()
    }

    pub fn headers(&self, scope: Scope) -> Vec<&str> {
        self.blocks
            .get(&scope)
            .map(|headers| headers.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Every (scope, header, text) triple in scope order
    pub fn iter(&self) -> impl Iterator<Item = (Scope, &str, &str)> + '_ {
        self.blocks.iter().flat_map(|(scope, headers)| {
            headers
                .iter()
                .map(move |(header, text)| (*scope, header.as_str(), text.as_str()))
        })
    }

    /// Keep only unit scopes that contain the given header; the global scope is always kept
    pub fn retain_units_with(&mut self, header: &str) {
        self.blocks
            .retain(|scope, headers| scope.is_global() || headers.contains_key(header));
    }

    /// Number of scopes (global included)
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.values().map(BTreeMap::len).sum()
    }
}

impl FromIterator<ScopedBlock> for ScopedBlockSet {
    fn from_iter<I: IntoIterator<Item = ScopedBlock>>(iter: I) -> Self {
        let mut set = ScopedBlockSet::new();
        for block in iter {
            let text = block.text();
            set.insert(block.scope, block.header, text);
        }
        set
    }
}

/// Per-file block dispatch counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub parsed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub unknown: usize,
}

impl DispatchStats {
    pub fn total(&self) -> usize {
        self.parsed + self.skipped + self.failed + self.unknown
    }
}

/// Batch processing statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub units_written: usize,
    pub total_rows: usize,
    pub output_path: PathBuf,
    pub processing_time_ms: u128,
}
