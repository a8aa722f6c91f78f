//! Scope splitting of raw DASware exports.
//!
//! An export is a sequence of blocks separated by blank lines. Each block
//! starts with a quoted, bracketed header line such as `"[TrackData2]"`.
//! Unit markers (`TrackData<N>`, `Setup<N>`) switch the current scope to
//! unit N, `Events` switches back to the file-global scope, and every other
//! block inherits the scope of the block before it.

use crate::constants::{EVENTS_HEADER, SETUP_MARKER_PATTERN, TRACK_DATA_MARKER_PATTERN};
use crate::error::{DaswareError, Result};
use crate::models::{Scope, ScopedBlock, ScopedBlockSet};
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// Groups export lines into scoped blocks
#[derive(Debug, Clone)]
pub struct ScopeSplitter {
    track_data_marker: Regex,
    setup_marker: Regex,
}

impl ScopeSplitter {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                DaswareError::configuration(format!("invalid marker pattern {}: {}", pattern, e))
            })
        };

        Ok(Self {
            track_data_marker: compile(TRACK_DATA_MARKER_PATTERN)?,
            setup_marker: compile(SETUP_MARKER_PATTERN)?,
        })
    }

    /// Split already-decoded lines into a scoped block set
    pub fn split<S: AsRef<str>>(&self, lines: &[S]) -> ScopedBlockSet {
        let blocks = self.scoped_blocks(lines);
        debug!("Split export into {} scoped blocks", blocks.len());
        blocks.into_iter().collect()
    }

    /// Split a whole export held in memory
    pub fn split_str(&self, content: &str) -> ScopedBlockSet {
        let lines: Vec<&str> = content.lines().collect();
        self.split(&lines)
    }

    /// Read and split an export file
    pub fn split_file(&self, path: &Path) -> Result<ScopedBlockSet> {
        let content = read_export_text(path)?;
        Ok(self.split_str(&content))
    }

    /// Assign a scope and header name to every retained block, in file order
    pub fn scoped_blocks<S: AsRef<str>>(&self, lines: &[S]) -> Vec<ScopedBlock> {
        let mut scope = Scope::Global;
        let mut scoped = Vec::new();

        for block in group_lines(lines) {
            let header_line = block[0].trim();
            let marker = header_line.trim_matches('"');
            scope = self.next_scope(marker, scope);

            let mut header = undecorate(marker);
            if let Scope::Unit(n) = scope {
                header = header.strip_suffix(n.to_string().as_str()).unwrap_or(header);
            }

            scoped.push(ScopedBlock {
                scope,
                header: header.to_string(),
                lines: block[1..].iter().map(|line| line.to_string()).collect(),
            });
        }

        scoped
    }

    /// Scope rules, evaluated in order: TrackData marker, Events, Setup marker
    fn next_scope(&self, marker: &str, current: Scope) -> Scope {
        if let Some(unit) = capture_unit(&self.track_data_marker, marker) {
            Scope::Unit(unit)
        } else if undecorate(marker) == EVENTS_HEADER {
            Scope::Global
        } else if let Some(unit) = capture_unit(&self.setup_marker, marker) {
            Scope::Unit(unit)
        } else {
            current
        }
    }
}

/// Group lines into blank-line separated blocks, dropping header-only blocks
fn group_lines<S: AsRef<str>>(lines: &[S]) -> Vec<Vec<&str>> {
    let mut blocks: Vec<Vec<&str>> = vec![Vec::new()];

    for line in lines {
        let line = line.as_ref();
        if is_separator(line) {
            blocks.push(Vec::new());
        } else if let Some(current) = blocks.last_mut() {
            current.push(line);
        }
    }

    blocks.retain(|block| block.len() > 1);
    blocks
}

/// A separator carries nothing besides its line terminator
fn is_separator(line: &str) -> bool {
    line.trim_end_matches(['\n', '\r']).is_empty()
}

fn undecorate(marker: &str) -> &str {
    marker
        .trim_matches('"')
        .trim_start_matches('[')
        .trim_end_matches(']')
}

fn capture_unit(pattern: &Regex, marker: &str) -> Option<u32> {
    let number = pattern.captures(marker)?.get(1)?.as_str();
    match number.parse::<u32>() {
        Ok(0) | Err(_) => {
            debug!("Ignoring marker without a valid unit number: {}", marker);
            None
        }
        Ok(unit) => Some(unit),
    }
}

/// Read an export as text: UTF-8 when valid, Latin-1 otherwise
pub fn read_export_text(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(DaswareError::usage(format!(
            "expected a DASware export file, got {}",
            path.display()
        )));
    }

    let bytes = std::fs::read(path)?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) => {
            debug!("{} is not UTF-8, decoding as Latin-1", path.display());
            Ok(e.into_bytes().iter().map(|&b| char::from(b)).collect())
        }
    }
}
