//! Error handling for DASware export processing.
//!
//! Separates usage errors (bad input, unknown format) from block-level parse
//! failures, per-unit derivation failures and lookups against derived tables.

use crate::models::Scope;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaswareError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid usage: {message}")]
    Usage { message: String },

    #[error("Unsupported DASware export: {path} (signature line: {signature:?})")]
    UnsupportedFormat { path: PathBuf, signature: String },

    #[error("Failed to parse block \"{header}\" in {scope}: {reason}")]
    BlockParse {
        scope: Scope,
        header: String,
        reason: String,
    },

    #[error("Unparseable timestamp {value:?} in unit {unit}, row {row}")]
    TimestampParse {
        unit: u32,
        row: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Time base derivation failed for unit {unit}: {reason}")]
    Derivation { unit: u32, reason: String },

    #[error("Column '{column}' not found (available: {available:?})")]
    ColumnNotFound {
        column: String,
        available: Vec<String>,
    },

    #[error("Unit {unit} not found in parsed export")]
    UnitNotFound { unit: u32 },

    #[error("Failed to write {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl DaswareError {
    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a derivation error for one unit
    pub fn derivation(unit: u32, reason: impl Into<String>) -> Self {
        Self::Derivation {
            unit,
            reason: reason.into(),
        }
    }

    /// True for errors raised because the caller asked for something invalid
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage { .. } | Self::UnsupportedFormat { .. })
    }
}

pub type Result<T> = std::result::Result<T, DaswareError>;
