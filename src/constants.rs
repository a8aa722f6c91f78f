//! File-format constants for DASware control exports
//!
//! Markers, signature lines and the date-time conventions shared by every
//! supported export version.

// =============================================================================
// Layout
// =============================================================================

/// Field delimiter declared by DASware CSV exports
pub const DEFAULT_DELIMITER: char = ';';

/// Zero-based line index holding the archive signature
pub const SIGNATURE_LINE_INDEX: usize = 2;

/// Signature prefix of DASware 4 exports
pub const SIGNATURE_V4: &str = "\"FngArchiv\";\"4.0.1\"";

/// Signature prefix of DASware 5 exports
pub const SIGNATURE_V5: &str = "\"FngArchiv\";\"5.0.0\"";

// =============================================================================
// Section markers
// =============================================================================

/// Header name that returns the splitter to file-global scope
pub const EVENTS_HEADER: &str = "Events";

/// Header of the raw logged-values table of each unit
pub const TRACK_DATA_HEADER: &str = "TrackData";

/// Marker of a unit's logged-values block, e.g. `"[TrackData3]"`
pub const TRACK_DATA_MARKER_PATTERN: &str = r"^\[TrackData(\d+)\]$";

/// Marker of a unit's setup block, e.g. `"[Setup3]"`
pub const SETUP_MARKER_PATTERN: &str = r"^\[Setup(\d+)\]$";

// =============================================================================
// Time
// =============================================================================

/// Date-time pattern used for every timestamp in an export
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Spreadsheet epoch that inoculation-time cells are offsets from
pub const SPREADSHEET_EPOCH: &str = "1899-12-30 00:00:00";

pub const HOURS_PER_DAY: f64 = 24.0;
pub const SECONDS_PER_HOUR: f64 = 3600.0;
pub const MICROSECONDS_PER_HOUR: f64 = 3_600_000_000.0;

// =============================================================================
// Canonical columns
// =============================================================================

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const DURATION_COLUMN: &str = "duration";
pub const PROCESS_TIME_COLUMN: &str = "process_time";

/// Time axes accepted by the narrow export
pub const TIME_AXES: &[&str] = &[TIMESTAMP_COLUMN, DURATION_COLUMN, PROCESS_TIME_COLUMN];

/// Columns of the narrow export, in output order
pub mod narrow {
    pub const REACTOR: &str = "reactor";
    pub const TIME: &str = "time";
    pub const VARIABLE: &str = "variable";
    pub const VALUE: &str = "value";
}
