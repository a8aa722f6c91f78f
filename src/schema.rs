//! Block schema tables and the generic block parsers.
//!
//! A schema table maps a header name to the table slot it fills and the
//! function that decodes it. Parsers never panic or return errors; they
//! report a [`BlockOutcome`] the dispatcher matches on.

use crate::constants::DEFAULT_DELIMITER;
use crate::error::DaswareError;
use crate::models::{FormatVersion, Scope};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;

/// Named table slots of the result model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableSlot {
    Info,
    CoreInfo,
    ProjectInfo,
    TrackInfo,
    TrackData,
    Setup,
    Unit,
    Requirements,
    SensorElements,
    DeviceChannels,
    Profiles,
    Events,
    FbPro,
    Procedure,
    ProfileColumns,
    Plant,
    Units,
    Sensors,
    Modules,
    ExternalServers,
    ExternalValues,
    InternalValues,
    Setups,
}

impl TableSlot {
    pub const ALL: [TableSlot; 23] = [
        TableSlot::Info,
        TableSlot::CoreInfo,
        TableSlot::ProjectInfo,
        TableSlot::TrackInfo,
        TableSlot::TrackData,
        TableSlot::Setup,
        TableSlot::Unit,
        TableSlot::Requirements,
        TableSlot::SensorElements,
        TableSlot::DeviceChannels,
        TableSlot::Profiles,
        TableSlot::Events,
        TableSlot::FbPro,
        TableSlot::Procedure,
        TableSlot::ProfileColumns,
        TableSlot::Plant,
        TableSlot::Units,
        TableSlot::Sensors,
        TableSlot::Modules,
        TableSlot::ExternalServers,
        TableSlot::ExternalValues,
        TableSlot::InternalValues,
        TableSlot::Setups,
    ];

    /// Block header name as it appears in an export
    pub fn header(&self) -> &'static str {
        match self {
            TableSlot::Info => "Info",
            TableSlot::CoreInfo => "CoreInfo",
            TableSlot::ProjectInfo => "ProjectInfo",
            TableSlot::TrackInfo => "TrackInfo",
            TableSlot::TrackData => "TrackData",
            TableSlot::Setup => "Setup",
            TableSlot::Unit => "Unit",
            TableSlot::Requirements => "Requirements",
            TableSlot::SensorElements => "Sensor Elements",
            TableSlot::DeviceChannels => "Device Channels",
            TableSlot::Profiles => "Profiles",
            TableSlot::Events => "Events",
            TableSlot::FbPro => "Fb-Pro",
            TableSlot::Procedure => "Procedure",
            TableSlot::ProfileColumns => "Profile Columns",
            TableSlot::Plant => "Plant",
            TableSlot::Units => "Units",
            TableSlot::Sensors => "Sensors",
            TableSlot::Modules => "Modules",
            TableSlot::ExternalServers => "External Servers",
            TableSlot::ExternalValues => "External Values",
            TableSlot::InternalValues => "Internal Values",
            TableSlot::Setups => "Setups",
        }
    }

    /// Snake-case slot name, e.g. `sensor_elements` or `fb_pro`
    pub fn name(&self) -> String {
        self.header().to_lowercase().replace([' ', '-'], "_")
    }

    pub fn from_header(header: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.header() == header)
    }
}

impl fmt::Display for TableSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Everything a block parser gets to see
#[derive(Debug, Clone, Copy)]
pub struct BlockContext<'a> {
    pub scope: Scope,
    pub header: &'a str,
    pub text: &'a str,
    pub slot: TableSlot,
    pub delimiter: u8,
}

impl BlockContext<'_> {
    fn failed(&self, reason: impl ToString) -> BlockOutcome {
        BlockOutcome::Failed {
            error: DaswareError::BlockParse {
                scope: self.scope,
                header: self.header.to_string(),
                reason: reason.to_string(),
            },
        }
    }
}

/// Result of parsing one block
#[derive(Debug)]
pub enum BlockOutcome {
    Parsed { slot: TableSlot, table: DataFrame },
    /// The block type is recognised but deliberately not decoded
    Skipped { reason: String },
    Failed { error: DaswareError },
}

pub type BlockParser = fn(&BlockContext<'_>) -> BlockOutcome;

#[derive(Debug, Clone, Copy)]
pub struct SchemaEntry {
    pub slot: TableSlot,
    pub parser: BlockParser,
}

/// Header name -> (slot, parser) for one export version
#[derive(Debug, Clone)]
pub struct SchemaTable {
    version: FormatVersion,
    delimiter: u8,
    entries: BTreeMap<String, SchemaEntry>,
}

impl SchemaTable {
    /// A table without any registered headers
    pub fn empty(version: FormatVersion) -> Self {
        Self {
            version,
            delimiter: DEFAULT_DELIMITER as u8,
            entries: BTreeMap::new(),
        }
    }

    /// The built-in schema of an export version
    pub fn for_version(version: FormatVersion) -> Self {
        // Both versions share one block layout; they differ in column naming only
        let mut table = Self::empty(version);
        for slot in TableSlot::ALL {
            let parser: BlockParser = match slot {
                TableSlot::ProjectInfo | TableSlot::TrackInfo => parse_generic_transposed,
                TableSlot::Requirements | TableSlot::Profiles | TableSlot::ProfileColumns => {
                    parse_unimplemented
                }
                _ => parse_generic,
            };
            table.register(slot.header(), slot, parser);
        }
        table
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Register (or replace) the parser of a header
    pub fn register(&mut self, header: impl Into<String>, slot: TableSlot, parser: BlockParser) {
        self.entries.insert(header.into(), SchemaEntry { slot, parser });
    }

    pub fn get(&self, header: &str) -> Option<&SchemaEntry> {
        self.entries.get(header)
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the registered parser of a block, or `None` for unknown headers
    pub fn parse(&self, scope: Scope, header: &str, text: &str) -> Option<BlockOutcome> {
        let entry = self.get(header)?;
        let ctx = BlockContext {
            scope,
            header,
            text,
            slot: entry.slot,
            delimiter: self.delimiter,
        };
        Some((entry.parser)(&ctx))
    }
}

/// Decode a block as a delimiter-separated table with a header row
pub fn parse_generic(ctx: &BlockContext<'_>) -> BlockOutcome {
    match read_block_table(ctx.text, ctx.delimiter) {
        Ok(table) => BlockOutcome::Parsed {
            slot: ctx.slot,
            table,
        },
        Err(e) => ctx.failed(e),
    }
}

/// Decode a block and flip rows and columns; the original column names end
/// up in a `field` column
pub fn parse_generic_transposed(ctx: &BlockContext<'_>) -> BlockOutcome {
    match read_block_table(ctx.text, ctx.delimiter).and_then(transpose_table) {
        Ok(table) => BlockOutcome::Parsed {
            slot: ctx.slot,
            table,
        },
        Err(e) => ctx.failed(e),
    }
}

pub fn parse_unimplemented(ctx: &BlockContext<'_>) -> BlockOutcome {
    BlockOutcome::Skipped {
        reason: format!("parsing of \"{}\" blocks is not implemented", ctx.header),
    }
}

pub fn read_block_table(text: &str, delimiter: u8) -> PolarsResult<DataFrame> {
    let options = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|parse_options| {
            parse_options
                .with_separator(delimiter)
                .with_truncate_ragged_lines(true)
        });

    let table = CsvReader::new(Cursor::new(text.as_bytes().to_vec()))
        .with_options(options)
        .finish()?;
    blank_cells_to_null(table)
}

/// Quoted empty cells decode as empty strings; make them missing values and
/// re-infer the type of every column that held them
fn blank_cells_to_null(table: DataFrame) -> PolarsResult<DataFrame> {
    let columns = table
        .get_columns()
        .iter()
        .map(|column| {
            if column.dtype() != &DataType::String {
                return Ok(column.clone());
            }

            let values = column.as_materialized_series().str()?;
            let cleaned: StringChunked = values
                .into_iter()
                .map(|value| value.filter(|v| !v.trim().is_empty()))
                .collect();
            if cleaned.null_count() == values.null_count() {
                return Ok(column.clone());
            }

            let cleaned = cleaned.with_name(column.name().clone()).into_series();
            Ok(reinfer(cleaned).into())
        })
        .collect::<PolarsResult<Vec<Column>>>()?;

    DataFrame::new(columns)
}

fn reinfer(series: Series) -> Series {
    if series.null_count() == series.len() {
        return series;
    }

    let numeric = [DataType::Int64, DataType::Float64]
        .iter()
        .find_map(|dtype| series.strict_cast(dtype).ok());
    numeric.unwrap_or(series)
}

fn transpose_table(df: DataFrame) -> PolarsResult<DataFrame> {
    // Transposing needs a single supertype, so every cell becomes text
    let columns = df
        .get_columns()
        .iter()
        .map(|column| column.cast(&DataType::String))
        .collect::<PolarsResult<Vec<_>>>()?;

    let mut df = DataFrame::new(columns)?;
    df.transpose(Some("field"), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(header: &'a str, text: &'a str) -> BlockContext<'a> {
        BlockContext {
            scope: Scope::Unit(1),
            header,
            text,
            slot: TableSlot::from_header(header).unwrap(),
            delimiter: b';',
        }
    }

    #[test]
    fn test_slot_names() {
        assert_eq!(TableSlot::SensorElements.name(), "sensor_elements");
        assert_eq!(TableSlot::FbPro.name(), "fb_pro");
        assert_eq!(TableSlot::from_header("Profile Columns"), Some(TableSlot::ProfileColumns));
        assert_eq!(TableSlot::from_header("Unknown"), None);
    }

    #[test]
    fn test_builtin_schema_registers_every_slot() {
        for version in [FormatVersion::V4, FormatVersion::V5] {
            let table = SchemaTable::for_version(version);
            assert_eq!(table.len(), TableSlot::ALL.len());
            assert_eq!(table.version(), version);
            assert_eq!(table.get("Fb-Pro").unwrap().slot, TableSlot::FbPro);
        }
    }

    #[test]
    fn test_parse_generic() {
        let text = "\"Timestamp\";\"Duration\";\"R1.pH1.PV\"\n\"2019-02-06 10:46:52\";0;7.01\n\"2019-02-06 10:47:52\";0.000694;7.02";
        match parse_generic(&context("TrackData", text)) {
            BlockOutcome::Parsed { slot, table } => {
                assert_eq!(slot, TableSlot::TrackData);
                assert_eq!(table.shape(), (2, 3));
                assert_eq!(table.column("Timestamp").unwrap().dtype(), &DataType::String);
                assert_eq!(table.column("R1.pH1.PV").unwrap().dtype(), &DataType::Float64);
            }
            other => panic!("expected parsed block, got {:?}", other),
        }
    }

    #[test]
    fn test_quoted_empty_cells_are_missing() {
        let text = "\"Timestamp\";\"R1.pH1.PV\";\"R1.DO1.PV\";\"Note\"\n\
                    \"2019-02-06 10:46:52\";\"7.01\";\"\";\"start\"\n\
                    \"2019-02-06 10:47:52\";\"\";\" \";\"\"";
        let table = read_block_table(text, b';').unwrap();

        let ph = table.column("R1.pH1.PV").unwrap();
        assert_eq!(ph.dtype(), &DataType::Float64);
        assert_eq!(ph.null_count(), 1);

        let dissolved_oxygen = table.column("R1.DO1.PV").unwrap();
        assert_eq!(dissolved_oxygen.null_count(), 2);

        let note = table.column("Note").unwrap();
        assert_eq!(note.dtype(), &DataType::String);
        assert_eq!(note.null_count(), 1);
        assert_eq!(table.column("Timestamp").unwrap().null_count(), 0);
    }

    #[test]
    fn test_parse_generic_tolerates_ragged_lines() {
        let text = "\"Name\";\"Value\"\n\"Volume\";\"1\";\"extra\"";
        assert!(matches!(
            parse_generic(&context("Setup", text)),
            BlockOutcome::Parsed { .. }
        ));
    }

    #[test]
    fn test_parse_transposed_keeps_field_names() {
        let text = "\"Name\";\"Operator\";\"Start\"\n\"Batch 7\";\"jdoe\";\"2019-02-06\"";
        match parse_generic_transposed(&context("ProjectInfo", text)) {
            BlockOutcome::Parsed { table, .. } => {
                assert_eq!(table.height(), 3);
                let fields: Vec<Option<&str>> =
                    table
                    .column("field")
                    .unwrap()
                    .as_materialized_series()
                    .str()
                    .unwrap()
                    .into_iter()
                    .collect();
                assert_eq!(fields, vec![Some("Name"), Some("Operator"), Some("Start")]);
            }
            other => panic!("expected parsed block, got {:?}", other),
        }
    }

    #[test]
    fn test_unimplemented_headers_are_skipped() {
        let table = SchemaTable::for_version(FormatVersion::V5);
        for header in ["Requirements", "Profiles", "Profile Columns"] {
            let outcome = table.parse(Scope::Unit(1), header, "a;b\n1;2").unwrap();
            assert!(matches!(outcome, BlockOutcome::Skipped { .. }), "{}", header);
        }
    }

    #[test]
    fn test_unknown_header_has_no_outcome() {
        let table = SchemaTable::for_version(FormatVersion::V4);
        assert!(table.parse(Scope::Global, "Calibration", "a;b\n1;2").is_none());
    }

    #[test]
    fn test_empty_block_fails_with_context() {
        match parse_generic(&context("Unit", "")) {
            BlockOutcome::Failed {
                error: DaswareError::BlockParse { scope, header, .. },
            } => {
                assert_eq!(scope, Scope::Unit(1));
                assert_eq!(header, "Unit");
            }
            other => panic!("expected failed block, got {:?}", other),
        }
    }
}
