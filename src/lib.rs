//! DASware Processor Library
//!
//! Parses multi-section DASware bioreactor export files into per-unit tables
//! and derives canonical time series (timestamp, duration, process time plus
//! mapped process variables) for each unit.
//!
//! This library provides tools for:
//! - Splitting exports into blocks scoped to a unit or the whole file
//! - Dispatching blocks to version-specific table parsers
//! - Deriving canonical per-unit series from raw logged values
//! - Writing per-unit series and long-format tables to Parquet

pub mod cli;
pub mod column_mapping;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod result_model;
pub mod schema;
pub mod splitter;
pub mod timebase;
pub mod writer;

// Re-export commonly used types
pub use column_mapping::ColumnMapping;
pub use config::{CompressionAlgorithm, ProcessorConfig};
pub use dispatcher::BlockDispatcher;
pub use error::{DaswareError, Result};
pub use models::{DispatchStats, FormatVersion, ProcessingStats, Scope, ScopedBlock, ScopedBlockSet};
pub use pipeline::{DaswareParser, InoculationOverrides, ParsedExport, parse_file};
pub use processor::BatchProcessor;
pub use result_model::{ResultModel, UnitRecord};
pub use schema::{BlockOutcome, SchemaTable, TableSlot};
pub use splitter::ScopeSplitter;
pub use timebase::TimeBaseDeriver;
pub use writer::{ParquetWriter, WriteSummary};
