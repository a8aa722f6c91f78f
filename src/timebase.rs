//! Derivation of the canonical per-unit time series.
//!
//! Turns a unit's raw TrackData table into `timestamp`, `duration` and
//! `process_time` columns followed by every canonical column the active
//! [`ColumnMapping`] can resolve, then forward-fills the sparse readings.

use crate::column_mapping::ColumnMapping;
use crate::constants::{
    DATETIME_FORMAT, DURATION_COLUMN, HOURS_PER_DAY, MICROSECONDS_PER_HOUR, PROCESS_TIME_COLUMN,
    SECONDS_PER_HOUR, SPREADSHEET_EPOCH, TIMESTAMP_COLUMN,
};
use crate::error::{DaswareError, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};
use polars::prelude::*;
use tracing::{debug, warn};

/// Time axis used for every stored timestamp
pub fn timestamp_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Microseconds, Some(TimeZone::UTC))
}

#[derive(Debug, Clone)]
pub struct TimeBaseDeriver<'a> {
    mapping: &'a ColumnMapping,
    utc_offset: FixedOffset,
}

impl<'a> TimeBaseDeriver<'a> {
    /// Deriver for exports whose timestamps are already UTC
    pub fn new(mapping: &'a ColumnMapping) -> Self {
        Self {
            mapping,
            utc_offset: Utc.fix(),
        }
    }

    /// Interpret raw timestamps in a fixed offset before converting to UTC
    pub fn with_utc_offset(mut self, utc_offset: FixedOffset) -> Self {
        self.utc_offset = utc_offset;
        self
    }

    pub fn mapping(&self) -> &ColumnMapping {
        self.mapping
    }

    /// Build the canonical series of one unit from its raw logged values
    pub fn derive(&self, unit: u32, raw: &DataFrame) -> Result<DataFrame> {
        let mut columns = vec![
            self.timestamps(unit, raw)?,
            self.durations(unit, raw)?,
            self.process_times(unit, raw)?,
        ];
        columns.extend(self.mapped_columns(unit, raw));

        let width = columns.len();
        let series = DataFrame::new(columns)?.fill_null(FillNullStrategy::Forward(None))?;

        debug!(
            "Unit {}: derived {} rows with {} canonical columns",
            unit,
            series.height(),
            width - 3
        );
        Ok(series)
    }

    fn timestamps(&self, unit: u32, raw: &DataFrame) -> Result<Column> {
        let values = string_values(unit, raw, self.mapping.timestamp_column())?;

        let mut micros: Vec<Option<i64>> = Vec::with_capacity(values.len());
        for (row, value) in values.into_iter().enumerate() {
            let Some(value) = value else {
                return Err(DaswareError::derivation(
                    unit,
                    format!("row {} has no timestamp", row),
                ));
            };

            let local = parse_datetime(unit, row, value)?;
            let instant = local
                .and_local_timezone(self.utc_offset)
                .single()
                .ok_or_else(|| {
                    DaswareError::derivation(unit, format!("ambiguous local time {:?}", value))
                })?
                .with_timezone(&Utc);
            micros.push(Some(instant.timestamp_micros()));
        }

        Ok(Int64Chunked::new(TIMESTAMP_COLUMN.into(), &micros)
            .into_datetime(TimeUnit::Microseconds, Some(TimeZone::UTC))
            .into_series()
            .into())
    }

    fn durations(&self, unit: u32, raw: &DataFrame) -> Result<Column> {
        let days = raw_column(unit, raw, self.mapping.duration_column())?
            .strict_cast(&DataType::Float64)
            .map_err(|e| {
                DaswareError::derivation(unit, format!("non-numeric duration: {}", e))
            })?;
        let hours = days.as_materialized_series().f64()? * HOURS_PER_DAY;

        Ok(hours.with_name(DURATION_COLUMN.into()).into_series().into())
    }

    /// Hours since inoculation, anchored on the first positive offset from the
    /// spreadsheet epoch in the inoculation-time column
    fn process_times(&self, unit: u32, raw: &DataFrame) -> Result<Column> {
        let mut process_time: Vec<Option<f64>> = vec![None; raw.height()];

        let names = column_names(raw);
        let candidates: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| self.mapping.inoculation_pattern().is_match(name))
            .collect();

        let Some(inoculation) = first_with_data(unit, raw, PROCESS_TIME_COLUMN, &candidates) else {
            debug!("Unit {}: no inoculation time logged", unit);
            return Ok(Column::new(PROCESS_TIME_COLUMN.into(), process_time));
        };

        let epoch = NaiveDateTime::parse_from_str(SPREADSHEET_EPOCH, DATETIME_FORMAT)
            .map_err(|e| DaswareError::derivation(unit, e.to_string()))?;
        let values = string_values(unit, raw, inoculation)?;

        let mut inoculated = false;
        for (row, value) in values.into_iter().enumerate() {
            let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };

            let offset = (parse_datetime(unit, row, value)? - epoch).num_seconds() as f64;
            if !inoculated && offset > 0.0 {
                inoculated = true;
                if row > 0 {
                    process_time[row - 1] = Some(0.0);
                }
                debug!("Unit {}: inoculation detected at row {}", unit, row);
            }
            if inoculated {
                process_time[row] = Some(offset / SECONDS_PER_HOUR);
            }
        }

        Ok(Column::new(PROCESS_TIME_COLUMN.into(), process_time))
    }

    fn mapped_columns(&self, unit: u32, raw: &DataFrame) -> Vec<Column> {
        let names = column_names(raw);

        self.mapping
            .columns()
            .iter()
            .filter_map(|canonical| {
                let matches = canonical.matching(&names);
                let source = first_with_data(unit, raw, &canonical.name, &matches)?;
                let column = raw.column(source).ok()?;
                Some(column.clone().with_name(canonical.name.as_str().into()))
            })
            .collect()
    }
}

/// Replace a unit's process time with hours since an externally known
/// inoculation instant; samples before the instant become null
pub fn apply_inoculation_override(series: &mut DataFrame, instant: DateTime<Utc>) -> Result<()> {
    let micros = series
        .column(TIMESTAMP_COLUMN)?
        .cast(&timestamp_dtype())?
        .cast(&DataType::Int64)?;
    let origin = instant.timestamp_micros();

    let process_time: Float64Chunked = micros
        .as_materialized_series()
        .i64()?
        .into_iter()
        .map(|ts| {
            ts.map(|ts| (ts - origin) as f64 / MICROSECONDS_PER_HOUR)
                .filter(|hours| *hours >= 0.0)
        })
        .collect();

    series.with_column(process_time.with_name(PROCESS_TIME_COLUMN.into()).into_series())?;
    Ok(())
}

fn parse_datetime(unit: u32, row: usize, value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), DATETIME_FORMAT).map_err(|source| {
        DaswareError::TimestampParse {
            unit,
            row,
            value: value.to_string(),
            source,
        }
    })
}

fn raw_column<'df>(unit: u32, raw: &'df DataFrame, name: &str) -> Result<&'df Column> {
    raw.column(name).map_err(|_| {
        DaswareError::derivation(unit, format!("raw logged values lack a '{}' column", name))
    })
}

fn string_values(unit: u32, raw: &DataFrame, name: &str) -> Result<StringChunked> {
    let column = raw_column(unit, raw, name)?.cast(&DataType::String)?;
    Ok(column.as_materialized_series().str()?.clone())
}

fn column_names(df: &DataFrame) -> Vec<&str> {
    df.get_column_names().into_iter().map(|name| name.as_str()).collect()
}

/// The first matched raw column holding at least one defined value
fn first_with_data<'n>(unit: u32, raw: &DataFrame, target: &str, matches: &[&'n str]) -> Option<&'n str> {
    let usable: Vec<&str> = matches
        .iter()
        .copied()
        .filter(|name| {
            raw.column(name)
                .map(|column| column.null_count() < column.len())
                .unwrap_or(false)
        })
        .collect();

    if usable.len() > 1 {
        warn!(
            "Unit {}: {} raw columns match '{}' ({:?}), using the first",
            unit,
            usable.len(),
            target,
            usable
        );
    }
    if usable.is_empty() && !matches.is_empty() {
        debug!("Unit {}: columns matching '{}' hold no data", unit, target);
    }

    usable.first().copied()
}
