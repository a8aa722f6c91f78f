//! In-memory result of parsing one export.
//!
//! [`ResultModel`] owns the file-global tables and one [`UnitRecord`] per
//! process unit. Unit records are created lazily by the dispatcher and only
//! ever gain tables.

use crate::constants::{DURATION_COLUMN, PROCESS_TIME_COLUMN, TIME_AXES, TIMESTAMP_COLUMN, narrow};
use crate::error::{DaswareError, Result};
use crate::models::FormatVersion;
use crate::schema::TableSlot;
use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Tables and derived series of one process unit
#[derive(Debug, Clone)]
pub struct UnitRecord {
    id: u32,
    tables: BTreeMap<TableSlot, DataFrame>,
    time_series: Option<DataFrame>,
}

impl UnitRecord {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            tables: BTreeMap::new(),
            time_series: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn table(&self, slot: TableSlot) -> Option<&DataFrame> {
        self.tables.get(&slot)
    }

    pub fn set_table(&mut self, slot: TableSlot, table: DataFrame) {
        self.tables.insert(slot, table);
    }

    pub fn slots(&self) -> impl Iterator<Item = TableSlot> + '_ {
        self.tables.keys().copied()
    }

    pub fn setup(&self) -> Option<&DataFrame> {
        self.table(TableSlot::Setup)
    }

    pub fn unit(&self) -> Option<&DataFrame> {
        self.table(TableSlot::Unit)
    }

    pub fn requirements(&self) -> Option<&DataFrame> {
        self.table(TableSlot::Requirements)
    }

    pub fn sensor_elements(&self) -> Option<&DataFrame> {
        self.table(TableSlot::SensorElements)
    }

    pub fn device_channels(&self) -> Option<&DataFrame> {
        self.table(TableSlot::DeviceChannels)
    }

    pub fn profiles(&self) -> Option<&DataFrame> {
        self.table(TableSlot::Profiles)
    }

    /// Raw logged values as decoded from the TrackData block
    pub fn track_data(&self) -> Option<&DataFrame> {
        self.table(TableSlot::TrackData)
    }

    /// Canonical time series, once derived
    pub fn time_series(&self) -> Option<&DataFrame> {
        self.time_series.as_ref()
    }

    pub fn time_series_mut(&mut self) -> Option<&mut DataFrame> {
        self.time_series.as_mut()
    }

    pub fn set_time_series(&mut self, series: DataFrame) {
        self.time_series = Some(series);
    }

    /// Rows of the time series whose `reference` value lies closest to each point.
    ///
    /// Nulls never match; on ties the earlier row wins. The result has one row
    /// per point, in point order.
    pub fn closest_rows(&self, points: &[f64], reference: &str) -> Result<DataFrame> {
        let series = self.time_series.as_ref().ok_or_else(|| {
            DaswareError::derivation(self.id, "no canonical time series to look up")
        })?;

        let column = series
            .column(reference)
            .map_err(|_| DaswareError::ColumnNotFound {
                column: reference.to_string(),
                available: column_names(series),
            })?
            .cast(&DataType::Float64)?;
        let values = column.as_materialized_series().f64()?;

        let mut indices: Vec<IdxSize> = Vec::with_capacity(points.len());
        for &point in points {
            let nearest = values
                .into_iter()
                .enumerate()
                .filter_map(|(row, value)| value.map(|v| (row, (v - point).abs())))
                .fold(None, |best: Option<(usize, f64)>, (row, distance)| match best {
                    Some((_, best_distance)) if best_distance <= distance => best,
                    _ => Some((row, distance)),
                });

            match nearest {
                Some((row, _)) => indices.push(row as IdxSize),
                None => {
                    return Err(DaswareError::derivation(
                        self.id,
                        format!("column '{}' holds no defined values", reference),
                    ));
                }
            }
        }

        let indices = IdxCa::from_vec("idx".into(), indices);
        Ok(series.take(&indices)?)
    }
}

/// Everything parsed from one export
#[derive(Debug, Clone)]
pub struct ResultModel {
    version: FormatVersion,
    tables: BTreeMap<TableSlot, DataFrame>,
    units: BTreeMap<u32, UnitRecord>,
}

impl ResultModel {
    pub fn new(version: FormatVersion) -> Self {
        Self {
            version,
            tables: BTreeMap::new(),
            units: BTreeMap::new(),
        }
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn table(&self, slot: TableSlot) -> Option<&DataFrame> {
        self.tables.get(&slot)
    }

    pub fn set_table(&mut self, slot: TableSlot, table: DataFrame) {
        self.tables.insert(slot, table);
    }

    pub fn slots(&self) -> impl Iterator<Item = TableSlot> + '_ {
        self.tables.keys().copied()
    }

    /// Software module versions
    pub fn info(&self) -> Option<&DataFrame> {
        self.table(TableSlot::Info)
    }

    /// DASware installation and timezone settings
    pub fn coreinfo(&self) -> Option<&DataFrame> {
        self.table(TableSlot::CoreInfo)
    }

    pub fn projectinfo(&self) -> Option<&DataFrame> {
        self.table(TableSlot::ProjectInfo)
    }

    /// Logging settings
    pub fn trackinfo(&self) -> Option<&DataFrame> {
        self.table(TableSlot::TrackInfo)
    }

    pub fn events(&self) -> Option<&DataFrame> {
        self.table(TableSlot::Events)
    }

    pub fn fb_pro(&self) -> Option<&DataFrame> {
        self.table(TableSlot::FbPro)
    }

    pub fn procedure(&self) -> Option<&DataFrame> {
        self.table(TableSlot::Procedure)
    }

    pub fn profile_columns(&self) -> Option<&DataFrame> {
        self.table(TableSlot::ProfileColumns)
    }

    pub fn plant(&self) -> Option<&DataFrame> {
        self.table(TableSlot::Plant)
    }

    /// The global `Units` metadata table, not the unit records
    pub fn units_table(&self) -> Option<&DataFrame> {
        self.table(TableSlot::Units)
    }

    pub fn sensors(&self) -> Option<&DataFrame> {
        self.table(TableSlot::Sensors)
    }

    pub fn modules(&self) -> Option<&DataFrame> {
        self.table(TableSlot::Modules)
    }

    pub fn external_servers(&self) -> Option<&DataFrame> {
        self.table(TableSlot::ExternalServers)
    }

    pub fn external_values(&self) -> Option<&DataFrame> {
        self.table(TableSlot::ExternalValues)
    }

    pub fn internal_values(&self) -> Option<&DataFrame> {
        self.table(TableSlot::InternalValues)
    }

    pub fn setups(&self) -> Option<&DataFrame> {
        self.table(TableSlot::Setups)
    }

    pub fn unit(&self, id: u32) -> Option<&UnitRecord> {
        self.units.get(&id)
    }

    pub fn unit_mut(&mut self, id: u32) -> Option<&mut UnitRecord> {
        self.units.get_mut(&id)
    }

    /// The record of a unit, created on first use
    pub fn unit_entry(&mut self, id: u32) -> &mut UnitRecord {
        self.units.entry(id).or_insert_with(|| UnitRecord::new(id))
    }

    /// Unit records in ascending unit order
    pub fn units(&self) -> impl Iterator<Item = &UnitRecord> {
        self.units.values()
    }

    pub fn units_mut(&mut self) -> impl Iterator<Item = &mut UnitRecord> {
        self.units.values_mut()
    }

    pub fn unit_ids(&self) -> Vec<u32> {
        self.units.keys().copied().collect()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// All canonical series stacked into `reactor`, `time`, `variable`, `value`.
    ///
    /// `process_time` drops incomplete rows and the timestamp, `duration` drops
    /// the timestamp, `timestamp` keeps both other time columns as variables.
    pub fn narrow_data(&self, time_axis: &str) -> Result<DataFrame> {
        if !TIME_AXES.contains(&time_axis) {
            return Err(DaswareError::ColumnNotFound {
                column: time_axis.to_string(),
                available: TIME_AXES.iter().map(|axis| axis.to_string()).collect(),
            });
        }

        let mut frames = Vec::new();
        for record in self.units() {
            let Some(series) = record.time_series() else {
                debug!("Unit {} has no canonical series, skipping in narrow export", record.id());
                continue;
            };

            let series = match time_axis {
                PROCESS_TIME_COLUMN => without_timestamp(series.drop_nulls::<String>(None)?)?,
                DURATION_COLUMN => without_timestamp(series.clone())?,
                _ => series.clone(),
            };

            frames.extend(unit_narrow_frames(record.id(), &series, time_axis)?);
        }

        if frames.is_empty() {
            return Ok(empty_narrow_frame(time_axis));
        }

        Ok(concat(frames, UnionArgs::default())?.collect()?)
    }
}

/// One lazy frame per variable column of a unit
fn unit_narrow_frames(unit: u32, series: &DataFrame, time_axis: &str) -> Result<Vec<LazyFrame>> {
    let height = series.height();
    let time = series.column(time_axis)?.clone().with_name(narrow::TIME.into());

    let mut frames = Vec::new();
    for column in series.get_columns() {
        let variable = column.name().as_str();
        if variable == time_axis {
            continue;
        }

        let frame = DataFrame::new(vec![
            Column::new(narrow::REACTOR.into(), vec![unit; height]),
            time.clone(),
            Column::new(narrow::VARIABLE.into(), vec![variable; height]),
            column.cast(&DataType::Float64)?.with_name(narrow::VALUE.into()),
        ])?;
        frames.push(frame.lazy());
    }

    Ok(frames)
}

fn without_timestamp(df: DataFrame) -> Result<DataFrame> {
    match df.get_column_index(TIMESTAMP_COLUMN) {
        Some(_) => Ok(df.drop(TIMESTAMP_COLUMN)?),
        None => Ok(df),
    }
}

fn empty_narrow_frame(time_axis: &str) -> DataFrame {
    let time_type = if time_axis == TIMESTAMP_COLUMN {
        DataType::Datetime(TimeUnit::Microseconds, Some(TimeZone::UTC))
    } else {
        DataType::Float64
    };

    DataFrame::empty_with_schema(&Schema::from_iter([
        Field::new(narrow::REACTOR.into(), DataType::UInt32),
        Field::new(narrow::TIME.into(), time_type),
        Field::new(narrow::VARIABLE.into(), DataType::String),
        Field::new(narrow::VALUE.into(), DataType::Float64),
    ]))
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}
