//! Result shaping: declared-type resolution, numeric coercion, date parsing
//! and index extraction over raw engine rows.

use time::{PrimitiveDateTime, Time};

use crate::engine::{ColumnMeta, EngineError};
use crate::error::{Result, StageError};
use crate::table::temporal::{parse_date, parse_timestamp, timestamp_from_epoch};
use crate::table::{infer_type, DataType, Field, TabularDataset, Value};

use super::options::QueryOptions;

/// What a request produced.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryResult {
    /// The whole result set.
    Dataset(TabularDataset),
    /// The result split into chunks of `chunk_size` rows.
    Chunks(Vec<TabularDataset>),
    /// The request had no query text.
    NoResult,
}

impl QueryResult {
    /// The single result dataset, if this is [`QueryResult::Dataset`].
    pub fn into_dataset(self) -> Option<TabularDataset> {
        match self {
            QueryResult::Dataset(dataset) => Some(dataset),
            _ => None,
        }
    }

    /// Result chunks; a whole result is one chunk and no result is none.
    pub fn into_chunks(self) -> Vec<TabularDataset> {
        match self {
            QueryResult::Dataset(dataset) => vec![dataset],
            QueryResult::Chunks(chunks) => chunks,
            QueryResult::NoResult => Vec::new(),
        }
    }

    /// True for [`QueryResult::NoResult`].
    pub fn is_no_result(&self) -> bool {
        matches!(self, QueryResult::NoResult)
    }
}

/// Turns raw engine rows into result datasets.
pub(crate) struct ResultShaper<'o> {
    columns: Vec<ColumnMeta>,
    options: &'o QueryOptions,
    date_columns: Vec<usize>,
}

impl<'o> ResultShaper<'o> {
    /// Checks that every column the options name exists in the result.
    pub(crate) fn new(columns: Vec<ColumnMeta>, options: &'o QueryOptions) -> Result<Self> {
        let position = |name: &str| columns.iter().position(|c| c.name == name);
        if let Some(index) = options.index_column.as_deref() {
            if position(index).is_none() {
                return Err(StageError::invalid(format!(
                    "index_column '{index}' is not a result column"
                )));
            }
        }
        let mut date_columns = Vec::with_capacity(options.parse_dates.len());
        for name in &options.parse_dates {
            let idx = position(name).ok_or_else(|| {
                StageError::invalid(format!("parse_dates column '{name}' is not a result column"))
            })?;
            date_columns.push(idx);
        }
        Ok(Self {
            columns,
            options,
            date_columns,
        })
    }

    /// Shapes one batch of rows into a dataset.
    pub(crate) fn shape(&self, mut rows: Vec<Vec<Value>>) -> Result<TabularDataset> {
        let mut fields = Vec::with_capacity(self.columns.len());
        for (idx, meta) in self.columns.iter().enumerate() {
            let mut data_type = column_type(meta, &rows, idx);
            if self.date_columns.contains(&idx) {
                for row in rows.iter_mut() {
                    let cell = std::mem::replace(&mut row[idx], Value::Null);
                    row[idx] = to_timestamp(cell, &meta.name)?;
                }
                data_type = DataType::Timestamp;
            } else if self.options.coerce_float {
                if let Some(coerced) = coerce_numeric(&mut rows, idx, data_type, &meta.name)? {
                    data_type = coerced;
                }
            }
            fields.push(Field::new(meta.name.clone(), data_type));
        }
        let mut dataset = TabularDataset::from_parts(fields, rows);
        if let Some(index) = self.options.index_column.as_deref() {
            dataset.set_index(index)?;
        }
        Ok(dataset)
    }
}

/// The declared column type when every value fits it, otherwise the type
/// inferred from the values. Untyped all-null columns become text.
fn column_type(meta: &ColumnMeta, rows: &[Vec<Value>], idx: usize) -> DataType {
    let values = || rows.iter().map(|row| &row[idx]);
    match meta.data_type {
        Some(declared) if values().all(|v| v.fits(declared)) => declared,
        _ => infer_type(values()).unwrap_or(DataType::Text),
    }
}

/// Decimal columns become floats and integer cells in float columns are
/// widened. Returns the new column type if anything changed.
fn coerce_numeric(
    rows: &mut [Vec<Value>],
    idx: usize,
    data_type: DataType,
    column: &str,
) -> Result<Option<DataType>> {
    match data_type {
        DataType::Decimal => {
            for row in rows.iter_mut() {
                if let Value::Decimal(text) = &row[idx] {
                    let parsed = text.trim().parse::<f64>().map_err(|_| {
                        StageError::query(EngineError::Conversion(format!(
                            "column '{column}' value '{text}' is not a number"
                        )))
                    })?;
                    row[idx] = Value::Float(parsed);
                }
            }
            Ok(Some(DataType::Float))
        }
        DataType::Float => {
            for row in rows.iter_mut() {
                if let Value::Int(v) = row[idx] {
                    row[idx] = Value::Float(v as f64);
                }
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

fn to_timestamp(value: Value, column: &str) -> Result<Value> {
    let converted = match value {
        Value::Null | Value::Timestamp(_) => return Ok(value),
        Value::Date(date) => Some(PrimitiveDateTime::new(date, Time::MIDNIGHT)),
        Value::Text(ref text) => parse_timestamp(text)
            .or_else(|| parse_date(text).map(|d| PrimitiveDateTime::new(d, Time::MIDNIGHT))),
        Value::Int(secs) => timestamp_from_epoch(secs),
        _ => None,
    };
    converted.map(Value::Timestamp).ok_or_else(|| {
        StageError::query(EngineError::Conversion(format!(
            "column '{column}' value '{value}' is not a date"
        )))
    })
}
