//! Reading datasets from delimited text with per-column type inference.

use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use thiserror::Error;

use super::dataset::{DatasetError, TabularDataset};
use super::schema::{DataType, Field};
use super::temporal::{parse_date, parse_timestamp};
use super::value::Value;

/// Errors raised while reading a dataset from delimited text.
#[derive(Debug, Error)]
pub enum CsvLoadError {
    /// Malformed delimited input.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// The input could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The parsed records do not form a valid dataset.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl TabularDataset {
    /// Reads a headed CSV file, naming the dataset after the file stem.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, CsvLoadError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let dataset = Self::from_csv_reader(file)?;
        Ok(match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => dataset.with_name(stem),
            None => dataset,
        })
    }

    /// Reads headed CSV, inferring one type per column. An empty field is
    /// null; a column narrows from integer to float, boolean, date,
    /// timestamp and finally text.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, CsvLoadError> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = reader.headers()?.clone();
        let records: Vec<StringRecord> = reader.records().collect::<Result<_, _>>()?;

        let fields: Vec<Field> = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let column = records.iter().filter_map(|r| r.get(idx));
                Field::new(name, infer_column_type(column))
            })
            .collect();

        let mut dataset = TabularDataset::new(fields)?;
        for record in &records {
            let row = dataset
                .fields()
                .iter()
                .enumerate()
                .map(|(idx, field)| parse_cell(record.get(idx).unwrap_or(""), field.data_type))
                .collect();
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }
}

const CANDIDATES: [DataType; 5] = [
    DataType::Int,
    DataType::Float,
    DataType::Bool,
    DataType::Date,
    DataType::Timestamp,
];

fn infer_column_type<'a>(cells: impl Iterator<Item = &'a str> + Clone) -> DataType {
    let mut non_empty = cells.filter(|c| !c.is_empty()).peekable();
    if non_empty.peek().is_none() {
        return DataType::Text;
    }
    CANDIDATES
        .into_iter()
        .find(|ty| non_empty.clone().all(|cell| !parse_cell(cell, *ty).is_null()))
        .unwrap_or(DataType::Text)
}

fn parse_cell(raw: &str, ty: DataType) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    let parsed = match ty {
        DataType::Int => raw.parse().ok().map(Value::Int),
        DataType::Float => raw.parse().ok().map(Value::Float),
        DataType::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" | "t" => Some(Value::Bool(true)),
            "false" | "f" => Some(Value::Bool(false)),
            _ => None,
        },
        DataType::Date => parse_date(raw).map(Value::Date),
        DataType::Timestamp => parse_timestamp(raw).map(Value::Timestamp),
        DataType::Bytes => raw
            .strip_prefix("\\x")
            .and_then(|h| hex::decode(h).ok())
            .map(Value::Bytes),
        DataType::Decimal => Some(Value::Decimal(raw.to_string())),
        DataType::Text => Some(Value::Text(raw.to_string())),
    };
    parsed.unwrap_or(Value::Null)
}
