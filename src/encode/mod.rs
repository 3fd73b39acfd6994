//! Streaming row encoder for the bulk-copy channel.
//!
//! [`CsvChunkEncoder`] serializes a borrowed [`TabularDataset`] into
//! delimited-text records one slice of rows at a time. Each [`pull`] encodes
//! at most `chunk_rows` rows into a fresh buffer, so memory stays bounded by
//! the chunk size no matter how large the dataset is. Concatenating every
//! chunk in order yields the full serialization.
//!
//! [`pull`]: CsvChunkEncoder::pull

use bytes::Bytes;
use csv::{QuoteStyle, WriterBuilder};
use thiserror::Error;

use crate::table::temporal::{format_date, format_timestamp};
use crate::table::{TabularDataset, Value};

/// Rows per encoded chunk when no explicit size is configured.
pub const DEFAULT_CHUNK_ROWS: usize = 10_000;

/// Errors raised by the delimited-text writer.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The underlying CSV writer rejected a record.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// The in-memory chunk buffer could not be flushed.
    #[error("failed to flush encoded chunk: {0}")]
    Flush(String),
}

/// Knobs for [`CsvChunkEncoder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Field delimiter.
    pub delimiter: u8,
    /// Maximum rows per chunk. Zero is treated as one.
    pub chunk_rows: usize,
    /// Emit the dataset index as the leading column.
    pub include_index: bool,
    /// Header label of the index column.
    pub index_label: Option<String>,
    /// Text written for null cells.
    pub null_marker: String,
    /// Emit a header record before the first row.
    pub header: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            chunk_rows: DEFAULT_CHUNK_ROWS,
            include_index: false,
            index_label: None,
            null_marker: String::new(),
            header: false,
        }
    }
}

/// Pull-based, lazily evaluated encoder over a borrowed dataset.
pub struct CsvChunkEncoder<'a> {
    dataset: &'a TabularDataset,
    config: EncoderConfig,
    builder: WriterBuilder,
    next_row: usize,
    header_pending: bool,
    cell: String,
}

impl<'a> CsvChunkEncoder<'a> {
    /// Prepares an encoder; nothing is serialized until the first pull.
    pub fn new(dataset: &'a TabularDataset, mut config: EncoderConfig) -> Self {
        config.chunk_rows = config.chunk_rows.max(1);
        let mut builder = WriterBuilder::new();
        builder
            .delimiter(config.delimiter)
            .quote_style(QuoteStyle::Never)
            .has_headers(false);
        let header_pending = config.header;
        Self {
            dataset,
            config,
            builder,
            next_row: 0,
            header_pending,
            cell: String::new(),
        }
    }

    /// Rows serialized so far.
    pub fn rows_encoded(&self) -> usize {
        self.next_row
    }

    /// True once every row (and the header, if requested) has been emitted.
    pub fn is_exhausted(&self) -> bool {
        !self.header_pending && self.next_row >= self.dataset.num_rows()
    }

    /// Encodes the next slice of rows.
    ///
    /// Returns an empty chunk once the dataset is exhausted; further calls
    /// keep returning an empty chunk.
    pub fn pull(&mut self) -> Result<Bytes, EncodeError> {
        if self.is_exhausted() {
            return Ok(Bytes::new());
        }
        let start = self.next_row;
        let end = (start + self.config.chunk_rows).min(self.dataset.num_rows());
        let mut writer = self.builder.from_writer(Vec::new());

        if self.header_pending {
            let fields = self
                .dataset
                .staging_fields(self.config.include_index, self.config.index_label.as_deref());
            for field in &fields {
                write_cell(
                    &mut self.cell,
                    &Value::Text(field.name.clone()),
                    &self.config.null_marker,
                    self.config.delimiter,
                );
                writer.write_field(&self.cell)?;
            }
            writer.write_record(None::<&[u8]>)?;
            self.header_pending = false;
        }

        for row in start..end {
            if self.config.include_index {
                let label = self.dataset.index_value(row);
                write_cell(
                    &mut self.cell,
                    &label,
                    &self.config.null_marker,
                    self.config.delimiter,
                );
                writer.write_field(&self.cell)?;
            }
            for value in &self.dataset.rows()[row] {
                write_cell(
                    &mut self.cell,
                    value,
                    &self.config.null_marker,
                    self.config.delimiter,
                );
                writer.write_field(&self.cell)?;
            }
            writer.write_record(None::<&[u8]>)?;
        }
        self.next_row = end;

        let buf = writer
            .into_inner()
            .map_err(|err| EncodeError::Flush(err.error().to_string()))?;
        Ok(Bytes::from(buf))
    }
}

impl Iterator for CsvChunkEncoder<'_> {
    type Item = Result<Bytes, EncodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_exhausted() {
            return None;
        }
        Some(self.pull())
    }
}

/// Renders one cell in copy wire format into `out`, replacing its contents.
///
/// Nulls become the bare `null_marker`. Any other value is quoted when it
/// would otherwise be read back as something else: empty text, text equal to
/// the marker, or text holding the delimiter, a quote or a line break.
pub fn write_cell(out: &mut String, value: &Value, null_marker: &str, delimiter: u8) {
    out.clear();
    match value {
        Value::Null => {
            out.push_str(null_marker);
            return;
        }
        Value::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        Value::Int(v) => out.push_str(&v.to_string()),
        Value::Float(v) if v.is_nan() => out.push_str("NaN"),
        Value::Float(v) if v.is_infinite() => {
            out.push_str(if *v > 0.0 { "Infinity" } else { "-Infinity" })
        }
        Value::Float(v) => out.push_str(&v.to_string()),
        Value::Text(v) | Value::Decimal(v) => out.push_str(v),
        Value::Bytes(v) => {
            out.push_str("\\x");
            out.push_str(&hex::encode(v));
        }
        Value::Date(v) => out.push_str(&format_date(*v)),
        Value::Timestamp(v) => out.push_str(&format_timestamp(*v)),
    }
    if needs_quotes(out, null_marker, delimiter) {
        *out = format!("\"{}\"", out.replace('"', "\"\""));
    }
}

fn needs_quotes(text: &str, null_marker: &str, delimiter: u8) -> bool {
    text.is_empty()
        || text == null_marker
        || text
            .bytes()
            .any(|b| b == delimiter || matches!(b, b'"' | b'\n' | b'\r'))
}
