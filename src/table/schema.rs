use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical column type shared by datasets, staging DDL, and result metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 text.
    Text,
    /// Binary payload.
    Bytes,
    /// Calendar date.
    Date,
    /// Date and time without zone.
    Timestamp,
    /// Arbitrary precision decimal.
    Decimal,
}

impl DataType {
    /// Lowercase name used in config files and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Text => "text",
            DataType::Bytes => "bytes",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
            DataType::Decimal => "decimal",
        }
    }

    /// Maps a declared SQL column type onto a logical type, following the
    /// affinity rules most engines share. Returns `None` when the declaration
    /// carries no usable hint.
    pub fn from_sql_decl(decl: &str) -> Option<DataType> {
        let decl = decl.trim().to_ascii_uppercase();
        if decl.is_empty() {
            return None;
        }
        if decl.starts_with("BOOL") {
            return Some(DataType::Bool);
        }
        if decl.contains("INT") || decl == "SERIAL" || decl == "BIGSERIAL" {
            return Some(DataType::Int);
        }
        if decl.starts_with("NUMERIC") || decl.starts_with("DECIMAL") {
            return Some(DataType::Decimal);
        }
        if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
            return Some(DataType::Float);
        }
        if decl.starts_with("TIMESTAMP") || decl == "DATETIME" {
            return Some(DataType::Timestamp);
        }
        if decl == "DATE" {
            return Some(DataType::Date);
        }
        if decl.contains("BLOB") || decl == "BYTEA" {
            return Some(DataType::Bytes);
        }
        if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
            return Some(DataType::Text);
        }
        None
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(DataType::Bool),
            "int" | "integer" => Ok(DataType::Int),
            "float" | "double" => Ok(DataType::Float),
            "text" | "string" => Ok(DataType::Text),
            "bytes" | "binary" => Ok(DataType::Bytes),
            "date" => Ok(DataType::Date),
            "timestamp" | "datetime" => Ok(DataType::Timestamp),
            "decimal" | "numeric" => Ok(DataType::Decimal),
            other => Err(format!("unknown data type '{other}'")),
        }
    }
}

/// Named, typed column description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Logical type.
    pub data_type: DataType,
}

impl Field {
    /// Creates a field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}
