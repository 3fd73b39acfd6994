//! Column-typed, row-major in-memory datasets with an optional index.

use std::collections::HashSet;

use thiserror::Error;

use super::schema::{DataType, Field};
use super::value::Value;

/// Name given to a materialized index column that carries no name of its own.
pub const DEFAULT_INDEX_LABEL: &str = "index";

/// Errors raised while building or reshaping a [`TabularDataset`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DatasetError {
    /// Two columns share a name.
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
    /// A referenced column does not exist.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    /// Columns passed to [`TabularDataset::from_columns`] differ in length.
    #[error("column '{column}' has {found} values, expected {expected}")]
    ColumnLength {
        /// Offending column.
        column: String,
        /// Length of the first column.
        expected: usize,
        /// Length of this column.
        found: usize,
    },
    /// A row does not have one value per column.
    #[error("row has {found} values, expected {expected}")]
    RowArity {
        /// Number of columns.
        expected: usize,
        /// Number of values supplied.
        found: usize,
    },
    /// A value does not fit the declared column type.
    #[error("column '{column}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Offending column.
        column: String,
        /// Declared type.
        expected: DataType,
        /// Type of the supplied value.
        found: DataType,
    },
    /// The index does not have one label per row.
    #[error("index has {found} labels, dataset has {expected} rows")]
    IndexLength {
        /// Row count.
        expected: usize,
        /// Label count.
        found: usize,
    },
}

/// Row labels attached to a dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct Index {
    /// Optional index name, used as the column label when materialized.
    pub name: Option<String>,
    /// One label per row.
    pub values: Vec<Value>,
}

impl Index {
    /// Creates an index from labels.
    pub fn new(name: Option<String>, values: Vec<Value>) -> Self {
        Self { name, values }
    }

    /// Logical type of the labels, defaulting to integers when all are null.
    pub fn data_type(&self) -> DataType {
        infer_type(self.values.iter()).unwrap_or(DataType::Int)
    }
}

/// Ordered named, typed columns plus positionally aligned rows.
///
/// The pipeline only ever borrows a dataset; staging never mutates it.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct TabularDataset {
    name: Option<String>,
    fields: Vec<Field>,
    index: Option<Index>,
    rows: Vec<Vec<Value>>,
}

impl TabularDataset {
    /// Creates an empty dataset with the given columns.
    pub fn new(fields: Vec<Field>) -> Result<Self, DatasetError> {
        check_unique(fields.iter().map(|f| f.name.as_str()))?;
        Ok(Self {
            name: None,
            fields,
            index: None,
            rows: Vec::new(),
        })
    }

    /// Builds a dataset from `(name, values)` columns, inferring each column
    /// type from its first non-null value. All-null columns become text.
    pub fn from_columns<I, S>(columns: I) -> Result<Self, DatasetError>
    where
        I: IntoIterator<Item = (S, Vec<Value>)>,
        S: Into<String>,
    {
        let columns: Vec<(String, Vec<Value>)> = columns
            .into_iter()
            .map(|(name, values)| (name.into(), values))
            .collect();
        let expected = columns.first().map_or(0, |(_, values)| values.len());
        let mut fields = Vec::with_capacity(columns.len());
        for (name, values) in &columns {
            if values.len() != expected {
                return Err(DatasetError::ColumnLength {
                    column: name.clone(),
                    expected,
                    found: values.len(),
                });
            }
            let data_type = infer_type(values.iter()).unwrap_or(DataType::Text);
            fields.push(Field::new(name.clone(), data_type));
        }
        let mut dataset = Self::new(fields)?;
        let mut iters: Vec<_> = columns
            .into_iter()
            .map(|(_, values)| values.into_iter())
            .collect();
        for _ in 0..expected {
            let row: Vec<Value> = iters
                .iter_mut()
                .map(|it| it.next().unwrap_or(Value::Null))
                .collect();
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    /// Assigns the default staging relation name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches row labels.
    pub fn with_index(mut self, index: Index) -> Result<Self, DatasetError> {
        if index.values.len() != self.rows.len() {
            return Err(DatasetError::IndexLength {
                expected: self.rows.len(),
                found: index.values.len(),
            });
        }
        self.index = Some(index);
        Ok(self)
    }

    /// Default staging relation name, if one was assigned.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Column descriptions in order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Explicit row labels, if any.
    pub fn index(&self) -> Option<&Index> {
        self.index.as_ref()
    }

    /// All rows in order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns, excluding the index.
    pub fn num_columns(&self) -> usize {
        self.fields.len()
    }

    /// Position of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Appends a row, checking arity and column types.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), DatasetError> {
        if row.len() != self.fields.len() {
            return Err(DatasetError::RowArity {
                expected: self.fields.len(),
                found: row.len(),
            });
        }
        for (value, field) in row.iter().zip(&self.fields) {
            if !value.fits(field.data_type) {
                return Err(DatasetError::TypeMismatch {
                    column: field.name.clone(),
                    expected: field.data_type,
                    found: value.data_type().unwrap_or(DataType::Text),
                });
            }
        }
        if let Some(index) = self.index.as_mut() {
            index.values.push(Value::Int(self.rows.len() as i64));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Moves a column out of the data and makes it the row index.
    pub fn set_index(&mut self, column: &str) -> Result<(), DatasetError> {
        let idx = self
            .column_index(column)
            .ok_or_else(|| DatasetError::UnknownColumn(column.to_string()))?;
        let field = self.fields.remove(idx);
        let values = self.rows.iter_mut().map(|row| row.remove(idx)).collect();
        self.index = Some(Index::new(Some(field.name), values));
        Ok(())
    }

    /// Builds a dataset from parts produced by an engine cursor, without
    /// re-validating every row.
    pub(crate) fn from_parts(fields: Vec<Field>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            name: None,
            fields,
            index: None,
            rows,
        }
    }

    /// Label of row `row`: the explicit index value, or the row position.
    pub fn index_value(&self, row: usize) -> Value {
        match &self.index {
            Some(index) => index.values.get(row).cloned().unwrap_or(Value::Null),
            None => Value::Int(row as i64),
        }
    }

    /// Column layout of the staged relation: the index column first when
    /// `include_index` is set, followed by every data column.
    pub fn staging_fields(&self, include_index: bool, index_label: Option<&str>) -> Vec<Field> {
        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        if include_index {
            let label = index_label
                .map(str::to_string)
                .or_else(|| self.index.as_ref().and_then(|i| i.name.clone()))
                .unwrap_or_else(|| DEFAULT_INDEX_LABEL.to_string());
            let data_type = self.index.as_ref().map_or(DataType::Int, Index::data_type);
            fields.push(Field::new(label, data_type));
        }
        fields.extend(self.fields.iter().cloned());
        fields
    }
}

pub(crate) fn infer_type<'a>(values: impl Iterator<Item = &'a Value>) -> Option<DataType> {
    let mut inferred = None;
    for value in values {
        match (inferred, value.data_type()) {
            (_, None) => {}
            (None, Some(ty)) => inferred = Some(ty),
            (Some(DataType::Int), Some(DataType::Float)) => inferred = Some(DataType::Float),
            _ => {}
        }
    }
    inferred
}

fn check_unique<'a>(names: impl Iterator<Item = &'a str>) -> Result<(), DatasetError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(DatasetError::DuplicateColumn(name.to_string()));
        }
    }
    Ok(())
}
