//! The SQL engine collaborator.
//!
//! The staging pipeline never talks to a database directly; it drives an
//! [`Engine`] that hands out one [`Connection`] per request. A connection can
//! run statements, stream query results into a [`RowVisitor`], answer
//! relation existence checks, drop relations, and (for engines with a native
//! bulk loader) open a [`BulkCopySink`].

use std::fmt;
use std::ops::ControlFlow;

use thiserror::Error;

use crate::dialect::Dialect;
use crate::encode::EncodeError;
use crate::table::{DataType, Value};

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sql;
pub mod sqlite;

pub use sql::{CopyFormat, PostgresSql, SqlDialect, SqliteSql};

/// Failure reported by an engine implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// SQLite driver error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// Postgres driver error.
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Postgres(#[from] ::postgres::Error),
    /// Encoding a copy payload failed.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// I/O on a copy channel failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The engine lacks a capability the pipeline asked for.
    #[error("{operation} is not supported by the {engine} engine")]
    Unsupported {
        /// Requested operation.
        operation: &'static str,
        /// Engine dialect name.
        engine: &'static str,
    },
    /// A value could not be converted between engine and dataset types.
    #[error("conversion failed: {0}")]
    Conversion(String),
    /// Free-form engine failure.
    #[error("{0}")]
    Message(String),
}

/// Possibly schema-qualified relation name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelationName {
    /// Unqualified relation name.
    pub name: String,
    /// Target schema; `None` means the engine's default namespace.
    pub schema: Option<String>,
}

impl RelationName {
    /// Creates a relation name.
    pub fn new(name: impl Into<String>, schema: Option<String>) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

impl fmt::Display for RelationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Column metadata reported alongside query results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Result column name.
    pub name: String,
    /// Declared or inferred type, when the engine knows it.
    pub data_type: Option<DataType>,
}

/// Receives a result set while the engine reads it.
pub trait RowVisitor {
    /// Called once with the result columns, before any row.
    fn columns(&mut self, columns: &[ColumnMeta]) -> ControlFlow<()>;

    /// Called for each row in order. [`ControlFlow::Break`] stops reading.
    fn row(&mut self, row: Vec<Value>) -> ControlFlow<()>;
}

/// Keeps every row of a result set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectRows {
    /// Result columns.
    pub columns: Vec<ColumnMeta>,
    /// Rows in read order.
    pub rows: Vec<Vec<Value>>,
}

impl RowVisitor for CollectRows {
    fn columns(&mut self, columns: &[ColumnMeta]) -> ControlFlow<()> {
        self.columns = columns.to_vec();
        ControlFlow::Continue(())
    }

    fn row(&mut self, row: Vec<Value>) -> ControlFlow<()> {
        self.rows.push(row);
        ControlFlow::Continue(())
    }
}

/// Write side of an engine's bulk-copy protocol.
///
/// Dropping a sink without calling [`finish`](BulkCopySink::finish) must
/// abort the copy.
pub trait BulkCopySink {
    /// Pushes one encoded chunk.
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), EngineError>;
    /// Completes the copy and returns the number of rows loaded.
    fn finish(self: Box<Self>) -> Result<u64, EngineError>;
}

/// A session with the engine. Temporary relations created on a connection
/// are visible to later statements on the same connection.
pub trait Connection {
    /// SQL text generator for this engine.
    fn sql(&self) -> &dyn SqlDialect;

    /// Runs a statement that returns no rows (DDL, DROP, INSERT, ...).
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, EngineError>;

    /// Runs a query, handing rows to `visitor` as they are read. Stops at the
    /// first row the visitor breaks on and returns the rows delivered.
    fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        visitor: &mut dyn RowVisitor,
    ) -> Result<u64, EngineError>;

    /// Whether `relation` exists and is visible to this connection.
    fn relation_exists(&mut self, relation: &RelationName) -> Result<bool, EngineError>;

    /// Drops `relation`.
    fn drop_relation(&mut self, relation: &RelationName) -> Result<(), EngineError> {
        let sql = self.sql().drop_table_sql(relation);
        self.execute(&sql, &[]).map(|_| ())
    }

    /// Opens the engine's bulk-copy channel into `relation`.
    fn open_bulk_copy(
        &mut self,
        relation: &RelationName,
        columns: &[String],
        format: &CopyFormat,
    ) -> Result<Box<dyn BulkCopySink + '_>, EngineError> {
        let _ = (relation, columns, format);
        Err(EngineError::Unsupported {
            operation: "bulk copy",
            engine: self.sql().name(),
        })
    }
}

/// Factory for connections to one database.
///
/// Engines are shared across threads; each request opens its own connection.
pub trait Engine: Send + Sync {
    /// Declared dialect, consulted by the strategy selector.
    fn dialect(&self) -> Dialect;

    /// Opens a new connection.
    fn connect(&self) -> Result<Box<dyn Connection>, EngineError>;
}

impl<E: Engine + ?Sized> Engine for &E {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn connect(&self) -> Result<Box<dyn Connection>, EngineError> {
        (**self).connect()
    }
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn connect(&self) -> Result<Box<dyn Connection>, EngineError> {
        (**self).connect()
    }
}
