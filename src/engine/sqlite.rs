//! SQLite engine backed by `rusqlite`.
//!
//! SQLite has no bulk-copy protocol, so datasets staged here always take the
//! row-wise path. Each connection owns a private `temp` schema, which makes
//! `schema = "temp"` the way to keep staged relations connection-local.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, OpenFlags, OptionalExtension, ToSql};
use tracing::debug;

use super::{ColumnMeta, Connection, Engine, EngineError, RelationName, RowVisitor, SqlDialect};
use super::sql::SqliteSql;
use crate::dialect::Dialect;
use crate::table::temporal::{format_date, format_timestamp, parse_date, parse_timestamp};
use crate::table::{DataType, Value};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
enum Target {
    File(PathBuf),
    SharedMemory(String),
}

/// Opens SQLite connections to one database.
#[derive(Clone, Debug)]
pub struct SqliteEngine {
    target: Target,
    busy_timeout: Duration,
}

impl SqliteEngine {
    /// Engine over a database file, created on first connect if missing.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            target: Target::File(path.as_ref().to_path_buf()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Engine over a named in-memory database shared by all its connections.
    /// The database lives as long as at least one connection is open.
    pub fn shared_memory(name: impl Into<String>) -> Self {
        Self {
            target: Target::SharedMemory(name.into()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// How long a connection waits on a locked database before failing.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Opens a raw `rusqlite` connection with this engine's settings.
    pub fn open_raw(&self) -> rusqlite::Result<rusqlite::Connection> {
        let conn = match &self.target {
            Target::File(path) => rusqlite::Connection::open(path)?,
            Target::SharedMemory(name) => rusqlite::Connection::open_with_flags(
                format!("file:{name}?mode=memory&cache=shared"),
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI,
            )?,
        };
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}

impl Engine for SqliteEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn connect(&self) -> Result<Box<dyn Connection>, EngineError> {
        Ok(Box::new(SqliteConnection::new(self.open_raw()?)))
    }
}

/// A single SQLite connection.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Wraps an open `rusqlite` connection.
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// The underlying `rusqlite` connection.
    pub fn raw(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl Connection for SqliteConnection {
    fn sql(&self) -> &dyn SqlDialect {
        &SqliteSql
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, EngineError> {
        let mut stmt = self.conn.prepare(sql)?;
        let changed = stmt.execute(params_from_iter(params.iter()))?;
        Ok(changed as u64)
    }

    fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        visitor: &mut dyn RowVisitor,
    ) -> Result<u64, EngineError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<ColumnMeta> = stmt
            .columns()
            .iter()
            .map(|c| ColumnMeta {
                name: c.name().to_string(),
                data_type: c.decl_type().and_then(DataType::from_sql_decl),
            })
            .collect();
        if visitor.columns(&columns).is_break() {
            return Ok(0);
        }
        let hints: Vec<Option<DataType>> = columns.iter().map(|c| c.data_type).collect();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut delivered = 0u64;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(hints.len());
            for (idx, hint) in hints.iter().enumerate() {
                values.push(read_value(row.get_ref(idx)?, *hint)?);
            }
            delivered += 1;
            if visitor.row(values).is_break() {
                break;
            }
        }
        debug!(rows = delivered, columns = columns.len(), "engine.sqlite.query");
        Ok(delivered)
    }

    fn relation_exists(&mut self, relation: &RelationName) -> Result<bool, EngineError> {
        let schema = relation.schema.as_deref().unwrap_or("main");
        let sql = format!(
            "SELECT 1 FROM {}.sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            SqliteSql.quote_identifier(schema)
        );
        let found: Option<i64> = self
            .conn
            .query_row(&sql, [&relation.name], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Bool(v) => ToSqlOutput::Owned(Sql::Integer(i64::from(*v))),
            Value::Int(v) => ToSqlOutput::Owned(Sql::Integer(*v)),
            Value::Float(v) => ToSqlOutput::Owned(Sql::Real(*v)),
            Value::Text(v) | Value::Decimal(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Bytes(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
            Value::Date(v) => ToSqlOutput::Owned(Sql::Text(format_date(*v))),
            Value::Timestamp(v) => ToSqlOutput::Owned(Sql::Text(format_timestamp(*v))),
        })
    }
}

/// Converts a stored SQLite value using the column's declared type as a hint.
pub fn read_value(value: ValueRef<'_>, hint: Option<DataType>) -> Result<Value, EngineError> {
    Ok(match (value, hint) {
        (ValueRef::Null, _) => Value::Null,
        (ValueRef::Integer(v), Some(DataType::Bool)) => Value::Bool(v != 0),
        (ValueRef::Integer(v), Some(DataType::Float)) => Value::Float(v as f64),
        (ValueRef::Integer(v), Some(DataType::Decimal)) => Value::Decimal(v.to_string()),
        (ValueRef::Integer(v), _) => Value::Int(v),
        (ValueRef::Real(v), Some(DataType::Decimal)) => Value::Decimal(v.to_string()),
        (ValueRef::Real(v), _) => Value::Float(v),
        (ValueRef::Blob(v), _) => Value::Bytes(v.to_vec()),
        (ValueRef::Text(raw), hint) => {
            let text = std::str::from_utf8(raw)
                .map_err(|err| EngineError::Conversion(format!("non UTF-8 text: {err}")))?;
            match hint {
                Some(DataType::Date) => parse_date(text)
                    .map(Value::Date)
                    .unwrap_or_else(|| Value::Text(text.to_string())),
                Some(DataType::Timestamp) => parse_timestamp(text)
                    .map(Value::Timestamp)
                    .unwrap_or_else(|| Value::Text(text.to_string())),
                Some(DataType::Decimal) => Value::Decimal(text.to_string()),
                _ => Value::Text(text.to_string()),
            }
        }
    })
}
