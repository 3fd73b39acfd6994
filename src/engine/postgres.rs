//! PostgreSQL engine backed by the synchronous `postgres` client.
//!
//! This is the engine with a native bulk loader: staged datasets stream
//! through `COPY ... FROM STDIN` in CSV format.

use std::error::Error as StdError;
use std::io::Write;

use ::postgres::fallible_iterator::FallibleIterator;
use ::postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use ::postgres::{Client, CopyInWriter, NoTls, Row};
use bytes::BytesMut;
use rust_decimal::Decimal;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::debug;

use super::sql::{CopyFormat, PostgresSql};
use super::{
    BulkCopySink, ColumnMeta, Connection, Engine, EngineError, RelationName, RowVisitor, SqlDialect,
};
use crate::dialect::Dialect;
use crate::table::{DataType, Value};

/// Opens PostgreSQL connections from a libpq-style connection string.
#[derive(Clone, Debug)]
pub struct PostgresEngine {
    params: String,
}

impl PostgresEngine {
    /// Engine for `postgresql://...` URLs or `host=... user=...` strings.
    pub fn new(params: impl Into<String>) -> Self {
        Self {
            params: params.into(),
        }
    }
}

impl Engine for PostgresEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn connect(&self) -> Result<Box<dyn Connection>, EngineError> {
        let client = Client::connect(&self.params, NoTls)?;
        Ok(Box::new(PostgresConnection { client }))
    }
}

/// A single PostgreSQL session.
pub struct PostgresConnection {
    client: Client,
}

impl Connection for PostgresConnection {
    fn sql(&self) -> &dyn SqlDialect {
        &PostgresSql
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, EngineError> {
        if params.is_empty() {
            self.client.batch_execute(sql)?;
            return Ok(0);
        }
        let params: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        Ok(self.client.execute(sql, &params)?)
    }

    fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        visitor: &mut dyn RowVisitor,
    ) -> Result<u64, EngineError> {
        let statement = self.client.prepare(sql)?;
        let columns: Vec<ColumnMeta> = statement
            .columns()
            .iter()
            .map(|c| ColumnMeta {
                name: c.name().to_string(),
                data_type: logical_type(c.type_()),
            })
            .collect();
        if visitor.columns(&columns).is_break() {
            return Ok(0);
        }
        let mut rows = self
            .client
            .query_raw(&statement, params.iter().map(|v| v as &dyn ToSql))?;
        let mut delivered = 0u64;
        while let Some(row) = rows.next()? {
            delivered += 1;
            if visitor.row(read_row(&row)?).is_break() {
                break;
            }
        }
        debug!(rows = delivered, columns = columns.len(), "engine.postgres.query");
        Ok(delivered)
    }

    fn relation_exists(&mut self, relation: &RelationName) -> Result<bool, EngineError> {
        let qualified = PostgresSql.qualify(relation);
        let row = self
            .client
            .query_one("SELECT to_regclass($1) IS NOT NULL", &[&qualified])?;
        Ok(row.get(0))
    }

    fn open_bulk_copy(
        &mut self,
        relation: &RelationName,
        columns: &[String],
        format: &CopyFormat,
    ) -> Result<Box<dyn BulkCopySink + '_>, EngineError> {
        let sql = PostgresSql
            .copy_from_stdin_sql(relation, columns, format)
            .ok_or_else(|| EngineError::Message("copy statement unavailable".into()))?;
        debug!(%relation, sql = %sql, "engine.postgres.copy_in");
        let writer = self.client.copy_in(&sql)?;
        Ok(Box::new(CopySink { writer }))
    }
}

struct CopySink<'c> {
    writer: CopyInWriter<'c>,
}

impl BulkCopySink for CopySink<'_> {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), EngineError> {
        self.writer.write_all(chunk)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<u64, EngineError> {
        Ok(self.writer.finish()?)
    }
}

fn logical_type(ty: &Type) -> Option<DataType> {
    let mapped = if *ty == Type::BOOL {
        DataType::Bool
    } else if [Type::INT2, Type::INT4, Type::INT8, Type::OID].contains(ty) {
        DataType::Int
    } else if [Type::FLOAT4, Type::FLOAT8].contains(ty) {
        DataType::Float
    } else if *ty == Type::NUMERIC {
        DataType::Decimal
    } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN].contains(ty) {
        DataType::Text
    } else if *ty == Type::BYTEA {
        DataType::Bytes
    } else if *ty == Type::DATE {
        DataType::Date
    } else if [Type::TIMESTAMP, Type::TIMESTAMPTZ].contains(ty) {
        DataType::Timestamp
    } else {
        return None;
    };
    Some(mapped)
}

fn read_row(row: &Row) -> Result<Vec<Value>, EngineError> {
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)?.into()
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)?.map(i64::from).into()
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)?.map(i64::from).into()
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)?.into()
        } else if *ty == Type::OID {
            row.try_get::<_, Option<u32>>(idx)?.map(i64::from).into()
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)?.map(f64::from).into()
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx)?.into()
        } else if *ty == Type::NUMERIC {
            row.try_get::<_, Option<Decimal>>(idx)?
                .map_or(Value::Null, |d| Value::Decimal(d.to_string()))
        } else if *ty == Type::BYTEA {
            row.try_get::<_, Option<Vec<u8>>>(idx)?.into()
        } else if *ty == Type::DATE {
            row.try_get::<_, Option<time::Date>>(idx)?.into()
        } else if *ty == Type::TIMESTAMP {
            row.try_get::<_, Option<PrimitiveDateTime>>(idx)?.into()
        } else if *ty == Type::TIMESTAMPTZ {
            row.try_get::<_, Option<OffsetDateTime>>(idx)?
                .map(|ts| {
                    let utc = ts.to_offset(UtcOffset::UTC);
                    PrimitiveDateTime::new(utc.date(), utc.time())
                })
                .into()
        } else if logical_type(ty) == Some(DataType::Text) {
            row.try_get::<_, Option<String>>(idx)?.into()
        } else {
            return Err(EngineError::Conversion(format!(
                "column '{}' has unsupported type {}",
                column.name(),
                ty
            )));
        };
        values.push(value);
    }
    Ok(values)
}

type BoxError = Box<dyn StdError + Sync + Send>;

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::Int(v) => int_to_sql(*v, ty, out),
            Value::Float(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    Decimal::try_from(*v)?.to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::Text(v) => v.as_str().to_sql(ty, out),
            Value::Decimal(v) => {
                if *ty == Type::NUMERIC {
                    v.parse::<Decimal>()?.to_sql(ty, out)
                } else {
                    v.as_str().to_sql(ty, out)
                }
            }
            Value::Bytes(v) => v.as_slice().to_sql(ty, out),
            Value::Date(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => {
                if *ty == Type::TIMESTAMPTZ {
                    v.assume_utc().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn int_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::INT2 {
        i16::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        (v as f64).to_sql(ty, out)
    } else if *ty == Type::FLOAT4 {
        (v as f32).to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        Decimal::from(v).to_sql(ty, out)
    } else {
        v.to_sql(ty, out)
    }
}
