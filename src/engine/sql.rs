//! Dialect-specific SQL text: identifier quoting, staging DDL, row-wise
//! inserts and the copy statement.

use std::fmt::Write as _;

use super::RelationName;
use crate::table::{DataType, Field};

/// Shape of the delimited payload pushed through a bulk-copy channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyFormat {
    /// Field delimiter.
    pub delimiter: u8,
    /// Text that encodes a null cell.
    pub null_marker: String,
}

impl Default for CopyFormat {
    fn default() -> Self {
        Self {
            delimiter: b',',
            null_marker: "\\N".to_string(),
        }
    }
}

/// SQL generator for one engine family.
pub trait SqlDialect: Send + Sync {
    /// Dialect name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Column type used when staging a column of `ty`.
    fn column_type(&self, ty: DataType) -> &'static str;

    /// Bind placeholder for the 1-based parameter `ordinal`.
    fn placeholder(&self, ordinal: usize) -> String;

    /// Upper bound on bind parameters per statement.
    fn max_bind_params(&self) -> usize;

    /// Quotes an identifier, doubling embedded quotes.
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Schema-qualified, quoted relation name.
    fn qualify(&self, relation: &RelationName) -> String {
        match &relation.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(&relation.name)
            ),
            None => self.quote_identifier(&relation.name),
        }
    }

    /// `CREATE TABLE` for a staged relation.
    fn create_table_sql(&self, relation: &RelationName, fields: &[Field]) -> String {
        let columns: Vec<String> = fields
            .iter()
            .map(|f| {
                format!(
                    "{} {}",
                    self.quote_identifier(&f.name),
                    self.column_type(f.data_type)
                )
            })
            .collect();
        format!("CREATE TABLE {} ({})", self.qualify(relation), columns.join(", "))
    }

    /// `DROP TABLE` for a staged relation.
    fn drop_table_sql(&self, relation: &RelationName) -> String {
        format!("DROP TABLE {}", self.qualify(relation))
    }

    /// Multi-row `INSERT` with `rows` groups of placeholders.
    fn insert_sql(&self, relation: &RelationName, columns: &[String], rows: usize) -> String {
        let mut sql = format!("INSERT INTO {}", self.qualify(relation));
        if !columns.is_empty() {
            let quoted: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
            let _ = write!(sql, " ({})", quoted.join(", "));
        }
        sql.push_str(" VALUES ");
        let mut ordinal = 1;
        for row in 0..rows {
            if row > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for col in 0..columns.len() {
                if col > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&self.placeholder(ordinal));
                ordinal += 1;
            }
            sql.push(')');
        }
        sql
    }

    /// Statement that opens the bulk-copy channel, if the engine has one.
    fn copy_from_stdin_sql(
        &self,
        relation: &RelationName,
        columns: &[String],
        format: &CopyFormat,
    ) -> Option<String> {
        let _ = (relation, columns, format);
        None
    }

    /// Statement that drops every temporary relation of the session.
    fn reset_temporaries_sql(&self) -> Option<&'static str> {
        None
    }
}

/// PostgreSQL text generation.
#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresSql;

impl SqlDialect for PostgresSql {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn column_type(&self, ty: DataType) -> &'static str {
        match ty {
            DataType::Bool => "BOOLEAN",
            DataType::Int => "BIGINT",
            DataType::Float => "DOUBLE PRECISION",
            DataType::Text => "TEXT",
            DataType::Bytes => "BYTEA",
            DataType::Date => "DATE",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Decimal => "NUMERIC",
        }
    }

    fn placeholder(&self, ordinal: usize) -> String {
        format!("${ordinal}")
    }

    fn max_bind_params(&self) -> usize {
        u16::MAX as usize
    }

    fn copy_from_stdin_sql(
        &self,
        relation: &RelationName,
        columns: &[String],
        format: &CopyFormat,
    ) -> Option<String> {
        let mut sql = format!("COPY {}", self.qualify(relation));
        let quoted: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        if !quoted.is_empty() {
            let _ = write!(sql, " ({})", quoted.join(", "));
        }
        let _ = write!(
            sql,
            " FROM STDIN WITH (FORMAT csv, DELIMITER {}, NULL {}",
            quote_literal(&char::from(format.delimiter).to_string()),
            quote_literal(&format.null_marker)
        );
        sql.push(')');
        Some(sql)
    }

    fn reset_temporaries_sql(&self) -> Option<&'static str> {
        Some("DISCARD TEMP")
    }
}

/// SQLite text generation.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqliteSql;

impl SqlDialect for SqliteSql {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn column_type(&self, ty: DataType) -> &'static str {
        match ty {
            DataType::Bool => "BOOLEAN",
            DataType::Int => "INTEGER",
            DataType::Float => "REAL",
            DataType::Text => "TEXT",
            DataType::Bytes => "BLOB",
            DataType::Date => "DATE",
            DataType::Timestamp => "TIMESTAMP",
            // TEXT affinity keeps the digits exactly as staged.
            DataType::Decimal => "DECIMAL_TEXT",
        }
    }

    fn placeholder(&self, ordinal: usize) -> String {
        format!("?{ordinal}")
    }

    fn max_bind_params(&self) -> usize {
        32_766
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
