//! Load strategy selection from an engine's declared dialect.

use std::fmt;
use std::str::FromStr;

/// Engine families the pipeline knows how to stage into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// PostgreSQL and wire-compatible engines with `COPY ... FROM STDIN`.
    Postgres,
    /// SQLite.
    Sqlite,
    /// Any other engine; staged through plain `INSERT` statements.
    Generic,
}

impl Dialect {
    /// Maps an engine dialect name onto a known family. Unrecognized names
    /// map to [`Dialect::Generic`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "psql" | "pg" => Dialect::Postgres,
            "sqlite" | "sqlite3" => Dialect::Sqlite,
            _ => Dialect::Generic,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgresql",
            Dialect::Sqlite => "sqlite",
            Dialect::Generic => "generic",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Dialect::from_name(s))
    }
}

/// How rows reach a staged relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Stream encoded chunks through the engine's bulk-copy channel.
    FastPath,
    /// Batched multi-row `INSERT` statements inside one transaction.
    Fallback,
}

impl LoadStrategy {
    /// Name used in log events.
    pub fn as_str(self) -> &'static str {
        match self {
            LoadStrategy::FastPath => "fast_path",
            LoadStrategy::Fallback => "fallback",
        }
    }
}

/// What the pipeline may assume about an engine family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrategyProfile {
    /// The engine exposes a bulk-copy channel.
    pub fast_path_available: bool,
    /// Schema used when the caller names none.
    pub default_staging_schema: Option<&'static str>,
    /// Schema private to one connection, if the engine has one.
    pub session_schema: Option<&'static str>,
}

impl StrategyProfile {
    /// Strategy for a load, given whether the caller allows the fast path.
    pub fn strategy(&self, allow_fast_path: bool) -> LoadStrategy {
        if self.fast_path_available && allow_fast_path {
            LoadStrategy::FastPath
        } else {
            LoadStrategy::Fallback
        }
    }
}

/// Capabilities of `dialect`.
pub fn select(dialect: Dialect) -> StrategyProfile {
    match dialect {
        Dialect::Postgres => StrategyProfile {
            fast_path_available: true,
            default_staging_schema: Some("pg_temp"),
            session_schema: Some("pg_temp"),
        },
        Dialect::Sqlite => StrategyProfile {
            fast_path_available: false,
            default_staging_schema: None,
            session_schema: Some("temp"),
        },
        Dialect::Generic => StrategyProfile {
            fast_path_available: false,
            default_staging_schema: None,
            session_schema: None,
        },
    }
}
