//! Stage in-memory datasets as relations in a SQL engine, query them, and
//! clean up afterwards.
//!
//! ```no_run
//! use sqlstage::{run, QueryRequest, SqliteEngine, TabularDataset, Value};
//!
//! let t = TabularDataset::from_columns([
//!     ("a", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
//!     ("b", vec!["x".into(), "y".into(), "z".into()]),
//! ])?
//! .with_name("t");
//! let engine = SqliteEngine::open("warehouse.db");
//! let result = run(&engine, &QueryRequest::new("select sum(a) as total from t").dataset(&t))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Engines with a native bulk loader (PostgreSQL, behind the `postgres`
//! feature) receive rows through a streaming CSV copy; every other engine
//! gets batched multi-row `INSERT`s inside one transaction.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dialect;
pub mod encode;
pub mod engine;
mod error;
pub mod logging;
pub mod query;
pub mod stage;
pub mod table;

pub use dialect::{select, Dialect, LoadStrategy, StrategyProfile};
pub use encode::{CsvChunkEncoder, EncoderConfig};
#[cfg(feature = "postgres")]
pub use engine::postgres::PostgresEngine;
pub use engine::sqlite::SqliteEngine;
pub use engine::{Connection, Engine, EngineError, RelationName};
pub use error::{Result, RunError, StageError};
pub use query::{
    insert, insert_with_options, run, run_streaming, Argument, QueryOptions, QueryRequest,
    QueryResult,
};
pub use stage::{ExistencePolicy, SchemaTarget, StagingSession, StagingSpec};
pub use table::{DataType, Field, Index, TabularDataset, Value};
