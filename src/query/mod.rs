//! Query orchestration over staged datasets.
//!
//! A [`QueryRequest`] names datasets, parameters and options. [`run`] stages
//! each dataset on one connection, executes the statement, shapes the rows
//! into a [`QueryResult`], and drops what it staged. [`insert`] is the
//! load-only variant that appends into existing relations.

mod options;
mod orchestrator;
mod request;
mod result;

pub use options::QueryOptions;
pub use orchestrator::{insert, insert_with_options, run, run_streaming};
pub use request::{Argument, QueryRequest};
pub use result::QueryResult;
