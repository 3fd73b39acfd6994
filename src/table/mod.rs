//! In-memory tabular data: the datasets callers stage and the results
//! queries return.

mod csv_io;
mod dataset;
mod schema;
pub mod temporal;
mod value;

pub use csv_io::CsvLoadError;
pub use dataset::{DatasetError, Index, TabularDataset, DEFAULT_INDEX_LABEL};
pub(crate) use dataset::infer_type;
pub use schema::{DataType, Field};
pub use value::Value;
