//! Request options: how datasets are staged and loaded, and how results are
//! shaped. Deserializable so the config file can supply defaults.

use serde::{Deserialize, Serialize};

use crate::encode::DEFAULT_CHUNK_ROWS;
use crate::error::{Result, StageError};
use crate::stage::{ExistencePolicy, LoadOptions, SchemaTarget, DEFAULT_BATCH_SIZE};

/// Per-request staging and result-shaping options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryOptions {
    /// Materialize each dataset's index as the leading staged column.
    pub index: bool,
    /// Label of the materialized index column.
    pub index_label: Option<String>,
    /// Result column that becomes the result index.
    pub index_column: Option<String>,
    /// Convert decimal result columns to floats.
    pub coerce_float: bool,
    /// Result columns parsed into timestamps.
    pub parse_dates: Vec<String>,
    /// Split the result into chunks of this many rows.
    pub chunk_size: Option<usize>,
    /// Where staged relations are created.
    pub schema: Option<SchemaTarget>,
    /// Behavior when a staged relation already exists.
    pub existence_policy: ExistencePolicy,
    /// Leave staged relations in place after the request.
    pub keep: bool,
    /// Allow staging to create missing relations.
    pub create: bool,
    /// Upper bound on rows per `INSERT` on the row-wise path.
    pub batch_size: usize,
    /// Rows per encoded chunk on the bulk-copy path.
    pub copy_chunk_rows: usize,
    /// Use the bulk-copy path when the engine offers one.
    pub fast_path: bool,
    /// Discard all temporary relations of the connection before staging
    /// into the session-temporary schema.
    pub reset_temporaries: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            index: false,
            index_label: None,
            index_column: None,
            coerce_float: true,
            parse_dates: Vec::new(),
            chunk_size: None,
            schema: None,
            existence_policy: ExistencePolicy::Fail,
            keep: false,
            create: true,
            batch_size: DEFAULT_BATCH_SIZE,
            copy_chunk_rows: DEFAULT_CHUNK_ROWS,
            fast_path: true,
            reset_temporaries: false,
        }
    }
}

impl QueryOptions {
    /// Rejects values no request can honor.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == Some(0) {
            return Err(StageError::invalid("chunk_size must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(StageError::invalid("batch_size must be at least 1"));
        }
        if self.copy_chunk_rows == 0 {
            return Err(StageError::invalid("copy_chunk_rows must be at least 1"));
        }
        if matches!(&self.index_label, Some(label) if label.is_empty()) {
            return Err(StageError::invalid("index_label cannot be empty"));
        }
        Ok(())
    }

    /// Load tuning derived from these options.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            batch_size: self.batch_size,
            copy_chunk_rows: self.copy_chunk_rows,
        }
    }
}
