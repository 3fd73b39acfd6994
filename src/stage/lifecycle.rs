//! Create, load, and drop one staged relation.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::dialect::LoadStrategy;
use crate::encode::{CsvChunkEncoder, EncoderConfig, DEFAULT_CHUNK_ROWS};
use crate::engine::{Connection, CopyFormat, EngineError, RelationName};
use crate::error::{Result, StageError};
use crate::table::{Field, TabularDataset, Value};

use super::spec::{ExistencePolicy, StagingSpec};

/// Default rows per `INSERT` statement on the row-wise path.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

/// A relation prepared for loading.
#[derive(Clone, Debug, PartialEq)]
pub struct StagedRelation {
    /// Where the rows go.
    pub relation: RelationName,
    /// Column layout, index column first when materialized.
    pub fields: Vec<Field>,
    /// Whether the dataset index is loaded as the leading column.
    pub include_index: bool,
    /// Label of the index column, when materialized.
    pub index_label: Option<String>,
    /// Created by this request, as opposed to appended into.
    pub created: bool,
    /// Lives in the connection-private namespace.
    pub session_temporary: bool,
}

impl StagedRelation {
    /// Column names in load order.
    pub fn columns(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// Tuning for [`load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadOptions {
    /// Upper bound on rows per `INSERT` on the row-wise path.
    pub batch_size: usize,
    /// Rows per encoded chunk on the bulk-copy path.
    pub copy_chunk_rows: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            copy_chunk_rows: DEFAULT_CHUNK_ROWS,
        }
    }
}

/// Makes `spec.relation` ready to receive `dataset`, applying the existence
/// policy. The existing relation is left untouched on every error path.
pub fn stage(
    conn: &mut dyn Connection,
    dataset: &TabularDataset,
    spec: &StagingSpec,
) -> Result<StagedRelation> {
    let relation = &spec.relation;
    let fields = dataset.staging_fields(spec.index, spec.index_label.as_deref());
    if fields.is_empty() {
        return Err(StageError::invalid(format!(
            "dataset staged as {relation} has no columns"
        )));
    }

    let exists = conn
        .relation_exists(relation)
        .map_err(|err| StageError::staging(relation, err))?;
    let created = match (exists, spec.existence) {
        (true, ExistencePolicy::Fail) => {
            return Err(StageError::RelationExists {
                relation: relation.clone(),
            })
        }
        (true, ExistencePolicy::Append) => false,
        (true, ExistencePolicy::Replace) => {
            conn.drop_relation(relation)
                .map_err(|err| StageError::staging(relation, err))?;
            debug!(%relation, "stage.relation.replaced");
            create(conn, relation, &fields)?;
            true
        }
        (false, _) if !spec.create => {
            return Err(StageError::RelationMissing {
                relation: relation.clone(),
            })
        }
        (false, _) => {
            create(conn, relation, &fields)?;
            true
        }
    };

    info!(
        %relation,
        columns = fields.len(),
        created,
        policy = %spec.existence,
        "stage.relation.ready"
    );
    Ok(StagedRelation {
        relation: relation.clone(),
        fields,
        include_index: spec.index,
        index_label: spec.index_label.clone(),
        created,
        session_temporary: spec.session_temporary,
    })
}

fn create(conn: &mut dyn Connection, relation: &RelationName, fields: &[Field]) -> Result<()> {
    let sql = conn.sql().create_table_sql(relation, fields);
    conn.execute(&sql, &[])
        .map_err(|err| StageError::staging(relation, err))?;
    debug!(%relation, "stage.relation.created");
    Ok(())
}

/// Loads every row of `dataset` into `staged`. Returns the rows written.
pub fn load(
    conn: &mut dyn Connection,
    staged: &StagedRelation,
    dataset: &TabularDataset,
    strategy: LoadStrategy,
    options: &LoadOptions,
) -> Result<u64> {
    let relation = &staged.relation;
    if dataset.num_rows() == 0 {
        debug!(%relation, "stage.load.empty");
        return Ok(0);
    }
    let started = Instant::now();
    let rows = match strategy {
        LoadStrategy::FastPath => copy_rows(conn, staged, dataset, options),
        LoadStrategy::Fallback => insert_rows(conn, staged, dataset, options),
    }
    .map_err(|err| StageError::staging(relation, err))?;
    info!(
        %relation,
        rows,
        strategy = strategy.as_str(),
        duration_ms = started.elapsed().as_secs_f64() * 1000.0,
        "stage.load.completed"
    );
    Ok(rows)
}

fn copy_rows(
    conn: &mut dyn Connection,
    staged: &StagedRelation,
    dataset: &TabularDataset,
    options: &LoadOptions,
) -> std::result::Result<u64, EngineError> {
    let format = CopyFormat::default();
    let encoder = CsvChunkEncoder::new(
        dataset,
        EncoderConfig {
            delimiter: format.delimiter,
            chunk_rows: options.copy_chunk_rows,
            include_index: staged.include_index,
            index_label: staged.index_label.clone(),
            null_marker: format.null_marker.clone(),
            header: false,
        },
    );
    let mut sink = conn.open_bulk_copy(&staged.relation, &staged.columns(), &format)?;
    let mut chunks = 0usize;
    for chunk in encoder {
        sink.write_chunk(&chunk?)?;
        chunks += 1;
    }
    debug!(relation = %staged.relation, chunks, "stage.load.copy_flushed");
    sink.finish()
}

fn insert_rows(
    conn: &mut dyn Connection,
    staged: &StagedRelation,
    dataset: &TabularDataset,
    options: &LoadOptions,
) -> std::result::Result<u64, EngineError> {
    let columns = staged.columns();
    let per_statement = rows_per_statement(
        options.batch_size,
        conn.sql().max_bind_params(),
        columns.len(),
    );
    let full_sql = conn.sql().insert_sql(&staged.relation, &columns, per_statement);

    conn.execute("BEGIN", &[])?;
    let result = insert_batches(conn, staged, dataset, &columns, per_statement, &full_sql);
    match result {
        Ok(written) => {
            conn.execute("COMMIT", &[])?;
            Ok(written)
        }
        Err(err) => {
            if let Err(rollback) = conn.execute("ROLLBACK", &[]) {
                warn!(
                    relation = %staged.relation,
                    error = %rollback,
                    "stage.load.rollback_failed"
                );
            }
            Err(err)
        }
    }
}

fn insert_batches(
    conn: &mut dyn Connection,
    staged: &StagedRelation,
    dataset: &TabularDataset,
    columns: &[String],
    per_statement: usize,
    full_sql: &str,
) -> std::result::Result<u64, EngineError> {
    let mut written = 0u64;
    let mut params: Vec<Value> = Vec::with_capacity(per_statement * columns.len());
    let rows = dataset.rows();
    let mut start = 0;
    while start < rows.len() {
        let end = (start + per_statement).min(rows.len());
        params.clear();
        for (offset, row) in rows[start..end].iter().enumerate() {
            if staged.include_index {
                params.push(dataset.index_value(start + offset));
            }
            params.extend(row.iter().cloned());
        }
        let count = end - start;
        if count == per_statement {
            conn.execute(full_sql, &params)?;
        } else {
            let sql = conn.sql().insert_sql(&staged.relation, columns, count);
            conn.execute(&sql, &params)?;
        }
        written += count as u64;
        start = end;
    }
    Ok(written)
}

/// Rows per `INSERT`, bounded by the batch size and the bind-parameter limit.
pub(crate) fn rows_per_statement(batch_size: usize, max_params: usize, columns: usize) -> usize {
    let by_params = max_params / columns.max(1);
    batch_size.min(by_params).max(1)
}

/// Drops `staged` unless `keep` is set or the relation predates the
/// request. Returns whether a drop was issued.
pub fn teardown(conn: &mut dyn Connection, staged: &StagedRelation, keep: bool) -> Result<bool> {
    let relation = &staged.relation;
    if keep || !staged.created {
        debug!(%relation, keep, created = staged.created, "stage.teardown.skipped");
        return Ok(false);
    }
    match conn.drop_relation(relation) {
        Ok(()) => {
            debug!(%relation, "stage.teardown.dropped");
            Ok(true)
        }
        Err(source) => {
            warn!(%relation, error = %source, "stage.teardown.failed");
            Err(StageError::TeardownFailure {
                relation: relation.clone(),
                source,
            })
        }
    }
}
