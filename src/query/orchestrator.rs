//! Request driver: plan, stage, load, execute, shape, tear down.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::time::Instant;

use tracing::{debug, info};

use crate::dialect::{select, Dialect, LoadStrategy};
use crate::encode::DEFAULT_CHUNK_ROWS;
use crate::engine::{ColumnMeta, Engine, RelationName, RowVisitor};
use crate::error::{RunError, StageError};
use crate::stage::{ExistencePolicy, SchemaTarget, StagingSession, StagingSpec};
use crate::table::{TabularDataset, Value};

use super::options::QueryOptions;
use super::request::{Argument, QueryRequest};
use super::result::{QueryResult, ResultShaper};

struct PlannedDataset<'a> {
    dataset: &'a TabularDataset,
    spec: StagingSpec,
}

struct Plan<'a> {
    datasets: Vec<PlannedDataset<'a>>,
    strategy: LoadStrategy,
    reset_temporaries: bool,
}

/// Validates the request and resolves every staging target without
/// touching the engine.
fn plan<'a>(dialect: Dialect, request: &QueryRequest<'a>) -> Result<Plan<'a>, StageError> {
    let options = request.current_options();
    options.validate()?;
    let profile = select(dialect);
    let (schema, session_temporary) = SchemaTarget::resolve(options.schema.as_ref(), &profile)?;

    let mut seen = HashSet::new();
    let mut datasets = Vec::with_capacity(request.num_datasets());
    for (position, queued) in request.queued().iter().enumerate() {
        let name = match queued.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => {
                return Err(StageError::invalid(format!(
                    "dataset at position {position} has no name; name it or pass it by name"
                )))
            }
        };
        let relation = RelationName::new(name, schema.clone());
        if !seen.insert(relation.clone()) && options.existence_policy != ExistencePolicy::Append {
            return Err(StageError::invalid(format!(
                "relation {relation} is staged more than once"
            )));
        }
        datasets.push(PlannedDataset {
            dataset: queued.dataset,
            spec: StagingSpec {
                relation,
                existence: options.existence_policy,
                create: options.create,
                index: options.index,
                index_label: options.index_label.clone(),
                session_temporary,
            },
        });
    }

    Ok(Plan {
        reset_temporaries: options.reset_temporaries && session_temporary && !datasets.is_empty(),
        strategy: profile.strategy(options.fast_path),
        datasets,
    })
}

/// Runs `body` on a session holding every staged dataset, then tears the
/// session down. Teardown failures ride along with the primary error, or
/// become the error when the request itself succeeded.
fn drive<'a, T>(
    engine: &dyn Engine,
    request: &QueryRequest<'a>,
    body: impl FnOnce(&mut StagingSession) -> Result<T, StageError>,
) -> Result<T, RunError> {
    let plan = plan(engine.dialect(), request)?;
    let options = request.current_options();
    let mut session = StagingSession::open(engine, options.keep)?;

    let outcome = stage_all(&mut session, &plan, options).and_then(|()| body(&mut session));
    let failures = session.close();
    match outcome {
        Ok(value) => match RunError::from_teardown(failures) {
            Some(err) => Err(err),
            None => Ok(value),
        },
        Err(primary) => Err(RunError::new(primary, failures)),
    }
}

/// Every dataset is staged before any is loaded, so a policy failure on a
/// later dataset leaves no rows written.
fn stage_all(
    session: &mut StagingSession,
    plan: &Plan<'_>,
    options: &QueryOptions,
) -> Result<(), StageError> {
    if plan.reset_temporaries {
        if let Some(first) = plan.datasets.first() {
            session.reset_temporaries(&first.spec.relation)?;
        }
    }
    let mut positions = Vec::with_capacity(plan.datasets.len());
    for planned in &plan.datasets {
        positions.push(session.stage(planned.dataset, &planned.spec)?);
    }
    let load_options = options.load_options();
    for (planned, position) in plan.datasets.iter().zip(positions) {
        session.load(position, planned.dataset, plan.strategy, &load_options)?;
    }
    Ok(())
}

/// Buffers rows into shaped chunks and hands each one to `emit` as soon as
/// it fills.
struct ChunkVisitor<'o, F> {
    options: &'o QueryOptions,
    chunk_rows: Option<usize>,
    emit: F,
    shaper: Option<ResultShaper<'o>>,
    buffer: Vec<Vec<Value>>,
    rows: usize,
    emitted: bool,
    stopped: bool,
    failure: Option<StageError>,
}

impl<F> ChunkVisitor<'_, F>
where
    F: FnMut(TabularDataset) -> ControlFlow<()>,
{
    fn flush(&mut self) {
        let Some(shaper) = &self.shaper else {
            return;
        };
        match shaper.shape(std::mem::take(&mut self.buffer)) {
            Ok(chunk) => {
                self.emitted = true;
                self.stopped = (self.emit)(chunk).is_break();
            }
            Err(err) => self.failure = Some(err),
        }
    }

    fn flow(&self) -> ControlFlow<()> {
        if self.stopped || self.failure.is_some() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

impl<F> RowVisitor for ChunkVisitor<'_, F>
where
    F: FnMut(TabularDataset) -> ControlFlow<()>,
{
    fn columns(&mut self, columns: &[ColumnMeta]) -> ControlFlow<()> {
        match ResultShaper::new(columns.to_vec(), self.options) {
            Ok(shaper) => self.shaper = Some(shaper),
            Err(err) => self.failure = Some(err),
        }
        self.flow()
    }

    fn row(&mut self, row: Vec<Value>) -> ControlFlow<()> {
        self.buffer.push(row);
        self.rows += 1;
        if self.chunk_rows.is_some_and(|limit| self.buffer.len() >= limit) {
            self.flush();
        }
        self.flow()
    }
}

/// Executes the request statement and hands shaped chunks of `chunk_rows`
/// rows to `emit` while rows are still being read. A result without rows is
/// emitted once, empty.
fn fetch(
    session: &mut StagingSession,
    sql: &str,
    params: &[Value],
    options: &QueryOptions,
    chunk_rows: Option<usize>,
    emit: impl FnMut(TabularDataset) -> ControlFlow<()>,
) -> Result<(), StageError> {
    let started = Instant::now();
    info!(params = params.len(), "query.execute");
    let mut visitor = ChunkVisitor {
        options,
        chunk_rows,
        emit,
        shaper: None,
        buffer: Vec::new(),
        rows: 0,
        emitted: false,
        stopped: false,
        failure: None,
    };
    let read = session.connection().query(sql, params, &mut visitor);
    if let Some(err) = visitor.failure.take() {
        return Err(err);
    }
    read.map_err(StageError::query)?;

    if !visitor.stopped && (!visitor.buffer.is_empty() || !visitor.emitted) {
        visitor.flush();
        if let Some(err) = visitor.failure.take() {
            return Err(err);
        }
    }
    if visitor.stopped {
        debug!(rows = visitor.rows, "query.stream.stopped");
    }
    info!(
        rows = visitor.rows,
        stopped = visitor.stopped,
        duration_ms = started.elapsed().as_secs_f64() * 1000.0,
        "query.completed"
    );
    Ok(())
}

/// Stages every dataset of `request`, runs its statement, and returns the
/// shaped result. Staged relations are dropped before returning unless
/// `keep` is set.
pub fn run(engine: &dyn Engine, request: &QueryRequest<'_>) -> Result<QueryResult, RunError> {
    drive(engine, request, |session| {
        let Some(sql) = request.sql() else {
            return Ok(QueryResult::NoResult);
        };
        let options = request.current_options();
        let mut chunks = Vec::new();
        fetch(
            session,
            sql,
            request.bound_params(),
            options,
            options.chunk_size,
            |chunk| {
                chunks.push(chunk);
                ControlFlow::Continue(())
            },
        )?;
        Ok(match options.chunk_size {
            Some(_) => QueryResult::Chunks(chunks),
            None => QueryResult::Dataset(chunks.pop().unwrap_or_default()),
        })
    })
}

/// Like [`run`], but hands result chunks to `on_chunk` while the connection
/// is still open. Returning [`ControlFlow::Break`] stops reading. Chunks hold
/// `chunk_size` rows, or a default when the option is unset.
pub fn run_streaming(
    engine: &dyn Engine,
    request: &QueryRequest<'_>,
    on_chunk: impl FnMut(TabularDataset) -> ControlFlow<()>,
) -> Result<(), RunError> {
    drive(engine, request, |session| {
        let Some(sql) = request.sql() else {
            return Ok(());
        };
        let options = request.current_options();
        let chunk_rows = options.chunk_size.unwrap_or(DEFAULT_CHUNK_ROWS);
        fetch(
            session,
            sql,
            request.bound_params(),
            options,
            Some(chunk_rows),
            on_chunk,
        )
    })
}

/// Appends datasets into existing relations in the engine's default
/// namespace. Nothing is created and nothing is dropped.
pub fn insert<'a>(
    engine: &dyn Engine,
    arguments: impl IntoIterator<Item = Argument<'a>>,
) -> Result<(), RunError> {
    insert_with_options(engine, arguments, QueryOptions::default())
}

/// [`insert`] with caller-supplied load tuning. The staging options that
/// define an insert override whatever `base` says.
pub fn insert_with_options<'a>(
    engine: &dyn Engine,
    arguments: impl IntoIterator<Item = Argument<'a>>,
    base: QueryOptions,
) -> Result<(), RunError> {
    let options = QueryOptions {
        create: false,
        existence_policy: ExistencePolicy::Append,
        schema: Some(SchemaTarget::EngineDefault),
        keep: true,
        ..base
    };
    let request = arguments
        .into_iter()
        .fold(QueryRequest::load_only(), |request, argument| request.arg(argument))
        .options(options);
    run(engine, &request).map(|_| ())
}
