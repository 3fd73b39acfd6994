//! The staging session: one connection per request and the relations staged
//! on it, torn down in reverse order when the request ends.

use tracing::{debug, warn};

use crate::dialect::LoadStrategy;
use crate::engine::{Connection, Engine, RelationName};
use crate::error::{Result, StageError};
use crate::table::TabularDataset;

use super::lifecycle::{self, LoadOptions, StagedRelation};
use super::spec::StagingSpec;

/// One request's connection plus every relation staged on it.
///
/// Staged relations are dropped when the session is closed, or when it is
/// dropped on an early return or while unwinding. [`close`] reports teardown
/// failures; the implicit path can only log them.
///
/// [`close`]: StagingSession::close
pub struct StagingSession {
    conn: Box<dyn Connection>,
    staged: Vec<StagedRelation>,
    keep: bool,
}

impl StagingSession {
    /// Opens a connection on `engine`.
    pub fn open(engine: &dyn Engine, keep: bool) -> Result<Self> {
        let conn = engine
            .connect()
            .map_err(|source| StageError::Connect { source })?;
        Ok(Self::new(conn, keep))
    }

    /// Wraps an already open connection.
    pub fn new(conn: Box<dyn Connection>, keep: bool) -> Self {
        Self {
            conn,
            staged: Vec::new(),
            keep,
        }
    }

    /// The session connection.
    pub fn connection(&mut self) -> &mut dyn Connection {
        self.conn.as_mut()
    }

    /// Relations staged so far, in staging order.
    pub fn staged(&self) -> &[StagedRelation] {
        &self.staged
    }

    /// Drops every temporary relation on the connection, if the dialect has
    /// a statement for it. Must run before anything is staged.
    pub fn reset_temporaries(&mut self, on_behalf_of: &RelationName) -> Result<bool> {
        let Some(sql) = self.conn.sql().reset_temporaries_sql() else {
            return Ok(false);
        };
        self.conn
            .execute(sql, &[])
            .map_err(|err| StageError::staging(on_behalf_of, err))?;
        debug!(statement = sql, "stage.session.reset_temporaries");
        Ok(true)
    }

    /// Stages `dataset` and tracks the relation for teardown. Returns the
    /// position of the staged relation.
    pub fn stage(&mut self, dataset: &TabularDataset, spec: &StagingSpec) -> Result<usize> {
        let staged = lifecycle::stage(self.conn.as_mut(), dataset, spec)?;
        self.staged.push(staged);
        Ok(self.staged.len() - 1)
    }

    /// Loads `dataset` into the relation staged at `position`.
    pub fn load(
        &mut self,
        position: usize,
        dataset: &TabularDataset,
        strategy: LoadStrategy,
        options: &LoadOptions,
    ) -> Result<u64> {
        let staged = self.staged.get(position).ok_or_else(|| {
            StageError::invalid(format!("no staged relation at position {position}"))
        })?;
        lifecycle::load(self.conn.as_mut(), staged, dataset, strategy, options)
    }

    /// Tears down every staged relation in reverse staging order and returns
    /// the failures. Every relation is attempted.
    pub fn close(mut self) -> Vec<StageError> {
        self.teardown_all()
    }

    fn teardown_all(&mut self) -> Vec<StageError> {
        let mut failures = Vec::new();
        while let Some(staged) = self.staged.pop() {
            if let Err(err) = lifecycle::teardown(self.conn.as_mut(), &staged, self.keep) {
                failures.push(err);
            }
        }
        failures
    }
}

impl Drop for StagingSession {
    fn drop(&mut self) {
        if self.staged.is_empty() {
            return;
        }
        let failures = self.teardown_all();
        if !failures.is_empty() {
            warn!(failures = failures.len(), "stage.session.implicit_teardown_failed");
        }
    }
}
