#![forbid(unsafe_code)]

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::engine::{EngineError, RelationName};
use crate::table::DatasetError;

/// Result type alias for staging and query operations.
pub type Result<T> = std::result::Result<T, StageError>;

/// Failures raised by the staging pipeline.
///
/// Every variant is inspectable; [`StageError::code`] gives a stable name for
/// callers that route on the failure kind.
#[derive(Debug, Error)]
pub enum StageError {
    /// A request argument or option was rejected before touching the engine.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The `fail` policy found the relation already present.
    #[error("relation {relation} already exists")]
    RelationExists {
        /// Relation that blocked staging.
        relation: RelationName,
    },
    /// Implicit creation was disabled and the relation does not exist.
    #[error("relation {relation} does not exist and create is disabled")]
    RelationMissing {
        /// Relation that was expected.
        relation: RelationName,
    },
    /// Creating or loading a staged relation failed.
    #[error("staging {relation} failed: {source}")]
    StagingFailure {
        /// Relation being staged.
        relation: RelationName,
        /// Engine failure.
        #[source]
        source: EngineError,
    },
    /// The statement failed to execute, stream, or convert.
    #[error("query failed: {source}")]
    QueryFailure {
        /// Engine failure.
        #[source]
        source: EngineError,
    },
    /// A staged relation could not be dropped.
    #[error("dropping {relation} failed: {source}")]
    TeardownFailure {
        /// Relation left behind.
        relation: RelationName,
        /// Engine failure.
        #[source]
        source: EngineError,
    },
    /// The engine could not open a connection.
    #[error("connection failed: {source}")]
    Connect {
        /// Engine failure.
        #[source]
        source: EngineError,
    },
}

impl StageError {
    /// Stable identifier of the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            StageError::InvalidArgument(_) => "InvalidArgument",
            StageError::RelationExists { .. } => "RelationExists",
            StageError::RelationMissing { .. } => "RelationMissing",
            StageError::StagingFailure { .. } => "StagingFailure",
            StageError::QueryFailure { .. } => "QueryFailure",
            StageError::TeardownFailure { .. } => "TeardownFailure",
            StageError::Connect { .. } => "Connect",
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        StageError::InvalidArgument(message.into())
    }

    pub(crate) fn staging(relation: &RelationName, source: impl Into<EngineError>) -> Self {
        StageError::StagingFailure {
            relation: relation.clone(),
            source: source.into(),
        }
    }

    pub(crate) fn query(source: impl Into<EngineError>) -> Self {
        StageError::QueryFailure {
            source: source.into(),
        }
    }
}

impl From<DatasetError> for StageError {
    fn from(err: DatasetError) -> Self {
        StageError::InvalidArgument(err.to_string())
    }
}

/// Outcome of a failed request: the failure that ended it plus every
/// teardown failure collected afterwards.
#[derive(Debug)]
pub struct RunError {
    primary: StageError,
    suppressed: Vec<StageError>,
}

impl RunError {
    pub(crate) fn new(primary: StageError, suppressed: Vec<StageError>) -> Self {
        Self {
            primary,
            suppressed,
        }
    }

    /// Builds a run error from teardown failures alone. Returns `None` when
    /// there are none.
    pub(crate) fn from_teardown(mut failures: Vec<StageError>) -> Option<Self> {
        if failures.is_empty() {
            return None;
        }
        let primary = failures.remove(0);
        Some(Self::new(primary, failures))
    }

    /// The failure that ended the request.
    pub fn primary(&self) -> &StageError {
        &self.primary
    }

    /// Teardown failures collected after the primary failure.
    pub fn suppressed(&self) -> &[StageError] {
        &self.suppressed
    }

    /// Shorthand for `self.primary().code()`.
    pub fn code(&self) -> &'static str {
        self.primary.code()
    }

    /// Splits into the primary failure and the suppressed ones.
    pub fn into_parts(self) -> (StageError, Vec<StageError>) {
        (self.primary, self.suppressed)
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        match self.suppressed.len() {
            0 => Ok(()),
            1 => write!(f, " (1 teardown failure suppressed)"),
            n => write!(f, " ({n} teardown failures suppressed)"),
        }
    }
}

impl StdError for RunError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.primary)
    }
}

impl From<StageError> for RunError {
    fn from(primary: StageError) -> Self {
        Self::new(primary, Vec::new())
    }
}
