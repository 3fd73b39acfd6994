//! Staging targets and existence policies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dialect::StrategyProfile;
use crate::engine::RelationName;
use crate::error::{Result, StageError};

/// What staging does when the target relation already exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistencePolicy {
    /// Refuse to touch the existing relation.
    #[default]
    Fail,
    /// Drop the existing relation and create a new one.
    Replace,
    /// Load into the existing relation as is.
    Append,
}

impl ExistencePolicy {
    /// Lowercase name as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            ExistencePolicy::Fail => "fail",
            ExistencePolicy::Replace => "replace",
            ExistencePolicy::Append => "append",
        }
    }
}

impl fmt::Display for ExistencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExistencePolicy {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fail" => Ok(ExistencePolicy::Fail),
            "replace" => Ok(ExistencePolicy::Replace),
            "append" => Ok(ExistencePolicy::Append),
            other => Err(StageError::invalid(format!(
                "existence policy '{other}' must be 'fail', 'replace', or 'append'"
            ))),
        }
    }
}

/// Where staged relations are created.
///
/// Leaving the target unset stages into the dialect's default staging
/// schema; see [`SchemaTarget::resolve`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SchemaTarget {
    /// The engine's default namespace, unqualified.
    EngineDefault,
    /// The connection-private temporary namespace.
    SessionTemporary,
    /// An explicit, usually persistent, schema.
    Named(String),
}

impl SchemaTarget {
    /// Resolves the schema a relation is created in and whether that schema
    /// is private to the connection. `None` picks the dialect's default
    /// staging schema.
    pub fn resolve(
        target: Option<&SchemaTarget>,
        profile: &StrategyProfile,
    ) -> Result<(Option<String>, bool)> {
        let is_session = |schema: &str| profile.session_schema == Some(schema);
        match target {
            None => Ok(match profile.default_staging_schema {
                Some(schema) => (Some(schema.to_string()), is_session(schema)),
                None => (None, false),
            }),
            Some(SchemaTarget::EngineDefault) => Ok((None, false)),
            Some(SchemaTarget::SessionTemporary) => match profile.session_schema {
                Some(schema) => Ok((Some(schema.to_string()), true)),
                None => Err(StageError::invalid(
                    "engine has no session-temporary schema",
                )),
            },
            Some(SchemaTarget::Named(schema)) => Ok((Some(schema.clone()), is_session(schema))),
        }
    }
}

impl fmt::Display for SchemaTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaTarget::EngineDefault => f.write_str("default"),
            SchemaTarget::SessionTemporary => f.write_str("session-temporary"),
            SchemaTarget::Named(schema) => f.write_str(schema),
        }
    }
}

impl FromStr for SchemaTarget {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Err(StageError::invalid("schema name cannot be empty")),
            "default" => Ok(SchemaTarget::EngineDefault),
            "session-temporary" | "session_temporary" => Ok(SchemaTarget::SessionTemporary),
            name => Ok(SchemaTarget::Named(name.to_string())),
        }
    }
}

impl TryFrom<String> for SchemaTarget {
    type Error = StageError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SchemaTarget> for String {
    fn from(value: SchemaTarget) -> Self {
        value.to_string()
    }
}

/// How one dataset is staged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingSpec {
    /// Fully resolved relation name.
    pub relation: RelationName,
    /// Behavior when the relation exists.
    pub existence: ExistencePolicy,
    /// Whether a missing relation may be created.
    pub create: bool,
    /// Materialize the dataset index as the leading column.
    pub index: bool,
    /// Label of the index column.
    pub index_label: Option<String>,
    /// The relation lives in the connection-private namespace.
    pub session_temporary: bool,
}
