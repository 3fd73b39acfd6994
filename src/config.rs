//! File-based defaults for requests and logging.
//!
//! ```toml
//! [defaults]
//! existence_policy = "replace"
//! schema = "session-temporary"
//! coerce_float = false
//!
//! [pipeline]
//! batch_size = 500
//! copy_chunk_rows = 20000
//! reset_temporaries = true
//!
//! [logging]
//! filter = "sqlstage=info"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encode::DEFAULT_CHUNK_ROWS;
use crate::query::QueryOptions;
use crate::stage::{ExistencePolicy, SchemaTarget, DEFAULT_BATCH_SIZE};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SQLSTAGE_CONFIG";

/// Parsed configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Staging and result-shaping defaults.
    #[serde(default)]
    pub defaults: DefaultsSection,
    /// Load tuning.
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[defaults]`: request options callers usually leave alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsSection {
    /// Where staged relations are created.
    pub schema: Option<SchemaTarget>,
    /// Behavior when a staged relation already exists.
    pub existence_policy: ExistencePolicy,
    /// Leave staged relations in place.
    pub keep: bool,
    /// Allow creating missing relations.
    pub create: bool,
    /// Materialize dataset indexes.
    pub index: bool,
    /// Label of the materialized index column.
    pub index_label: Option<String>,
    /// Convert decimal results to floats.
    pub coerce_float: bool,
    /// Split results into chunks of this many rows.
    pub chunk_size: Option<usize>,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            schema: None,
            existence_policy: ExistencePolicy::Fail,
            keep: false,
            create: true,
            index: false,
            index_label: None,
            coerce_float: true,
            chunk_size: None,
        }
    }
}

/// `[pipeline]`: how rows are moved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    /// Rows per `INSERT` on the row-wise path.
    pub batch_size: usize,
    /// Rows per encoded chunk on the bulk-copy path.
    pub copy_chunk_rows: usize,
    /// Use the bulk-copy path when available.
    pub fast_path: bool,
    /// Discard temporary relations before staging into the session schema.
    pub reset_temporaries: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            copy_chunk_rows: DEFAULT_CHUNK_ROWS,
            fast_path: true,
            reset_temporaries: false,
        }
    }
}

/// `[logging]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// `EnvFilter` directive.
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

/// Errors raised while loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// I/O failure.
        source: std::io::Error,
    },
    /// The file is not valid configuration.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// TOML failure.
        source: toml::de::Error,
    },
    /// An explicitly requested file does not exist.
    #[error("config file {path} does not exist")]
    Missing {
        /// File path.
        path: PathBuf,
    },
}

impl StageConfig {
    /// Loads `explicit`, which must exist, or the default config file if
    /// present. Without either, returns the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::Missing {
                    path: path.to_path_buf(),
                });
            }
            return read_file(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => read_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parses configuration text. `origin` names the source in errors.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Request options seeded from `[defaults]` and `[pipeline]`.
    pub fn query_options(&self) -> QueryOptions {
        let d = &self.defaults;
        let p = &self.pipeline;
        QueryOptions {
            index: d.index,
            index_label: d.index_label.clone(),
            coerce_float: d.coerce_float,
            chunk_size: d.chunk_size,
            schema: d.schema.clone(),
            existence_policy: d.existence_policy,
            keep: d.keep,
            create: d.create,
            batch_size: p.batch_size,
            copy_chunk_rows: p.copy_chunk_rows,
            fast_path: p.fast_path,
            reset_temporaries: p.reset_temporaries,
            ..QueryOptions::default()
        }
    }
}

fn read_file(path: &Path) -> Result<StageConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    StageConfig::from_toml_str(&contents, path)
}

/// `<config dir>/sqlstage/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("sqlstage").join("config.toml"))
}
