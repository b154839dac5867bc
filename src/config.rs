//! Profiling configuration (TOML)
//!
//! Every field is optional in the file; missing fields take their defaults.
//!
//! ```toml
//! runner = ["python3", "tools/cprofile_runner.py"]
//! cache_path = ".perfcache.json"
//! records_env = "PERFCACHE_RECORDS"
//! scope_to_target = true
//! declaration_patterns = ['^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(']
//! ```

use crate::discovery::{default_patterns, DeclarationScanner};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Instrumentation runner command prefix
    pub runner: Vec<String>,

    /// Persisted cache location
    pub cache_path: PathBuf,

    /// Variable naming the file the runner writes call records to
    pub records_env: String,

    /// Only match records from the target's own source unit
    pub scope_to_target: bool,

    /// Declaration regexes; first capture group is the function name
    pub declaration_patterns: Vec<String>,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".perfcache.json")
}

fn default_records_env() -> String {
    "PERFCACHE_RECORDS".to_string()
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            runner: Vec::new(),
            cache_path: default_cache_path(),
            records_env: default_records_env(),
            scope_to_target: true,
            declaration_patterns: default_patterns(),
        }
    }
}

impl ProfileConfig {
    /// Load and validate a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ProfileConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.records_env.is_empty() || self.records_env.contains('=') {
            return Err(ConfigError::Invalid(format!(
                "records_env must be a non-empty variable name, got {:?}",
                self.records_env
            )));
        }
        if self.runner.iter().any(|part| part.is_empty()) {
            return Err(ConfigError::Invalid("runner contains an empty argument".to_string()));
        }
        self.scanner()?;
        Ok(())
    }

    /// Declaration scanner built from the configured patterns
    pub fn scanner(&self) -> Result<DeclarationScanner, ConfigError> {
        DeclarationScanner::new(&self.declaration_patterns)
            .map_err(|e| ConfigError::Invalid(format!("bad declaration pattern: {}", e)))
    }
}
