//! Profiling session orchestration
//!
//! One [`ProfileSession::run`] drives a single profiling run through
//!
//! ```text
//! Idle -> Instrumenting -> Aggregating -> Merging -> Complete
//!   \__________\________________\____________\____-> Failed
//! ```
//!
//! The cache file is only written once the run reaches `Merging`; a failure
//! in any earlier state leaves it exactly as it was, and a crashed target
//! produces no metrics at all.

use crate::aggregator::{FunctionFilter, MetricsAggregator};
use crate::cache_store::{CacheEntry, CacheStore, MergeReport, StorageError};
use crate::call_records::DataError;
use crate::config::{ConfigError, ProfileConfig};
use crate::discovery::{DeclarationScanner, FunctionDiscovery};
use crate::fingerprint::FingerprintEngine;
use crate::instrumentation::{CommandInstrumentation, ExecutionContext, ExecutionError, Instrumentation};
use crate::metrics::MetricsRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Lifecycle of a profiling run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Instrumenting,
    Aggregating,
    Merging,
    Complete,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Terminal failure of a profiling run
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("DataError: {0}")]
    Data(#[from] DataError),

    #[error("StorageError: {0}")]
    Storage(#[from] StorageError),

    #[error("ExecutionError: {0}")]
    Execution(#[from] ExecutionError),
}

impl SessionError {
    /// Failure kind name
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Data(_) => "DataError",
            SessionError::Storage(_) => "StorageError",
            SessionError::Execution(_) => "ExecutionError",
        }
    }
}

/// Result of a completed profiling run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
    pub target: PathBuf,
    /// Matched functions, highest inclusive time first
    pub records: Vec<MetricsRecord>,
    pub merge: MergeReport,
    /// Functions whose fingerprint was not cached before this run
    pub changed: Vec<String>,
}

impl ProfileReport {
    pub fn record(&self, function_name: &str) -> Option<&MetricsRecord> {
        self.records.iter().find(|r| r.function_name == function_name)
    }
}

/// Drives one profiling run at a time
pub struct ProfileSession<I, D> {
    instrumentation: I,
    discovery: D,
    engine: FingerprintEngine,
    context: ExecutionContext,
    scope_to_target: bool,
    state: SessionState,
}

impl ProfileSession<CommandInstrumentation, DeclarationScanner> {
    /// Session backed by the configured external runner and declaration scanner
    pub fn from_config(config: &ProfileConfig, context: ExecutionContext) -> Result<Self, ConfigError> {
        config.validate()?;
        let instrumentation = CommandInstrumentation::new(config.runner.clone(), config.records_env.clone());
        Ok(ProfileSession::new(instrumentation, config.scanner()?)
            .with_context(context)
            .scope_to_target(config.scope_to_target))
    }
}

impl<I: Instrumentation, D: FunctionDiscovery> ProfileSession<I, D> {
    pub fn new(instrumentation: I, discovery: D) -> Self {
        Self {
            instrumentation,
            discovery,
            engine: FingerprintEngine::new(),
            context: ExecutionContext::default(),
            scope_to_target: true,
            state: SessionState::Idle,
        }
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    /// Whether only records from the target's own source unit are matched
    pub fn scope_to_target(mut self, enabled: bool) -> Self {
        self.scope_to_target = enabled;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Profile `target` and merge its metrics into the cache at `cache_path`
    pub fn run(&mut self, target: impl AsRef<Path>, cache_path: impl AsRef<Path>) -> Result<ProfileReport, SessionError> {
        let target = target.as_ref();
        let cache_path = cache_path.as_ref();
        self.state = SessionState::Idle;

        match self.run_stages(target, cache_path) {
            Ok(report) => {
                self.transition(SessionState::Complete);
                Ok(report)
            }
            Err(err) => {
                tracing::debug!(
                    from = %self.state,
                    program = %target.display(),
                    kind = err.kind(),
                    "profiling run failed"
                );
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    fn run_stages(&mut self, target: &Path, cache_path: &Path) -> Result<ProfileReport, SessionError> {
        let mut store = CacheStore::load(cache_path)?;

        self.transition(SessionState::Instrumenting);
        let target = self.resolve_target(target)?;
        let target = target.as_path();
        let raw = self.instrumentation.instrument(target, &self.context)?;

        self.transition(SessionState::Aggregating);
        let names = self.discovery.discover(target)?;
        let aggregated = self.aggregator(target, names).aggregate(raw.stream()?)?;
        let mut records: Vec<MetricsRecord> = aggregated.into_values().collect();
        records.sort_by(by_inclusive_time_desc);

        self.transition(SessionState::Merging);
        let entries: Vec<CacheEntry> = records
            .iter()
            .cloned()
            .map(|record| CacheEntry::from_record(&self.engine, record))
            .collect();
        let merge = store.merge(entries);
        store.save(cache_path)?;

        tracing::info!(
            program = %target.display(),
            functions = records.len(),
            new = merge.new,
            unchanged = merge.unchanged,
            cache = %cache_path.display(),
            "merged profiling results"
        );

        let changed = changed_functions(&store, &merge);
        Ok(ProfileReport {
            target: target.to_path_buf(),
            records,
            merge,
            changed,
        })
    }

    /// Absolute path of an existing target file
    ///
    /// A relative target is taken relative to the context's working
    /// directory, where the runner will be started, when one is set.
    fn resolve_target(&self, target: &Path) -> Result<PathBuf, ExecutionError> {
        let joined = match &self.context.working_dir {
            Some(dir) if target.is_relative() => dir.join(target),
            _ => target.to_path_buf(),
        };
        match joined.canonicalize() {
            Ok(path) if path.is_file() => Ok(path),
            _ => Err(ExecutionError::TargetNotFound { target: joined }),
        }
    }

    fn aggregator(&self, target: &Path, names: HashSet<String>) -> MetricsAggregator {
        let filter = FunctionFilter::new(names);
        let filter = match target.file_name().and_then(|name| name.to_str()) {
            Some(unit) if self.scope_to_target => filter.with_source_unit(unit),
            _ => filter,
        };
        MetricsAggregator::new(filter)
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = %self.state, to = %next, "session state");
        self.state = next;
    }
}

fn by_inclusive_time_desc(a: &MetricsRecord, b: &MetricsRecord) -> Ordering {
    b.inclusive_time
        .partial_cmp(&a.inclusive_time)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.function_name.cmp(&b.function_name))
}

fn changed_functions(store: &CacheStore, merge: &MergeReport) -> Vec<String> {
    merge
        .new_fingerprints
        .iter()
        .filter_map(|fp| store.get(fp))
        .map(|entry| entry.record.function_name.clone())
        .collect()
}
