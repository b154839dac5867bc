//! Per-function metrics data model
//!
//! `CallRecord` is one raw row emitted by the instrumentation runner;
//! `MetricsRecord` is the aggregate for one `(source unit, function)` pair
//! over a whole run. Both share the camelCase wire names used by the runner
//! protocol and the persisted cache.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a function within a run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionKey {
    pub source_unit: String,
    pub function_name: String,
}

impl FunctionKey {
    pub fn new(source_unit: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            source_unit: source_unit.into(),
            function_name: function_name.into(),
        }
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_unit, self.function_name)
    }
}

/// A raw call record from the instrumentation runner
///
/// Times are in seconds. A record may already summarize several calls
/// (`call_count > 1`), as profilers usually report per-callsite totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub source_unit: String,
    pub function_name: String,
    pub call_count: u64,
    pub exclusive_time: f64,
    pub inclusive_time: f64,
}

impl CallRecord {
    pub fn new(
        source_unit: impl Into<String>,
        function_name: impl Into<String>,
        call_count: u64,
        exclusive_time: f64,
        inclusive_time: f64,
    ) -> Self {
        Self {
            source_unit: source_unit.into(),
            function_name: function_name.into(),
            call_count,
            exclusive_time,
            inclusive_time,
        }
    }

    /// Reason this record cannot be aggregated, if any
    pub fn validation_error(&self) -> Option<String> {
        invalid_fields(&self.function_name, self.exclusive_time, self.inclusive_time)
    }
}

/// Aggregated performance of one function for a single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRecord {
    pub source_unit: String,
    pub function_name: String,
    pub call_count: u64,
    pub exclusive_time: f64,
    pub inclusive_time: f64,
}

impl MetricsRecord {
    /// Empty accumulator for a function
    pub fn empty(key: &FunctionKey) -> Self {
        Self {
            source_unit: key.source_unit.clone(),
            function_name: key.function_name.clone(),
            call_count: 0,
            exclusive_time: 0.0,
            inclusive_time: 0.0,
        }
    }

    /// Fold one raw call record into this aggregate
    pub fn absorb(&mut self, record: &CallRecord) {
        self.call_count += record.call_count;
        self.exclusive_time += record.exclusive_time;
        self.inclusive_time += record.inclusive_time;
    }

    pub fn key(&self) -> FunctionKey {
        FunctionKey::new(&self.source_unit, &self.function_name)
    }

    /// Reason this record cannot be cached, if any
    pub fn validation_error(&self) -> Option<String> {
        invalid_fields(&self.function_name, self.exclusive_time, self.inclusive_time)
    }

    /// Mean exclusive time per call, absent when nothing was called
    pub fn per_call_exclusive(&self) -> Option<f64> {
        per_call(self.exclusive_time, self.call_count)
    }

    /// Mean inclusive time per call, absent when nothing was called
    pub fn per_call_inclusive(&self) -> Option<f64> {
        per_call(self.inclusive_time, self.call_count)
    }
}

fn invalid_fields(function_name: &str, exclusive_time: f64, inclusive_time: f64) -> Option<String> {
    if function_name.is_empty() {
        return Some("empty functionName".to_string());
    }
    if !exclusive_time.is_finite() || exclusive_time < 0.0 {
        return Some(format!("invalid exclusiveTime {}", exclusive_time));
    }
    if !inclusive_time.is_finite() || inclusive_time < 0.0 {
        return Some(format!("invalid inclusiveTime {}", inclusive_time));
    }
    if inclusive_time < exclusive_time {
        return Some(format!(
            "inclusiveTime {} is less than exclusiveTime {}",
            inclusive_time, exclusive_time
        ));
    }
    None
}

fn per_call(total: f64, calls: u64) -> Option<f64> {
    (calls > 0).then(|| total / calls as f64)
}
