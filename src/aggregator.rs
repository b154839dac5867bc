//! Per-function metrics aggregation
//!
//! Narrows a whole-program call-record stream down to the functions of
//! interest and folds each function's records into one [`MetricsRecord`].
//!
//! The stream is drained completely before anything is returned: cumulative
//! statistics are only meaningful over a finished run, and a read error or
//! malformed record anywhere discards the whole aggregation.
//!
//! A flat record stream never signals that a function is complete (a later
//! record may still add to it), so aggregation always runs to the end of the
//! stream rather than stopping once every name has been seen.

use crate::call_records::DataError;
use crate::metrics::{CallRecord, FunctionKey, MetricsRecord};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Which call records the aggregator keeps
#[derive(Debug, Clone, Default)]
pub struct FunctionFilter {
    names: HashSet<String>,
    /// File name the record's source unit must have, if scoped
    source_unit: Option<String>,
}

impl FunctionFilter {
    /// Keep records whose function name is in `names`, from any source unit
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            source_unit: None,
        }
    }

    /// Restrict matches to source units with the same file name as `unit`
    ///
    /// Directories are ignored on both sides, so `/tmp/run/app.py` and
    /// `app.py` name the same unit.
    pub fn with_source_unit(mut self, unit: impl AsRef<str>) -> Self {
        self.source_unit = Some(unit_file_name(unit.as_ref()).to_string());
        self
    }

    pub fn names(&self) -> &HashSet<String> {
        &self.names
    }

    pub fn matches(&self, record: &CallRecord) -> bool {
        if !self.names.contains(&record.function_name) {
            return false;
        }
        match &self.source_unit {
            Some(unit) => unit_file_name(&record.source_unit) == unit,
            None => true,
        }
    }
}

fn unit_file_name(unit: &str) -> &str {
    Path::new(unit)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(unit)
}

/// Folds raw call records into per-function metrics
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    filter: FunctionFilter,
}

impl MetricsAggregator {
    pub fn new(filter: FunctionFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &FunctionFilter {
        &self.filter
    }

    /// Aggregate a record stream into one record per matched function name
    ///
    /// Requested names with no observed calls are absent from the result.
    /// When a name of interest shows up under more than one source unit, the
    /// first unit observed with a nonzero call count owns the name and the
    /// others are dropped with a warning, so the result never holds two
    /// records for one name.
    pub fn aggregate<I>(&self, records: I) -> Result<BTreeMap<String, MetricsRecord>, DataError>
    where
        I: IntoIterator<Item = Result<CallRecord, DataError>>,
    {
        // Per-unit totals, with units kept in first-observation order per name
        let mut per_unit: HashMap<FunctionKey, MetricsRecord> = HashMap::new();
        let mut units: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut seen = 0usize;

        for record in records {
            let record = record?;
            seen += 1;

            if !self.filter.matches(&record) {
                continue;
            }

            let key = FunctionKey::new(&record.source_unit, &record.function_name);
            per_unit
                .entry(key)
                .or_insert_with_key(|key| {
                    units
                        .entry(key.function_name.clone())
                        .or_default()
                        .push(key.source_unit.clone());
                    MetricsRecord::empty(key)
                })
                .absorb(&record);
        }

        let mut results = BTreeMap::new();
        for (name, owners) in units {
            // Units that only ever reported zero calls count as not invoked
            let mut invoked: Vec<MetricsRecord> = owners
                .into_iter()
                .filter_map(|unit| per_unit.remove(&FunctionKey::new(unit, name.as_str())))
                .filter(|record| record.call_count > 0)
                .collect();
            if invoked.is_empty() {
                continue;
            }
            let owner = invoked.remove(0);
            for shadowed in &invoked {
                tracing::warn!(
                    function = %shadowed.function_name,
                    source_unit = %shadowed.source_unit,
                    owner = %owner.source_unit,
                    "function name already matched in another source unit; records dropped"
                );
            }
            results.insert(name, owner);
        }

        tracing::debug!(
            records = seen,
            matched = results.len(),
            requested = self.filter.names.len(),
            "aggregation complete"
        );

        Ok(results)
    }
}

/// Aggregate `records` keeping only `names`, from any source unit
pub fn aggregate<I>(records: I, names: &HashSet<String>) -> Result<BTreeMap<String, MetricsRecord>, DataError>
where
    I: IntoIterator<Item = Result<CallRecord, DataError>>,
{
    MetricsAggregator::new(FunctionFilter::new(names.iter().cloned())).aggregate(records)
}
