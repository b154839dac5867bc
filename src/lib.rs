//! perfcache - function-level profiling with a fingerprinted metrics cache
//!
//! Turns a raw per-call record stream from an external instrumentation runner
//! into one metrics record per function of interest, fingerprints each record
//! by its content, and merges the results into a persisted cache so repeated
//! runs can tell which functions changed performance.

pub mod aggregator;
pub mod cache_store;
pub mod call_records;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod fingerprint;
pub mod instrumentation;
pub mod metrics;
pub mod report;
pub mod session;
