//! Human-readable and JSON rendering of profiling results

use crate::cache_store::{CacheEntry, CacheStore};
use crate::metrics::MetricsRecord;
use crate::session::ProfileReport;
use std::fmt::Write;

const RULE_WIDTH: usize = 92;

/// Render a run report as a table sorted by inclusive time
pub fn render_text(report: &ProfileReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "\n╔══════════════════════════════════════════════════════════════════════════════════════════╗");
    let _ = writeln!(out, "║  Function Profile (sorted by inclusive time)                                             ║");
    let _ = writeln!(out, "╚══════════════════════════════════════════════════════════════════════════════════════════╝");
    let _ = writeln!(out, "Target: {}", report.target.display());
    let _ = writeln!(out);

    if report.records.is_empty() {
        let _ = writeln!(out, "No matching functions were invoked.");
    } else {
        let _ = writeln!(
            out,
            "{:<32} {:>8} {:>12} {:>12} {:>12} {:>12}",
            "Function", "Calls", "Excl (s)", "Excl/call", "Incl (s)", "Incl/call"
        );
        let _ = writeln!(out, "{}", "─".repeat(RULE_WIDTH));
        for record in &report.records {
            let marker = if report.changed.contains(&record.function_name) { "*" } else { "" };
            let label = format!("{}{}", truncate(&record.function_name, 31), marker);
            let _ = writeln!(
                out,
                "{:<32} {:>8} {:>12.6} {:>12} {:>12.6} {:>12}",
                label,
                record.call_count,
                record.exclusive_time,
                per_call(record.per_call_exclusive()),
                record.inclusive_time,
                per_call(record.per_call_inclusive()),
            );
        }
        let _ = writeln!(out, "{}", "─".repeat(RULE_WIDTH));
        let _ = writeln!(out, "Total inclusive time: {:.6}s", total_inclusive(&report.records));
    }

    let _ = writeln!(
        out,
        "Cache: {} new, {} unchanged{}",
        report.merge.new,
        report.merge.unchanged,
        if report.changed.is_empty() { "" } else { " (* = new performance state)" }
    );
    out
}

/// Render a run report as pretty JSON
pub fn render_json(report: &ProfileReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Render cached entries, optionally limited to one function name
pub fn render_cache_text(store: &CacheStore, function: Option<&str>) -> String {
    let entries = select(store, function);
    let mut out = String::new();

    if entries.is_empty() {
        let _ = writeln!(out, "No cached entries.");
        return out;
    }

    let _ = writeln!(
        out,
        "{:<14} {:<24} {:<24} {:>8} {:>12} {:>12}",
        "Fingerprint", "Source", "Function", "Calls", "Excl (s)", "Incl (s)"
    );
    let _ = writeln!(out, "{}", "─".repeat(RULE_WIDTH + 8));
    for entry in &entries {
        let _ = writeln!(
            out,
            "{:<14} {:<24} {:<24} {:>8} {:>12.6} {:>12.6}",
            entry.fingerprint.short(),
            truncate(&entry.record.source_unit, 24),
            truncate(&entry.record.function_name, 24),
            entry.record.call_count,
            entry.record.exclusive_time,
            entry.record.inclusive_time,
        );
    }
    let _ = writeln!(out, "{} entries", entries.len());
    out
}

/// Render cached entries as a pretty JSON array
pub fn render_cache_json(store: &CacheStore, function: Option<&str>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&select(store, function))
}

fn select<'a>(store: &'a CacheStore, function: Option<&str>) -> Vec<&'a CacheEntry> {
    store
        .iter()
        .filter(|e| function.map_or(true, |name| e.record.function_name == name))
        .collect()
}

fn per_call(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.6}", v))
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut cut: String = s.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Total inclusive time across records, for summaries
pub fn total_inclusive(records: &[MetricsRecord]) -> f64 {
    records.iter().map(|r| r.inclusive_time).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_store::{CacheEntry, MergeReport};
    use crate::fingerprint::FingerprintEngine;
    use crate::metrics::{CallRecord, FunctionKey};
    use std::path::PathBuf;

    fn record(name: &str, calls: u64, excl: f64, incl: f64) -> MetricsRecord {
        let mut r = MetricsRecord::empty(&FunctionKey::new("app.py", name));
        r.absorb(&CallRecord::new("app.py", name, calls, excl, incl));
        r
    }

    fn report() -> ProfileReport {
        ProfileReport {
            target: PathBuf::from("app.py"),
            records: vec![record("foo", 3, 0.3, 0.6), record("bar", 1, 0.1, 0.1)],
            merge: MergeReport {
                new: 1,
                unchanged: 1,
                new_fingerprints: Vec::new(),
            },
            changed: vec!["foo".to_string()],
        }
    }

    #[test]
    fn test_render_text_lists_functions_and_merge() {
        let text = render_text(&report());
        assert!(text.contains("Function Profile"));
        assert!(text.contains("foo*"));
        assert!(text.contains("bar "));
        assert!(text.contains("0.200000"));
        assert!(text.contains("Total inclusive time: 0.700000s"));
        assert!(text.contains("Cache: 1 new, 1 unchanged"));
    }

    #[test]
    fn test_render_text_empty() {
        let mut r = report();
        r.records.clear();
        r.changed.clear();
        assert!(render_text(&r).contains("No matching functions were invoked."));
    }

    #[test]
    fn test_render_json_uses_wire_names() {
        let json: serde_json::Value = serde_json::from_str(&render_json(&report()).unwrap()).unwrap();
        assert_eq!(json["records"][0]["functionName"], "foo");
        assert_eq!(json["merge"]["new"], 1);
    }

    #[test]
    fn test_cache_listing_filters_by_function() {
        let mut store = CacheStore::new();
        let engine = FingerprintEngine::new();
        store.merge(vec![
            CacheEntry::from_record(&engine, record("foo", 3, 0.3, 0.6)),
            CacheEntry::from_record(&engine, record("bar", 1, 0.1, 0.1)),
        ]);

        let text = render_cache_text(&store, Some("foo"));
        assert!(text.contains("foo"));
        assert!(!text.contains("bar"));
        assert!(text.contains("1 entries"));

        let json: serde_json::Value = serde_json::from_str(&render_cache_json(&store, None).unwrap()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_truncate_long_names() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5).chars().count(), 5);
    }

    #[test]
    fn test_total_inclusive() {
        let r = report();
        assert!((total_inclusive(&r.records) - 0.7).abs() < 1e-12);
    }
}
