//! CLI integration tests
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests
//!
//! The instrumentation runner is plain `sh`: each target script writes its own
//! call records to the file named by $PERFCACHE_RECORDS, standing in for a
//! real profiler.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SHELL_CONFIG: &str = r#"
runner = ["sh"]
declaration_patterns = ['^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\(\)\s*\{']
"#;

const PROFILED_SCRIPT: &str = r#"
foo() {
  :
}
bar() {
  :
}
cat > "$PERFCACHE_RECORDS" <<'EOF'
{"sourceUnit":"target.sh","functionName":"foo","callCount":3,"exclusiveTime":0.3,"inclusiveTime":0.6}
{"sourceUnit":"target.sh","functionName":"bar","callCount":1,"exclusiveTime":0.1,"inclusiveTime":0.1}
{"sourceUnit":"sh","functionName":"cat","callCount":1,"exclusiveTime":0.01,"inclusiveTime":0.01}
EOF
"#;

const CRASHING_SCRIPT: &str = r#"
foo() {
  :
}
echo "Traceback: ValueError: bad input" >&2
exit 1
"#;

fn setup(dir: &TempDir, script: &str) -> (PathBuf, PathBuf) {
    let config = dir.path().join("perfcache.toml");
    fs::write(&config, SHELL_CONFIG).unwrap();
    let target = dir.path().join("target.sh");
    fs::write(&target, script).unwrap();
    (config, target)
}

fn profile(config: &Path, target: &Path, cache: &Path) -> Command {
    let mut cmd = Command::cargo_bin("perfcache").unwrap();
    cmd.arg("profile")
        .arg(target)
        .arg("--cache")
        .arg(cache)
        .arg("--config")
        .arg(config);
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("perfcache").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_profile_requires_runner() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("app.py");
    fs::write(&target, "def foo():\n    pass\n").unwrap();

    let mut cmd = Command::cargo_bin("perfcache").unwrap();
    cmd.arg("profile")
        .arg(&target)
        .arg("--cache")
        .arg(dir.path().join("cache.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No instrumentation runner configured"));
}

#[test]
fn test_profile_twice_reports_new_then_unchanged() {
    let dir = TempDir::new().unwrap();
    let (config, target) = setup(&dir, PROFILED_SCRIPT);
    let cache = dir.path().join("cache.json");

    profile(&config, &target, &cache)
        .assert()
        .success()
        .stdout(predicate::str::contains("foo"))
        .stdout(predicate::str::contains("bar"))
        .stdout(predicate::str::contains("Cache: 2 new, 0 unchanged"));

    assert!(cache.exists());

    profile(&config, &target, &cache)
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache: 0 new, 2 unchanged"));
}

#[test]
fn test_profile_json_output() {
    let dir = TempDir::new().unwrap();
    let (config, target) = setup(&dir, PROFILED_SCRIPT);
    let cache = dir.path().join("cache.json");

    let output = profile(&config, &target, &cache)
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["records"].as_array().unwrap().len(), 2);
    assert_eq!(report["records"][0]["functionName"], "foo");
    assert_eq!(report["records"][0]["callCount"], 3);
    assert_eq!(report["records"][1]["functionName"], "bar");
    assert_eq!(report["merge"]["new"], 2);
    assert_eq!(report["merge"]["unchanged"], 0);
}

#[test]
fn test_crashing_target_fails_without_cache() {
    let dir = TempDir::new().unwrap();
    let (config, target) = setup(&dir, CRASHING_SCRIPT);
    let cache = dir.path().join("cache.json");

    profile(&config, &target, &cache)
        .assert()
        .failure()
        .stderr(predicate::str::contains("ExecutionError"))
        .stderr(predicate::str::contains("target.sh"))
        .stderr(predicate::str::contains("ValueError: bad input"));

    assert!(!cache.exists());
}

#[test]
fn test_malformed_cache_is_storage_error() {
    let dir = TempDir::new().unwrap();
    let (config, target) = setup(&dir, PROFILED_SCRIPT);
    let cache = dir.path().join("cache.json");
    fs::write(&cache, "not a cache").unwrap();

    profile(&config, &target, &cache)
        .assert()
        .failure()
        .stderr(predicate::str::contains("StorageError"));

    assert_eq!(fs::read_to_string(&cache).unwrap(), "not a cache");
}

#[test]
fn test_inspect_lists_cached_entries() {
    let dir = TempDir::new().unwrap();
    let (config, target) = setup(&dir, PROFILED_SCRIPT);
    let cache = dir.path().join("cache.json");

    profile(&config, &target, &cache).assert().success();

    let mut cmd = Command::cargo_bin("perfcache").unwrap();
    cmd.arg("inspect")
        .arg("--cache")
        .arg(&cache)
        .arg("--function")
        .arg("foo")
        .assert()
        .success()
        .stdout(predicate::str::contains("foo"))
        .stdout(predicate::str::contains("1 entries"));
}

#[test]
fn test_inspect_missing_cache_is_empty() {
    let dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("perfcache").unwrap();
    cmd.arg("inspect")
        .arg("--cache")
        .arg(dir.path().join("none.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("No cached entries."));
}
