//! Instrumentation collaborator: runs the target and yields raw call records
//!
//! The core never intercepts calls itself. An [`Instrumentation`] takes the
//! target and a caller-owned [`ExecutionContext`], runs the target to
//! completion, and hands back the raw call records as [`RawRecords`]. They
//! are parsed only when the aggregator drains them.
//!
//! [`CommandInstrumentation`] is the external-runner implementation: it
//! spawns `runner... <target> <args...>` and tells the runner where to write
//! its JSON Lines records through an environment variable.

use crate::call_records::{CallRecordReader, DataError};
use crate::metrics::CallRecord;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Captured stderr is trimmed to this many trailing bytes in error messages
const STDERR_TAIL_BYTES: usize = 2048;

/// Errors raised while executing the target program
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("target {target} does not exist")]
    TargetNotFound { target: PathBuf },

    #[error("failed to launch instrumentation for {target}: {source}")]
    Spawn {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("target {target} failed ({status}): {cause}")]
    Failed {
        target: PathBuf,
        status: String,
        cause: String,
    },

    #[error("no instrumentation runner configured for {target}")]
    NoRunner { target: PathBuf },
}

impl ExecutionError {
    /// The target program this error is about
    pub fn target(&self) -> &Path {
        match self {
            ExecutionError::TargetNotFound { target }
            | ExecutionError::Spawn { target, .. }
            | ExecutionError::Failed { target, .. }
            | ExecutionError::NoRunner { target } => target,
        }
    }
}

/// Boxed stream of raw call records
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<CallRecord, DataError>> + 'a>;

/// Raw call records left behind by one instrumented run
#[derive(Debug)]
pub enum RawRecords {
    /// JSON Lines file written by an external runner; removed on drop
    File(NamedTempFile),
    /// Records already held in memory
    Memory(Vec<CallRecord>),
}

impl RawRecords {
    /// Records in emission order; a malformed line is an `Err` item
    pub fn stream(&self) -> Result<RecordStream<'_>, DataError> {
        match self {
            RawRecords::File(file) => Ok(Box::new(CallRecordReader::open(file.path())?)),
            RawRecords::Memory(records) => Ok(Box::new(records.iter().cloned().map(Ok))),
        }
    }
}

impl From<Vec<CallRecord>> for RawRecords {
    fn from(records: Vec<CallRecord>) -> Self {
        RawRecords::Memory(records)
    }
}

/// Caller-owned execution environment for one target run
///
/// Replaces any notion of a shared global namespace: everything the target
/// sees beyond the inherited process environment is listed here.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Arguments passed to the target after its path
    pub args: Vec<String>,
    /// Extra environment variables for the target
    pub env: BTreeMap<String, String>,
    /// Working directory; inherits the current one when `None`
    pub working_dir: Option<PathBuf>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Runs a target program under instrumentation
///
/// Implementations run the target to its natural completion; there is no
/// cancellation once started.
pub trait Instrumentation {
    fn instrument(&self, target: &Path, ctx: &ExecutionContext) -> Result<RawRecords, ExecutionError>;
}

/// Instrumentation delegated to an external runner command
#[derive(Debug, Clone)]
pub struct CommandInstrumentation {
    runner: Vec<String>,
    records_env: String,
}

impl CommandInstrumentation {
    /// `runner` is the command prefix; the target path and its arguments follow it
    pub fn new(runner: Vec<String>, records_env: impl Into<String>) -> Self {
        Self {
            runner,
            records_env: records_env.into(),
        }
    }

    pub fn runner(&self) -> &[String] {
        &self.runner
    }
}

impl Instrumentation for CommandInstrumentation {
    fn instrument(&self, target: &Path, ctx: &ExecutionContext) -> Result<RawRecords, ExecutionError> {
        let Some((program, runner_args)) = self.runner.split_first() else {
            return Err(ExecutionError::NoRunner {
                target: target.to_path_buf(),
            });
        };

        let records_file = tempfile::Builder::new()
            .prefix("perfcache-records-")
            .suffix(".jsonl")
            .tempfile()
            .map_err(|source| ExecutionError::Spawn {
                target: target.to_path_buf(),
                source,
            })?;

        let mut command = Command::new(program);
        command
            .args(runner_args)
            .arg(target)
            .args(&ctx.args)
            .envs(&ctx.env)
            .env(&self.records_env, records_file.path())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped());
        if let Some(dir) = &ctx.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(
            runner = %program,
            path = %target.display(),
            records = %records_file.path().display(),
            "launching instrumentation runner"
        );

        let output = command.output().map_err(|source| ExecutionError::Spawn {
            target: target.to_path_buf(),
            source,
        })?;

        if !output.status.success() {
            return Err(ExecutionError::Failed {
                target: target.to_path_buf(),
                status: output.status.to_string(),
                cause: stderr_tail(&output.stderr),
            });
        }

        Ok(RawRecords::File(records_file))
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return "no error output".to_string();
    }
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_runner_is_error() {
        let instrumentation = CommandInstrumentation::new(Vec::new(), "PERFCACHE_RECORDS");
        let err = instrumentation
            .instrument(Path::new("app.py"), &ExecutionContext::new())
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NoRunner { .. }));
    }

    #[test]
    fn test_runner_writes_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("target.sh");
        std::fs::write(
            &target,
            r#"printf '%s\n' '{"sourceUnit":"target.sh","functionName":"foo","callCount":3,"exclusiveTime":0.3,"inclusiveTime":0.6}' > "$PERFCACHE_RECORDS""#,
        )
        .unwrap();

        let instrumentation = CommandInstrumentation::new(vec!["sh".to_string()], "PERFCACHE_RECORDS");
        let raw = instrumentation.instrument(&target, &ExecutionContext::new()).unwrap();
        let records: Vec<CallRecord> = raw.stream().unwrap().collect::<Result<_, _>>().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].function_name, "foo");
        assert_eq!(records[0].call_count, 3);
    }

    #[test]
    fn test_failing_target_names_target_and_cause() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("crash.sh");
        std::fs::write(&target, "echo 'boom: division by zero' >&2\nexit 3\n").unwrap();

        let instrumentation = CommandInstrumentation::new(vec!["sh".to_string()], "PERFCACHE_RECORDS");
        let err = instrumentation.instrument(&target, &ExecutionContext::new()).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("crash.sh"));
        assert!(message.contains("division by zero"));
    }

    #[test]
    fn test_context_args_and_env_reach_target() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("echo.sh");
        std::fs::write(
            &target,
            r#"[ "$1" = "--fast" ] && [ "$MODE" = "bench" ] || exit 7"#,
        )
        .unwrap();

        let ctx = ExecutionContext::new()
            .with_args(["--fast"])
            .with_env("MODE", "bench")
            .with_working_dir(dir.path());
        let instrumentation = CommandInstrumentation::new(vec!["sh".to_string()], "PERFCACHE_RECORDS");

        let raw = instrumentation.instrument(&target, &ctx).unwrap();
        assert_eq!(raw.stream().unwrap().count(), 0);
    }

    #[test]
    fn test_malformed_records_surface_when_streamed() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("garbled.sh");
        std::fs::write(&target, "printf 'not json\\n' > \"$PERFCACHE_RECORDS\"\n").unwrap();

        let instrumentation = CommandInstrumentation::new(vec!["sh".to_string()], "PERFCACHE_RECORDS");
        let raw = instrumentation.instrument(&target, &ExecutionContext::new()).unwrap();

        let first = raw.stream().unwrap().next().unwrap();
        assert!(matches!(first, Err(DataError::Malformed { line: 1, .. })));
    }

    #[test]
    fn test_stderr_tail_truncates_on_char_boundary() {
        let long = "é".repeat(STDERR_TAIL_BYTES);
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.starts_with("..."));
        assert!(tail.len() <= STDERR_TAIL_BYTES + 3);
    }
}
