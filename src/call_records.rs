//! Raw call-record stream (JSON Lines)
//!
//! The instrumentation runner writes one JSON object per line:
//!
//! ```text
//! {"sourceUnit":"app.py","functionName":"foo","callCount":3,"exclusiveTime":0.2,"inclusiveTime":0.6}
//! ```
//!
//! Blank lines are skipped. Anything else that does not parse, or carries
//! impossible timings, is a [`DataError::Malformed`] tagged with its line.

use crate::metrics::CallRecord;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Malformed or unreadable call-record input
#[derive(Error, Debug)]
pub enum DataError {
    #[error("failed to read call records: {0}")]
    Read(#[from] std::io::Error),

    #[error("malformed call record at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("failed to read source {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Iterator over call records parsed from a buffered reader
pub struct CallRecordReader<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: BufRead> CallRecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl CallRecordReader<BufReader<File>> {
    /// Open a JSON Lines record file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> Iterator for CallRecordReader<R> {
    type Item = Result<CallRecord, DataError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(DataError::Read(e))),
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            return Some(parse_line(&line, self.line_no));
        }
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<CallRecord, DataError> {
    let record: CallRecord = serde_json::from_str(line).map_err(|e| DataError::Malformed {
        line: line_no,
        reason: e.to_string(),
    })?;

    if let Some(reason) = record.validation_error() {
        return Err(DataError::Malformed {
            line: line_no,
            reason,
        });
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str) -> CallRecordReader<Cursor<Vec<u8>>> {
        CallRecordReader::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_reads_records_and_skips_blank_lines() {
        let text = r#"{"sourceUnit":"a.py","functionName":"foo","callCount":1,"exclusiveTime":0.1,"inclusiveTime":0.2}

{"sourceUnit":"a.py","functionName":"bar","callCount":2,"exclusiveTime":0.0,"inclusiveTime":0.0}
"#;
        let records: Vec<_> = reader(text).collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].function_name, "foo");
        assert_eq!(records[1].call_count, 2);
    }

    #[test]
    fn test_malformed_json_reports_line() {
        let text = "\n{\"sourceUnit\":\"a.py\"}\n";
        let err = reader(text).next().unwrap().unwrap_err();
        match err {
            DataError::Malformed { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_inconsistent_times_are_malformed() {
        let text = r#"{"sourceUnit":"a.py","functionName":"foo","callCount":1,"exclusiveTime":0.5,"inclusiveTime":0.2}"#;
        let err = reader(text).next().unwrap().unwrap_err();
        assert!(err.to_string().contains("less than exclusiveTime"));
    }

    #[test]
    fn test_negative_call_count_is_malformed() {
        let text = r#"{"sourceUnit":"a.py","functionName":"foo","callCount":-1,"exclusiveTime":0.1,"inclusiveTime":0.2}"#;
        assert!(matches!(
            reader(text).next(),
            Some(Err(DataError::Malformed { line: 1, .. }))
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        assert!(matches!(
            CallRecordReader::open("/nonexistent/perfcache/records.jsonl"),
            Err(DataError::Read(_))
        ));
    }
}
