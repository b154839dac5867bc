//! Persisted, content-addressed cache of metrics records
//!
//! Maps [`Fingerprint`] → [`CacheEntry`]. Entries are only ever added: a
//! fingerprint is derived from the record's content, so an existing entry
//! with the same fingerprint is the same observation and is left alone.
//!
//! # On-disk format
//!
//! A JSON array sorted ascending by fingerprint, so that two saves of the
//! same store produce byte-identical files:
//!
//! ```json
//! [
//!   {
//!     "fingerprint": "0c1f...",
//!     "record": {
//!       "sourceUnit": "app.py",
//!       "functionName": "foo",
//!       "callCount": 3,
//!       "exclusiveTime": 0.2,
//!       "inclusiveTime": 0.6
//!     }
//!   }
//! ]
//! ```
//!
//! Saves go through a temporary file in the destination directory that is
//! renamed over the target, so a failed or interrupted save leaves the
//! previous cache file untouched.
//!
//! The store assumes a single writer per cache file.

use crate::fingerprint::{Fingerprint, FingerprintEngine};
use crate::metrics::MetricsRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors reading or writing the persisted cache
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to read cache {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed cache {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("failed to write cache {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A stored `(fingerprint, record)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub record: MetricsRecord,
}

impl CacheEntry {
    /// Fingerprint a record and pair it with its digest
    pub fn from_record(engine: &FingerprintEngine, record: MetricsRecord) -> Self {
        let fingerprint = engine.compute(&record.source_unit, &record.function_name, record.inclusive_time);
        Self { fingerprint, record }
    }
}

/// Outcome of a [`CacheStore::merge`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Entries whose fingerprint was not yet cached
    pub new: usize,
    /// Entries whose fingerprint was already cached
    pub unchanged: usize,
    /// Fingerprints inserted by this merge, in input order
    pub new_fingerprints: Vec<Fingerprint>,
}

impl MergeReport {
    pub fn total(&self) -> usize {
        self.new + self.unchanged
    }
}

/// In-memory view of the persisted cache
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    entries: BTreeMap<Fingerprint, CacheEntry>,
}

impl CacheStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store persisted at `path`
    ///
    /// A missing file is the first-run case and yields an empty store. A file
    /// that exists but cannot be read or parsed is a [`StorageError`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no cache file yet; starting empty");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(StorageError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let list: Vec<CacheEntry> = serde_json::from_str(&contents).map_err(|e| StorageError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut entries = BTreeMap::new();
        for entry in list {
            if Fingerprint::from_hex(entry.fingerprint.as_str()).is_none() {
                return Err(StorageError::Malformed {
                    path: path.to_path_buf(),
                    reason: format!("invalid fingerprint {:?}", entry.fingerprint.as_str()),
                });
            }
            if let Some(reason) = entry.record.validation_error() {
                return Err(StorageError::Malformed {
                    path: path.to_path_buf(),
                    reason: format!("entry {}: {}", entry.fingerprint, reason),
                });
            }
            let fingerprint = entry.fingerprint.clone();
            if entries.insert(fingerprint.clone(), entry).is_some() {
                return Err(StorageError::Malformed {
                    path: path.to_path_buf(),
                    reason: format!("duplicate fingerprint {}", fingerprint),
                });
            }
        }

        tracing::debug!(path = %path.display(), entries = entries.len(), "loaded cache");
        Ok(Self { entries })
    }

    /// Insert entries whose fingerprint is not yet cached
    ///
    /// Existing entries are never replaced.
    pub fn merge<I>(&mut self, entries: I) -> MergeReport
    where
        I: IntoIterator<Item = CacheEntry>,
    {
        let mut report = MergeReport::default();

        for entry in entries {
            if self.entries.contains_key(&entry.fingerprint) {
                report.unchanged += 1;
            } else {
                report.new += 1;
                report.new_fingerprints.push(entry.fingerprint.clone());
                self.entries.insert(entry.fingerprint.clone(), entry);
            }
        }

        report
    }

    /// Atomically persist the store to `path`, entries sorted by fingerprint
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        let entries: Vec<&CacheEntry> = self.entries.values().collect();

        write_atomically(path, |file| {
            serde_json::to_writer_pretty(&mut *file, &entries).map_err(io::Error::from)?;
            file.write_all(b"\n")
        })?;

        tracing::debug!(path = %path.display(), entries = entries.len(), "saved cache");
        Ok(())
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&CacheEntry> {
        self.entries.get(fingerprint)
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Every cached state of one function, in fingerprint order
    pub fn lookup<'a>(
        &'a self,
        source_unit: &'a str,
        function_name: &'a str,
    ) -> impl Iterator<Item = &'a CacheEntry> + 'a {
        self.entries
            .values()
            .filter(move |e| e.record.source_unit == source_unit && e.record.function_name == function_name)
    }

    /// Entries in ascending fingerprint order
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Write `path` through a sibling temporary file and rename it into place
///
/// If `write` fails, or the rename does, the temporary file is removed and
/// whatever was at `path` before is left as it was.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<(), StorageError>
where
    F: FnOnce(&mut fs::File) -> io::Result<()>,
{
    let write_err = |source: io::Error| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    write(tmp.as_file_mut()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    Ok(())
}
