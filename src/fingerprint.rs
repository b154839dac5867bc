//! Content-addressed fingerprints for per-function metrics
//!
//! A fingerprint identifies one observed performance state of a function:
//! the same `(source unit, function, inclusive time)` triple always hashes to
//! the same value, and any change in inclusive time produces a new one.
//!
//! # Encoding
//!
//! SHA-256 over a domain tag followed by length-prefixed fields:
//!
//! ```text
//! "perfcache.fp.v1" || u64le(len(unit)) || unit || u64le(len(name)) || name || f64le_bits(inclusive)
//! ```
//!
//! Length prefixes keep the field boundaries unambiguous for any function
//! name, so `("ab", "c")` and `("a", "bc")` never collide structurally.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const DOMAIN_TAG: &[u8] = b"perfcache.fp.v1";

/// Length of a rendered fingerprint (hex-encoded SHA-256)
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// Opaque, hex-encoded digest of a function's observed performance state
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already-rendered fingerprint string
    ///
    /// Returns `None` unless the input is exactly 64 lowercase hex characters.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == FINGERPRINT_HEX_LEN
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Fingerprint(hex.to_string()))
    }

    /// Hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for human-readable tables
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives fingerprints for metrics records
///
/// Stateless; exists so callers can hold the engine as a collaborator.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintEngine;

impl FingerprintEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute the fingerprint of a `(source unit, function, inclusive time)` triple
    ///
    /// Pure: no validation is performed on `inclusive_time`.
    pub fn compute(&self, source_unit: &str, function_name: &str, inclusive_time: f64) -> Fingerprint {
        compute_fingerprint(source_unit, function_name, inclusive_time)
    }
}

/// Free-function form of [`FingerprintEngine::compute`]
///
/// # Example
/// ```
/// use perfcache::fingerprint::compute_fingerprint;
///
/// let a = compute_fingerprint("app.py", "foo", 0.6);
/// let b = compute_fingerprint("app.py", "foo", 0.6);
/// assert_eq!(a, b);
/// assert_ne!(a, compute_fingerprint("app.py", "foo", 0.61));
/// ```
pub fn compute_fingerprint(source_unit: &str, function_name: &str, inclusive_time: f64) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_TAG);
    write_field(&mut hasher, source_unit.as_bytes());
    write_field(&mut hasher, function_name.as_bytes());
    hasher.update(inclusive_time.to_bits().to_le_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
