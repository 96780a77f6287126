//! SHA-512 signatures for cached pipeline artifacts
//!
//! A signature is the lowercase hex form of a SHA-512 digest. Signatures read
//! from disk or from configuration may be in any case; they are normalized
//! once when constructed, so comparisons are plain string equality.

pub mod accumulator;

pub use accumulator::{sign_files, Accumulator};

use crate::error::{LabError, LabResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::fmt;
use std::fs;
use std::path::Path;

/// Normalized hex fingerprint of a byte sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Signature(String);

impl Signature {
    /// Create a signature from a raw hex string, lowercasing it
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(normalize(raw.as_ref()))
    }

    /// The empty signature, carried by stages that have never run
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for display
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }

    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        // hex::encode already emits lowercase
        Self(hex::encode(digest))
    }
}

/// Put a raw signature string into canonical form
pub fn normalize(raw: &str) -> String {
    raw.to_lowercase()
}

impl From<String> for Signature {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for Signature {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<Signature> for String {
    fn from(signature: Signature) -> Self {
        signature.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<empty>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Sign a single blob of bytes
pub fn sign_bytes(data: &[u8]) -> Signature {
    let mut hasher = Sha512::new();
    hasher.update(data);
    Signature::from_digest(&hasher.finalize())
}

/// Sign the full contents of a file
pub fn sign_file(path: &Path) -> LabResult<Signature> {
    let data = fs::read(path)
        .map_err(|e| LabError::io(format!("reading {} for signature", path.display()), e))?;
    Ok(sign_bytes(&data))
}

/// Check that `data` hashes to `expected`
pub fn validate_data(data: &[u8], expected: &Signature) -> bool {
    sign_bytes(data) == *expected
}
