//! Streaming signature over an ordered sequence of blobs
//!
//! One pass over the inputs yields both a signature for each blob on its own
//! and a cumulative signature for the whole sequence. The cumulative signature
//! is the SHA-512 of the concatenated blobs, so order matters.

use crate::error::{LabError, LabResult};
use crate::signature::{sign_bytes, Signature};
use sha2::{Digest, Sha512};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Append-only SHA-512 accumulator
#[derive(Clone, Default)]
pub struct Accumulator {
    hasher: Sha512,
    blobs: usize,
}

impl fmt::Debug for Accumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accumulator")
            .field("blobs", &self.blobs)
            .finish_non_exhaustive()
    }
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `data` into the cumulative hash and return the signature of
    /// `data` alone.
    pub fn add(&mut self, data: &[u8]) -> Signature {
        self.hasher.update(data);
        self.blobs += 1;
        sign_bytes(data)
    }

    /// Cumulative signature of every blob added so far, in call order.
    ///
    /// Does not consume or reset the accumulator.
    pub fn finalize(&self) -> LabResult<Signature> {
        if self.blobs == 0 {
            return Err(LabError::NoData);
        }
        Ok(Signature::from_digest(&self.hasher.clone().finalize()))
    }

    /// Number of blobs added
    pub fn len(&self) -> usize {
        self.blobs
    }

    pub fn is_empty(&self) -> bool {
        self.blobs == 0
    }
}

/// Cumulative signature over the contents of `paths`, in order.
///
/// Manifest files end with a newline, so callers often pass an empty trailing
/// entry; empty paths are skipped.
pub fn sign_files<P: AsRef<Path>>(paths: &[P]) -> LabResult<Signature> {
    let mut accumulator = Accumulator::new();
    for path in paths {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            continue;
        }
        let data = fs::read(path).map_err(|e| {
            LabError::io(
                format!("reading {} to create signature", path.display()),
                e,
            )
        })?;
        accumulator.add(&data);
    }
    debug!("Signed {} files", accumulator.len());
    accumulator.finalize()
}
