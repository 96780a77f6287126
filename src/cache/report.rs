//! Read-only verification reports

use crate::error::{LabError, LabResult};
use crate::lock::protocol::{published_path, staging_path};
use crate::lock::{LockState, Stage};
use std::io;
use std::path::PathBuf;

/// Outcome of checking one stage
#[derive(Debug)]
pub enum Verdict {
    /// Record present and consistent with its upstream stages
    Valid,
    /// Nothing to check, with the reason
    Skipped(String),
    Invalid(LabError),
}

/// Verification result for one stage directory
#[derive(Debug)]
pub struct StageReport {
    pub stage: Stage,
    pub label: String,
    pub directory: PathBuf,
    pub state: LockState,
    pub verdict: Verdict,
}

impl StageReport {
    pub(crate) fn new(stage: Stage, label: String, directory: PathBuf, state: LockState) -> Self {
        let verdict = match state {
            LockState::Published => Verdict::Valid,
            LockState::Uninitialized => Verdict::Skipped(format!("stage is {state}")),
            // Held or crashed: an operator has to look before anything runs
            LockState::InTransit => Verdict::Invalid(LabError::DestinationExists {
                path: staging_path(&directory),
            }),
            LockState::Ambiguous => Verdict::Invalid(LabError::CouldNotRemoveSource {
                path: published_path(&directory),
                source: io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "both LOCKFILE and .LOCKFILE are present",
                ),
            }),
        };
        Self {
            stage,
            label,
            directory,
            state,
            verdict,
        }
    }

    /// Run `check` against `upstream` unless this stage already failed or was
    /// skipped.
    pub(crate) fn check<U>(&mut self, upstream: Option<U>, check: impl FnOnce(U) -> LabResult<()>) {
        if !self.is_valid() {
            return;
        }
        self.verdict = match upstream {
            None => Verdict::Skipped("upstream stage is not available".to_string()),
            Some(upstream) => match check(upstream) {
                Ok(()) => Verdict::Valid,
                Err(e) => Verdict::Invalid(e),
            },
        };
    }

    pub(crate) fn fail(&mut self, error: LabError) {
        self.verdict = Verdict::Invalid(error);
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.verdict, Verdict::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.verdict, Verdict::Invalid(_))
    }
}
