//! Per-stage lock records and the protocol that guards them
//!
//! Each cache stage directory holds one lock record describing the verified
//! state of the stage: the signature of its output and the signatures of the
//! stages it was built from.
//!
//! # Lock States
//!
//! | State | Files present | Description |
//! |-------|---------------|-------------|
//! | Published | `LOCKFILE` | Idle, cached |
//! | InTransit | `.LOCKFILE` | Run in progress, or a run crashed |
//! | Uninitialized | none | Stage never ran successfully |
//! | Ambiguous | both | Acquire could not remove `LOCKFILE` |
//!
//! `InTransit` and `Ambiguous` are never resolved automatically.

pub mod protocol;
pub mod record;
pub mod validate;

pub use protocol::{
    inspect, with_lock, ExclusiveCreateLock, HardLinkLock, LockState, StageLock,
};
pub use record::LockRecord;
pub use validate::{
    check_shape, validate, validate_config, validate_experiment, validate_pair, validate_sample,
    validate_singleton,
};

use std::fmt;

/// Published lock record file name
pub const LOCK_FILE_NAME: &str = "LOCKFILE";

/// Staging lock record file name
pub const STAGING_LOCK_FILE_NAME: &str = ".LOCKFILE";

/// Dependency key naming the corpus signature
pub const CORPUS_KEY: &str = "corpus-signature";

/// Dependency key naming the sample signature
pub const SAMPLE_KEY: &str = "sample-signature";

/// Dependency key naming the configuration signature
pub const CONFIG_KEY: &str = "config-signature";

/// Pipeline stages in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Corpus,
    Sample,
    Config,
    Experiment,
}

impl Stage {
    /// Dependency keys a lock record for this stage must carry
    pub fn dependency_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Corpus => &[],
            Self::Sample => &[CORPUS_KEY],
            Self::Config => &[SAMPLE_KEY],
            Self::Experiment => &[SAMPLE_KEY, CONFIG_KEY],
        }
    }

    pub fn expected_dependency_count(&self) -> usize {
        self.dependency_keys().len()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Corpus => "corpus",
            Self::Sample => "sample",
            Self::Config => "config",
            Self::Experiment => "experiment",
        };
        write!(f, "{}", name)
    }
}
