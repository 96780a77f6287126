//! Error types for labstage
//!
//! All modules use `LabResult<T>` as their return type.

use crate::signature::Signature;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for labstage operations
pub type LabResult<T> = Result<T, LabError>;

/// All errors that can occur in labstage
#[derive(Error, Debug)]
pub enum LabError {
    // Accumulation errors
    #[error("No data accumulated in signature accumulator")]
    NoData,

    // Lock acquisition errors
    #[error("Could not acquire lock file at {path} because it does not exist")]
    SourceDoesNotExist { path: PathBuf },

    #[error(
        "Could not acquire lock file because {path} already exists. Another process \
         holds this stage, or a previous run crashed before releasing it"
    )]
    DestinationExists { path: PathBuf },

    #[error(
        "Could not acquire lock file at {path}: the staging copy was created but \
         the published lock file could not be removed: {source}"
    )]
    CouldNotRemoveSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not acquire lock file at {path}: {source}")]
    Unknown {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Lock release errors
    #[error("Could not release lock: staging file {path} does not exist")]
    ReleaseStagingMissing { path: PathBuf },

    #[error("Could not release lock: published lock file {path} already exists")]
    ReleasePublishedExists { path: PathBuf },

    #[error("Could not release lock file at {path}: {source}")]
    ReleaseLink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Lock file was published but staging file {path} could not be removed: {source}")]
    ReleaseRemoveStaging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stage at {path} is already initialized")]
    AlreadyInitialized { path: PathBuf },

    #[error("Failed to parse lock file {path}: {source}")]
    LockRecordParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    // Validation errors
    #[error("{stage} lock file {name} must have exactly {expected} dependency signature(s), found {found}")]
    WrongDependencyCount {
        stage: String,
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Lock file {name} has no dependency signature for '{key}'")]
    MissingDependencyKey { name: String, key: String },

    #[error("Lock file {name} has an empty signature for '{key}'")]
    EmptySignature { name: String, key: String },

    #[error(
        "Lock file {name} records '{key}' as {recorded}, but the upstream stage {upstream} \
         has signature {actual}"
    )]
    SignatureMismatch {
        name: String,
        key: String,
        upstream: String,
        recorded: Signature,
        actual: Signature,
    },

    // Corpus errors
    #[error("Corpus file {0} does not exist")]
    ArchiveMissing(PathBuf),

    #[error("Failed to read corpus file {path}: {source}")]
    ArchiveRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corpus file {0} is not a .tar.gz archive")]
    ArchiveFormat(PathBuf),

    #[error(
        "Signature of corpus file {path} is {actual}, expected {expected}. Does the \
         experiment definition reference the right file?"
    )]
    ArchiveSignatureMismatch {
        path: PathBuf,
        expected: Signature,
        actual: Signature,
    },

    #[error("Failed to extract corpus file {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corpus at {0} has already been decompressed")]
    AlreadyDecompressed(PathBuf),

    #[error("Corpus at {0} has not been decompressed")]
    NotDecompressed(PathBuf),

    // Stage cache errors
    #[error("Sample '{0}' is not part of this experiment")]
    UnknownSample(String),

    #[error("Configuration directory {path} is missing artifacts: {missing}")]
    ConfigArtifactsMissing { path: PathBuf, missing: String },

    #[error("Failed to fetch query log from {url}: {reason}")]
    QueryLogFetch { url: String, reason: String },

    #[error("Query log at {url} has signature {actual}, expected {expected}")]
    QueryLogSignatureMismatch {
        url: String,
        expected: Signature,
        actual: Signature,
    },

    #[error("{failed} stage(s) failed verification")]
    VerificationFailed { failed: usize },

    // Configuration errors
    #[error("No {0} configured")]
    NothingConfigured(&'static str),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LabError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether a person has to look at the cache directory before anything
    /// can touch this stage again.
    pub fn requires_operator(&self) -> bool {
        matches!(
            self,
            Self::DestinationExists { .. } | Self::CouldNotRemoveSource { .. }
        )
    }

    /// Whether the error means the cached data is out of date
    pub fn is_stale_cache(&self) -> bool {
        matches!(
            self,
            Self::SignatureMismatch { .. } | Self::ArchiveSignatureMismatch { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::DestinationExists { .. } => Some(
                "If no other process is using this directory, move .LOCKFILE to LOCKFILE \
                 and try again. If you think .LOCKFILE is corrupt, delete and regenerate \
                 the directory",
            ),
            Self::CouldNotRemoveSource { .. } => Some(
                "Both LOCKFILE and .LOCKFILE now exist. Check that no other process holds \
                 .LOCKFILE, then remove it and try again",
            ),
            Self::ReleasePublishedExists { .. } | Self::ReleaseRemoveStaging { .. } => {
                Some("Inspect LOCKFILE and .LOCKFILE in this directory and keep the newer one")
            }
            Self::SignatureMismatch { .. } => {
                Some("The cached stage is stale; regenerate it and its dependents")
            }
            Self::AlreadyInitialized { .. } => {
                Some("Run the update flow instead, or delete the stage directory")
            }
            Self::SourceDoesNotExist { .. } => Some("This stage has not been run yet"),
            Self::VerificationFailed { .. } => {
                Some("Regenerate the failed stages and every stage built from them")
            }
            Self::NothingConfigured(_) => {
                Some("Add it to the file shown by `labstage config path`")
            }
            _ => None,
        }
    }
}
