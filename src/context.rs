//! Execution context for cache operations
//!
//! Every component that touches the filesystem takes an `ExecContext` in its
//! constructor. The context decides whether mutating operations are actually
//! performed and keeps a log of them.
//!
//! | Mode | Mutations | Operation log | Tracing |
//! |------|-----------|---------------|---------|
//! | Real | performed | not kept | debug |
//! | Simulate | skipped | kept | info |
//! | Test | performed | kept | none |
//!
//! Reads are always performed, so a simulated run still verifies signatures.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// How filesystem mutations are carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Perform every operation
    Real,
    /// Log mutations without performing them
    Simulate,
    /// Perform every operation and record it for assertions
    Test,
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real => write!(f, "real"),
            Self::Simulate => write!(f, "simulate"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// A filesystem mutation issued by the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FsOperation {
    Link { from: PathBuf, to: PathBuf },
    CreateNew { path: PathBuf },
    Remove { path: PathBuf },
    Write { path: PathBuf },
    CreateDir { path: PathBuf },
    Extract { archive: PathBuf, into: PathBuf },
}

impl fmt::Display for FsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link { from, to } => {
                write!(f, "[FS] link {} -> {}", from.display(), to.display())
            }
            Self::CreateNew { path } => write!(f, "[FS] create_new {}", path.display()),
            Self::Remove { path } => write!(f, "[FS] remove {}", path.display()),
            Self::Write { path } => write!(f, "[FS] write {}", path.display()),
            Self::CreateDir { path } => write!(f, "[FS] mkdir -p {}", path.display()),
            Self::Extract { archive, into } => {
                write!(f, "[FS] extract {} into {}", archive.display(), into.display())
            }
        }
    }
}

/// One entry of the operation log
#[derive(Debug, Clone, Serialize)]
pub struct LoggedOperation {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub operation: FsOperation,
}

/// Execution context shared by the lock backends, the corpus verifier and
/// the stage cache
#[derive(Debug, Clone)]
pub struct ExecContext {
    mode: ExecMode,
    log: Arc<Mutex<Vec<LoggedOperation>>>,
}

impl ExecContext {
    pub fn new(mode: ExecMode) -> Self {
        Self {
            mode,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Context that performs every operation
    pub fn real() -> Self {
        Self::new(ExecMode::Real)
    }

    /// Context that skips mutations (dry run)
    pub fn simulate() -> Self {
        Self::new(ExecMode::Simulate)
    }

    /// Context that performs and records every operation
    pub fn test() -> Self {
        Self::new(ExecMode::Test)
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn is_simulated(&self) -> bool {
        self.mode == ExecMode::Simulate
    }

    /// Issue a filesystem mutation.
    ///
    /// In simulate mode `perform` is not called and `T::default()` is
    /// returned.
    pub fn run<T, F>(&self, operation: FsOperation, perform: F) -> std::io::Result<T>
    where
        T: Default,
        F: FnOnce() -> std::io::Result<T>,
    {
        match self.mode {
            ExecMode::Real => {
                debug!("{}", operation);
                perform()
            }
            ExecMode::Simulate => {
                info!("[dry-run] {}", operation);
                self.record(operation);
                Ok(T::default())
            }
            ExecMode::Test => {
                self.record(operation);
                perform()
            }
        }
    }

    /// Snapshot of the recorded operations
    pub fn operations(&self) -> Vec<FsOperation> {
        self.log
            .lock()
            .map(|log| log.iter().map(|entry| entry.operation.clone()).collect())
            .unwrap_or_default()
    }

    /// Snapshot of the recorded operations with timestamps
    pub fn operation_log(&self) -> Vec<LoggedOperation> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn reset_operations(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.clear();
        }
    }

    fn record(&self, operation: FsOperation) {
        if let Ok(mut log) = self.log.lock() {
            log.push(LoggedOperation {
                at: Utc::now(),
                operation,
            });
        }
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::real()
    }
}
