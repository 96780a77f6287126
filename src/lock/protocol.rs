//! Acquire/release protocol over a stage directory's lock files
//!
//! Acquiring moves `LOCKFILE` to `.LOCKFILE`; releasing moves it back with
//! the updated record. The move is a hard link followed by a delete. Link
//! creation fails if the target exists, so at most one process can hold a
//! stage at a time. There is no waiting: a contended acquire fails
//! immediately.
//!
//! Release is not crash-atomic. A crash after `.LOCKFILE` is written but
//! before it is linked back leaves the stage `InTransit`, and the operator
//! decides what to do with it.

use crate::context::{ExecContext, FsOperation};
use crate::error::{LabError, LabResult};
use crate::lock::record::LockRecord;
use crate::lock::{LOCK_FILE_NAME, STAGING_LOCK_FILE_NAME};
use serde::Serialize;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive access to a stage directory's lock record
pub trait StageLock {
    /// Take the published record out of `directory`
    fn acquire(&self, directory: &Path) -> LabResult<LockRecord>;

    /// Publish `record` back into `directory`
    fn release(&self, directory: &Path, record: &LockRecord) -> LabResult<()>;

    /// Publish the first record of a stage that has never run
    fn publish(&self, directory: &Path, record: &LockRecord) -> LabResult<()>;

    /// Human-readable backend name
    fn backend_name(&self) -> &'static str;
}

/// Observable state of a stage directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Published,
    InTransit,
    Uninitialized,
    Ambiguous,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Published => write!(f, "published"),
            Self::InTransit => write!(f, "in transit"),
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Ambiguous => write!(f, "ambiguous"),
        }
    }
}

/// Classify a stage directory without touching it
pub fn inspect(directory: &Path) -> LockState {
    let published = published_path(directory).exists();
    let staging = staging_path(directory).exists();
    match (published, staging) {
        (true, false) => LockState::Published,
        (false, true) => LockState::InTransit,
        (false, false) => LockState::Uninitialized,
        (true, true) => LockState::Ambiguous,
    }
}

/// Path of the published lock file in `directory`
pub fn published_path(directory: &Path) -> PathBuf {
    directory.join(LOCK_FILE_NAME)
}

/// Path of the staging lock file in `directory`
pub fn staging_path(directory: &Path) -> PathBuf {
    directory.join(STAGING_LOCK_FILE_NAME)
}

/// Run `work` while holding the lock on `directory`.
///
/// The record is released on every exit path, including when `work` fails.
/// A failed `work` releases the record as it was acquired, so partial
/// updates are never published. The first error wins: a release failure
/// after a failed `work` is logged and the `work` error is returned.
pub fn with_lock<L, T, F>(lock: &L, directory: &Path, work: F) -> LabResult<T>
where
    L: StageLock + ?Sized,
    F: FnOnce(&mut LockRecord) -> LabResult<T>,
{
    let acquired = lock.acquire(directory)?;
    let mut record = acquired.clone();
    let outcome = work(&mut record);
    let released = match outcome {
        Ok(_) => lock.release(directory, &record),
        Err(_) => lock.release(directory, &acquired),
    };

    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_err)) => Err(release_err),
        (Err(work_err), Ok(())) => Err(work_err),
        (Err(work_err), Err(release_err)) => {
            warn!(
                "Failed to release lock in {} after error: {}",
                directory.display(),
                release_err
            );
            Err(work_err)
        }
    }
}

/// Write `record` to `path`, truncating, and sync it to disk
fn write_record(ctx: &ExecContext, path: &Path, record: &LockRecord) -> LabResult<()> {
    let content = record.to_yaml()?;
    ctx.run(
        FsOperation::Write {
            path: path.to_path_buf(),
        },
        || {
            let mut file = File::create(path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()
        },
    )
    .map_err(|e| LabError::io(format!("writing lock file {}", path.display()), e))
}

/// Read the record just acquired. A simulated acquire never moved the file,
/// so the published copy is read instead.
fn read_acquired(ctx: &ExecContext, published: &Path, staging: &Path) -> LabResult<LockRecord> {
    let source = if ctx.is_simulated() { published } else { staging };
    let content = fs::read_to_string(source)
        .map_err(|e| LabError::io(format!("reading lock file {}", source.display()), e))?;
    let mut record = LockRecord::from_yaml(&content, staging.display().to_string())?;
    record.set_locked(true);
    Ok(record)
}

/// A simulated acquire skips the link, so contention is checked up front to
/// report the same errors a real run would.
fn check_simulated_acquire(published: &Path, staging: &Path) -> LabResult<()> {
    if staging.exists() {
        return Err(LabError::DestinationExists {
            path: staging.to_path_buf(),
        });
    }
    if !published.exists() {
        return Err(LabError::SourceDoesNotExist {
            path: published.to_path_buf(),
        });
    }
    Ok(())
}

fn check_not_initialized(directory: &Path) -> LabResult<()> {
    match inspect(directory) {
        LockState::Uninitialized => Ok(()),
        _ => Err(LabError::AlreadyInitialized {
            path: directory.to_path_buf(),
        }),
    }
}

/// Lock backend built on hard links
#[derive(Debug, Clone)]
pub struct HardLinkLock {
    ctx: ExecContext,
}

impl HardLinkLock {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }

    fn link(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        self.ctx.run(
            FsOperation::Link {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
            },
            || fs::hard_link(from, to),
        )
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        self.ctx.run(
            FsOperation::Remove {
                path: path.to_path_buf(),
            },
            || fs::remove_file(path),
        )
    }
}

impl StageLock for HardLinkLock {
    fn acquire(&self, directory: &Path) -> LabResult<LockRecord> {
        let published = published_path(directory);
        let staging = staging_path(directory);

        if self.ctx.is_simulated() {
            check_simulated_acquire(&published, &staging)?;
        }

        if let Err(e) = self.link(&published, &staging) {
            return Err(match e.kind() {
                // link(2) reports a missing source before an existing target
                ErrorKind::NotFound if staging.exists() => {
                    LabError::DestinationExists { path: staging }
                }
                ErrorKind::NotFound => LabError::SourceDoesNotExist { path: published },
                ErrorKind::AlreadyExists => LabError::DestinationExists { path: staging },
                _ => LabError::Unknown {
                    path: published,
                    source: e,
                },
            });
        }

        self.remove(&published)
            .map_err(|e| LabError::CouldNotRemoveSource {
                path: published.clone(),
                source: e,
            })?;

        debug!("Acquired lock in {}", directory.display());
        read_acquired(&self.ctx, &published, &staging)
    }

    fn release(&self, directory: &Path, record: &LockRecord) -> LabResult<()> {
        let published = published_path(directory);
        let staging = staging_path(directory);

        write_record(&self.ctx, &staging, record)?;

        if let Err(e) = self.link(&staging, &published) {
            return Err(match e.kind() {
                ErrorKind::NotFound => LabError::ReleaseStagingMissing { path: staging },
                ErrorKind::AlreadyExists => LabError::ReleasePublishedExists { path: published },
                _ => LabError::ReleaseLink {
                    path: staging,
                    source: e,
                },
            });
        }

        self.remove(&staging)
            .map_err(|e| LabError::ReleaseRemoveStaging {
                path: staging.clone(),
                source: e,
            })?;

        debug!("Released lock in {}", directory.display());
        Ok(())
    }

    fn publish(&self, directory: &Path, record: &LockRecord) -> LabResult<()> {
        check_not_initialized(directory)?;
        // Stage through .LOCKFILE so a crash mid-write never leaves a
        // truncated LOCKFILE that looks valid.
        self.release(directory, record)
    }

    fn backend_name(&self) -> &'static str {
        "hard-link"
    }
}

/// Lock backend built on exclusive file creation (`O_EXCL`)
///
/// Acquire claims `.LOCKFILE` with `create_new`, copies the published record
/// into it and removes `LOCKFILE`. Release creates `LOCKFILE` the same way.
#[derive(Debug, Clone)]
pub struct ExclusiveCreateLock {
    ctx: ExecContext,
}

impl ExclusiveCreateLock {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }

    fn create_exclusive(&self, path: &Path, content: &[u8]) -> std::io::Result<()> {
        self.ctx.run(
            FsOperation::CreateNew {
                path: path.to_path_buf(),
            },
            || {
                let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
                file.write_all(content)?;
                file.sync_all()
            },
        )
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        self.ctx.run(
            FsOperation::Remove {
                path: path.to_path_buf(),
            },
            || fs::remove_file(path),
        )
    }
}

impl StageLock for ExclusiveCreateLock {
    fn acquire(&self, directory: &Path) -> LabResult<LockRecord> {
        let published = published_path(directory);
        let staging = staging_path(directory);

        if self.ctx.is_simulated() {
            check_simulated_acquire(&published, &staging)?;
        }

        let content = match fs::read(&published) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Report contention before absence, like the hard-link backend
                if staging.exists() {
                    return Err(LabError::DestinationExists { path: staging });
                }
                return Err(LabError::SourceDoesNotExist { path: published });
            }
            Err(e) => {
                return Err(LabError::Unknown {
                    path: published,
                    source: e,
                })
            }
        };

        if let Err(e) = self.create_exclusive(&staging, &content) {
            return Err(match e.kind() {
                ErrorKind::AlreadyExists => LabError::DestinationExists { path: staging },
                _ => LabError::Unknown {
                    path: published,
                    source: e,
                },
            });
        }

        // NotFound here means another process released and re-acquired
        // between our read and our claim, so our copy may be stale. Either
        // way both files need an operator.
        self.remove(&published)
            .map_err(|e| LabError::CouldNotRemoveSource {
                path: published.clone(),
                source: e,
            })?;

        debug!("Acquired lock in {}", directory.display());
        read_acquired(&self.ctx, &published, &staging)
    }

    fn release(&self, directory: &Path, record: &LockRecord) -> LabResult<()> {
        let published = published_path(directory);
        let staging = staging_path(directory);

        write_record(&self.ctx, &staging, record)?;
        let content = record.to_yaml()?;

        if let Err(e) = self.create_exclusive(&published, content.as_bytes()) {
            return Err(match e.kind() {
                ErrorKind::AlreadyExists => LabError::ReleasePublishedExists { path: published },
                _ => LabError::ReleaseLink {
                    path: staging,
                    source: e,
                },
            });
        }

        self.remove(&staging)
            .map_err(|e| LabError::ReleaseRemoveStaging {
                path: staging.clone(),
                source: e,
            })?;

        debug!("Released lock in {}", directory.display());
        Ok(())
    }

    fn publish(&self, directory: &Path, record: &LockRecord) -> LabResult<()> {
        check_not_initialized(directory)?;
        self.release(directory, record)
    }

    fn backend_name(&self) -> &'static str {
        "exclusive-create"
    }
}
