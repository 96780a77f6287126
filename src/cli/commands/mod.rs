//! CLI command implementations

pub mod config;
pub mod decompress;
pub mod list;
pub mod script;
pub mod sign;
pub mod status;
pub mod verify;

pub use config::execute as config;
pub use decompress::execute as decompress;
pub use list::execute as list;
pub use script::execute as script;
pub use sign::execute as sign;
pub use status::execute as status;
pub use verify::execute as verify;

use crate::cache::StageCache;
use crate::config::{Config, LockBackend};
use crate::context::ExecContext;
use crate::error::{LabError, LabResult};
use crate::lock::{ExclusiveCreateLock, HardLinkLock, StageLock};
use console::Emoji;

pub(crate) static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
pub(crate) static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[FAIL] ");
pub(crate) static WARN: Emoji<'_, '_> = Emoji("⚠ ", "[WARN] ");
pub(crate) static SKIP: Emoji<'_, '_> = Emoji("- ", "[SKIP] ");

/// Stage cache for the configured experiment
pub(crate) fn stage_cache(config: &Config, ctx: ExecContext) -> StageCache {
    let lock: Box<dyn StageLock> = match config.general.lock_backend {
        LockBackend::HardLink => Box::new(HardLinkLock::new(ctx.clone())),
        LockBackend::ExclusiveCreate => Box::new(ExclusiveCreateLock::new(ctx.clone())),
    };
    StageCache::new(
        ctx,
        lock,
        &config.paths.experiment_root,
        &config.paths.corpus_root,
        &config.samples.names,
    )
}

/// Run synchronous cache work off the async runtime
pub(crate) async fn blocking<T, F>(work: F) -> LabResult<T>
where
    F: FnOnce() -> LabResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| LabError::Internal(format!("blocking task failed: {e}")))?
}
