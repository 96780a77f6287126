//! Script command - fetch the query log and write the replay script

use crate::cli::args::ScriptArgs;
use crate::cli::commands::{blocking, stage_cache, CHECK};
use crate::config::Config;
use crate::context::ExecContext;
use crate::error::{LabError, LabResult};
use console::style;

/// Execute the script command
pub async fn execute(args: ScriptArgs, config: &Config, ctx: ExecContext) -> LabResult<()> {
    let sample = args
        .sample
        .or_else(|| config.config_sample().map(str::to_string))
        .ok_or(LabError::NothingConfigured("samples"))?;
    let (url, signature) = match (&config.query_log.url, &config.query_log.signature) {
        (Some(url), Some(signature)) => (url.clone(), signature.clone()),
        _ => return Err(LabError::NothingConfigured("query log")),
    };

    let config = config.clone();
    let path = blocking(move || {
        let cache = stage_cache(&config, ctx);
        cache.fetch_and_write_replay_script(&sample, &url, &signature)
    })
    .await?;

    println!(
        "  {}Replay script written to {}",
        CHECK,
        style(path.display()).bold()
    );
    Ok(())
}
