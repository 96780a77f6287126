//! Decompress command - verify and extract the corpus

use crate::cli::commands::{blocking, stage_cache, CHECK};
use crate::config::Config;
use crate::context::ExecContext;
use crate::corpus::CorpusVerifier;
use crate::error::{LabError, LabResult};
use crate::lock::{inspect, LockState};
use console::style;
use tracing::info;

/// Execute the decompress command
///
/// Initializes the corpus stage on first use and updates it afterwards. The
/// configuration manifest is rewritten from the extracted files either way.
pub async fn execute(config: &Config, ctx: ExecContext) -> LabResult<()> {
    if config.corpus.archives.is_empty() {
        return Err(LabError::NothingConfigured("corpus archives"));
    }

    let config = config.clone();
    let dry_run = ctx.is_simulated();
    let (signature, files) = blocking(move || {
        let cache = stage_cache(&config, ctx.clone());
        let archives = &config.corpus.archives;
        let mut verifier = CorpusVerifier::with_tar_gz(ctx, &config.paths.corpus_root);

        let signature = match inspect(cache.layout().experiment_root()) {
            LockState::Uninitialized => {
                info!("Corpus stage is new, initializing");
                cache.init_corpus_cache(|| verifier.decompress(archives))?
            }
            _ => cache.update_corpus_cache(|| verifier.decompress(archives))?,
        };

        let files = verifier.list_corpus_files()?;
        cache.write_config_manifest(&files)?;
        Ok((signature, files.len()))
    })
    .await?;

    println!("  {}Corpus signature {}", CHECK, style(signature.short()).green());
    println!("  {}{} corpus files", CHECK, files);
    if dry_run {
        println!("{}", style("Dry run: no files were changed").yellow());
    }
    Ok(())
}
