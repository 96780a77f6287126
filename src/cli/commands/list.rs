//! List command - show the files of the decompressed corpus

use crate::cli::args::{ListArgs, OutputFormat};
use crate::cli::commands::blocking;
use crate::config::Config;
use crate::corpus::list_files_under_directories;
use crate::error::{LabError, LabResult};
use crate::lock::{inspect, LockState};
use console::style;

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config) -> LabResult<()> {
    let experiment_root = config.paths.experiment_root.clone();
    let corpus_root = config.paths.corpus_root.clone();

    let files = blocking(move || {
        // Only a published corpus record proves the extraction finished
        if inspect(&experiment_root) != LockState::Published {
            return Err(LabError::NotDecompressed(corpus_root));
        }
        list_files_under_directories(&corpus_root)
    })
    .await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&files)?),
        OutputFormat::Plain => {
            for file in &files {
                println!("{}", file.display());
            }
        }
        OutputFormat::Table => {
            println!(
                "{} {}",
                style("Corpus files:").bold().cyan(),
                style(files.len()).bold()
            );
            for file in &files {
                println!("  {}", file.display());
            }
        }
    }

    Ok(())
}
