//! Sign command - print file signatures

use crate::cli::args::SignArgs;
use crate::cli::commands::blocking;
use crate::error::{LabError, LabResult};
use crate::signature::{Accumulator, Signature};
use console::style;
use std::path::PathBuf;

/// Execute the sign command
///
/// Prints one `<signature>  <path>` line per file, like `sha512sum`, and a
/// cumulative line when more than one file is given.
pub async fn execute(args: SignArgs) -> LabResult<()> {
    let files = args.files;
    let count = files.len();
    let (per_file, cumulative) = blocking(move || sign_all(files)).await?;

    for (path, signature) in &per_file {
        println!("{}  {}", signature, path.display());
    }
    if count > 1 {
        println!("{}  {}", cumulative, style("(cumulative)").dim());
    }
    Ok(())
}

fn sign_all(files: Vec<PathBuf>) -> LabResult<(Vec<(PathBuf, Signature)>, Signature)> {
    let mut accumulator = Accumulator::new();
    let mut per_file = Vec::with_capacity(files.len());
    for path in files {
        let data = std::fs::read(&path)
            .map_err(|e| LabError::io(format!("reading {}", path.display()), e))?;
        let signature = accumulator.add(&data);
        per_file.push((path, signature));
    }
    Ok((per_file, accumulator.finalize()?))
}
