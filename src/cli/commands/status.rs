//! Status command - show the lock state of stage directories

use crate::cache::CacheLayout;
use crate::cli::args::{OutputFormat, StatusArgs};
use crate::cli::commands::{CHECK, CROSS, SKIP, WARN};
use crate::config::Config;
use crate::error::LabResult;
use crate::lock::{inspect, LockState};
use console::style;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct DirStatus {
    label: String,
    directory: PathBuf,
    state: LockState,
}

/// Execute the status command
pub async fn execute(args: StatusArgs, config: &Config) -> LabResult<()> {
    let targets = if args.dirs.is_empty() {
        configured_dirs(config)
    } else {
        args.dirs
            .into_iter()
            .map(|dir| (dir.display().to_string(), dir))
            .collect()
    };

    let statuses: Vec<DirStatus> = targets
        .into_iter()
        .map(|(label, directory)| {
            let state = inspect(&directory);
            DirStatus {
                label,
                directory,
                state,
            }
        })
        .collect();

    match args.format {
        OutputFormat::Table => print_table(&statuses),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
        OutputFormat::Plain => {
            for status in &statuses {
                println!("{}\t{}", status.state, status.directory.display());
            }
        }
    }

    Ok(())
}

fn configured_dirs(config: &Config) -> Vec<(String, PathBuf)> {
    let layout = CacheLayout::new(
        &config.paths.experiment_root,
        &config.paths.corpus_root,
        &config.samples.names,
    );

    let mut dirs = vec![("corpus".to_string(), layout.experiment_root().to_path_buf())];
    dirs.extend(
        layout
            .samples()
            .map(|(name, dir)| (format!("sample '{name}'"), dir.to_path_buf())),
    );
    dirs.push(("configuration".to_string(), layout.config_dir()));
    dirs.push(("results".to_string(), layout.results_dir()));
    dirs
}

fn print_table(statuses: &[DirStatus]) {
    println!("{}", style("Stage directories").bold().cyan());
    println!();

    for status in statuses {
        let (icon, state) = match status.state {
            LockState::Published => (&CHECK, style(status.state.to_string()).green()),
            LockState::Uninitialized => (&SKIP, style(status.state.to_string()).dim()),
            LockState::InTransit => (&WARN, style(status.state.to_string()).yellow()),
            LockState::Ambiguous => (&CROSS, style(status.state.to_string()).red()),
        };
        println!(
            "  {}{:<16} {:<14} {}",
            icon,
            status.label,
            state,
            style(status.directory.display()).dim()
        );
    }

    let attention: Vec<_> = statuses
        .iter()
        .filter(|s| matches!(s.state, LockState::InTransit | LockState::Ambiguous))
        .collect();
    if !attention.is_empty() {
        println!();
        println!(
            "{}",
            style("Some stages are held or were interrupted - check that no other run is active")
                .yellow()
                .bold()
        );
    }
}
