//! Labstage - staged experiment cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use labstage::cli::{commands, Cli, Commands};
use labstage::config::{ConfigManager, LogFormat, RunMode};
use labstage::context::ExecContext;
use labstage::error::LabResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> LabResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    // Config path/init must work even when the file is broken
    if let Commands::Config(args) = cli.command {
        let config = if commands::config::needs_config(&args) {
            Some(config_manager.load().await?)
        } else {
            None
        };
        let log_format = config
            .as_ref()
            .map(|c| c.general.log_format)
            .unwrap_or_default();
        init_logging(cli.verbose, log_format);
        return commands::config(args, &config_manager, config.as_ref()).await;
    }

    let config = config_manager.load().await?;
    init_logging(cli.verbose, config.general.log_format);

    let ctx = if cli.dry_run || config.general.mode == RunMode::Simulate {
        ExecContext::simulate()
    } else {
        ExecContext::real()
    };
    debug!("Running in {} mode", ctx.mode());

    match cli.command {
        Commands::Status(args) => commands::status(args, &config).await,
        Commands::Sign(args) => commands::sign(args).await,
        Commands::Decompress => commands::decompress(&config, ctx).await,
        Commands::Verify(args) => commands::verify(args, &config, ctx).await,
        Commands::List(args) => commands::list(args, &config).await,
        Commands::Script(args) => commands::script(args, &config, ctx).await,
        Commands::Config(_) => unreachable!("Config handled above"),
    }
}

/// Initialize logging: 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, format: LogFormat) {
    let filter = match verbose {
        0 => EnvFilter::new("labstage=warn"),
        1 => EnvFilter::new("labstage=info"),
        _ => EnvFilter::new("labstage=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
