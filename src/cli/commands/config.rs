//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::cli::commands::{CHECK, WARN};
use crate::config::{Config, ConfigManager};
use crate::error::LabResult;
use console::style;

/// Execute the config command
///
/// `config` is `None` when the action does not need the current
/// configuration loaded.
pub async fn execute(
    args: ConfigArgs,
    manager: &ConfigManager,
    config: Option<&Config>,
) -> LabResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config.cloned().unwrap_or_default())?,
        Some(ConfigAction::Path) => show_path(manager),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
    }

    Ok(())
}

/// Whether `action` can run without loading the configuration file
pub fn needs_config(args: &ConfigArgs) -> bool {
    matches!(args.action, None | Some(ConfigAction::Show))
}

fn show_config(config: Config) -> LabResult<()> {
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

async fn init_config(manager: &ConfigManager, force: bool) -> LabResult<()> {
    let path = manager.path();

    if path.exists() && !force {
        println!(
            "  {}Config already exists at {} - use --force to overwrite",
            WARN,
            style(path.display()).yellow()
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    println!(
        "  {}Configuration initialized at {}",
        CHECK,
        style(path.display()).green()
    );

    Ok(())
}
