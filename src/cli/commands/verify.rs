//! Verify command - check the signature chain of published stages

use crate::cache::{StageCache, StageReport, Verdict};
use crate::cli::args::{OutputFormat, VerifyArgs};
use crate::cli::commands::{blocking, stage_cache, CHECK, CROSS, SKIP};
use crate::config::Config;
use crate::context::ExecContext;
use crate::error::{LabError, LabResult};
use crate::lock::Stage;
use console::style;
use serde_json::json;

/// Execute the verify command
pub async fn execute(args: VerifyArgs, config: &Config, ctx: ExecContext) -> LabResult<()> {
    let config = config.clone();
    let deep = args.deep;
    let reports = blocking(move || {
        let cache = stage_cache(&config, ctx);
        let config_sample = config.config_sample();
        let mut reports = cache.verify_all(config_sample);
        if deep {
            deepen(&cache, config_sample, &mut reports);
        }
        Ok(reports)
    })
    .await?;

    match args.format {
        OutputFormat::Table => print_table(&reports),
        OutputFormat::Json => print_json(&reports)?,
        OutputFormat::Plain => {
            for report in &reports {
                println!("{}\t{}", verdict_word(&report.verdict), report.label);
            }
        }
    }

    let failed = reports.iter().filter(|r| r.is_invalid()).count();
    if failed > 0 {
        return Err(LabError::VerificationFailed { failed });
    }
    Ok(())
}

/// Re-sign the contents of stages whose chain is valid
fn deepen(cache: &StageCache, config_sample: Option<&str>, reports: &mut [StageReport]) {
    // Sample reports come in layout order
    let mut samples = cache.layout().sample_names();

    for report in reports.iter_mut() {
        let checked = match report.stage {
            Stage::Sample => match samples.next() {
                Some(name) if report.is_valid() => cache.verify_sample_cache(name),
                _ => continue,
            },
            Stage::Config => match config_sample {
                Some(name) if report.is_valid() => cache.verify_config_cache(name),
                _ => continue,
            },
            Stage::Corpus | Stage::Experiment => continue,
        };
        if let Err(e) = checked {
            report.verdict = Verdict::Invalid(e);
        }
    }
}

fn verdict_word(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::Valid => "valid",
        Verdict::Skipped(_) => "skipped",
        Verdict::Invalid(_) => "invalid",
    }
}

fn print_table(reports: &[StageReport]) {
    println!("{}", style("Stage verification").bold().cyan());
    println!();

    for report in reports {
        match &report.verdict {
            Verdict::Valid => println!(
                "  {}{:<16} {}",
                CHECK,
                report.label,
                style("valid").green()
            ),
            Verdict::Skipped(reason) => println!(
                "  {}{:<16} {}",
                SKIP,
                report.label,
                style(reason).dim()
            ),
            Verdict::Invalid(e) => {
                println!("  {}{:<16} {}", CROSS, report.label, style(e).red());
                if let Some(hint) = e.hint() {
                    println!("  {:<18} {}", "", style(hint).yellow());
                }
            }
        }
    }
}

fn print_json(reports: &[StageReport]) -> LabResult<()> {
    let entries: Vec<_> = reports
        .iter()
        .map(|r| {
            let detail = match &r.verdict {
                Verdict::Valid => None,
                Verdict::Skipped(reason) => Some(reason.clone()),
                Verdict::Invalid(e) => Some(e.to_string()),
            };
            json!({
                "stage": r.stage.to_string(),
                "label": r.label,
                "directory": r.directory,
                "state": r.state,
                "verdict": verdict_word(&r.verdict),
                "detail": detail,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
