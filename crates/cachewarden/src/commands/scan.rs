use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use cw_content::{
    IndexReconciler, InsertOutcome, PatchPipeline, Rejection, ScanReport, Scanner, Stage2Outcome,
};
use miette::Result;

use super::{describe_patch, Context};
use crate::errors::CliError;
use crate::println_pad;

pub struct ScanCacheArgs {
    /// Skip the patch pipeline for new and changed worlds.
    pub no_patch: bool,
    /// Only process this one directory instead of walking the cache.
    pub directory: Option<Utf8PathBuf>,
}

pub fn scan_cache(ctx: &Context, args: ScanCacheArgs) -> Result<()> {
    let index = ctx.open_index()?;
    let pipeline: Option<PatchPipeline> = if args.no_patch {
        None
    } else {
        Some(ctx.pipeline()?)
    };

    let mut scanner = Scanner::new(&index);
    if let Some(pipeline) = &pipeline {
        scanner = scanner.with_pipeline(pipeline);
    }

    if let Some(directory) = args.directory {
        let outcome = scanner
            .insert_directory(&directory)
            .map_err(CliError::from)?;
        print_insert(&directory, &outcome);
        return Ok(());
    }

    let cache_dir = ctx.cache_dir()?;
    let reconciled = IndexReconciler::new(&index)
        .reconcile()
        .map_err(CliError::from)?;
    if !reconciled.removed.is_empty() || !reconciled.retargeted.is_empty() {
        println_pad!(
            "{} {} removed, {} retargeted",
            "🧹 Reconciled:".bright_yellow(),
            reconciled.removed.len(),
            reconciled.retargeted.len()
        );
    }

    println_pad!(
        "{} {}",
        "🔎 Scanning:".bright_blue().bold(),
        cache_dir.as_str().bright_cyan().bold()
    );
    let report = scanner.scan(&cache_dir).map_err(CliError::from)?;
    print_report(&report);

    Ok(())
}

fn print_insert(directory: &Utf8Path, outcome: &InsertOutcome) {
    let line = match outcome {
        InsertOutcome::Rejected(rejection) => describe_rejection(rejection).dimmed().to_string(),
        InsertOutcome::Applied(stage2) => match stage2 {
            Stage2Outcome::Inserted(c) => format!("inserted {}", c.id.bright_green()),
            Stage2Outcome::Advanced(c) => format!(
                "advanced {} to version {:08x}",
                c.id.bright_green(),
                c.version()
            ),
            Stage2Outcome::Replaced(c) => format!("replaced {}", c.id.bright_green()),
            Stage2Outcome::Discarded => "discarded, the indexed copy wins".dimmed().to_string(),
            Stage2Outcome::Excluded => "excluded imposter".dimmed().to_string(),
            Stage2Outcome::Unresolved(id) => {
                format!("unresolved duplicate of {}", id.bright_red())
            }
        },
    };
    println_pad!("{} {}", directory.as_str().bright_cyan(), line);
}

fn describe_rejection(rejection: &Rejection) -> String {
    match rejection {
        Rejection::NotAnUpgrade { stored, found } => format!(
            "not an upgrade (indexed {:08x}, found {:08x})",
            stored, found
        ),
        Rejection::NoVersionDir => "no version directory".to_string(),
        Rejection::MissingData => "no data file".to_string(),
        Rejection::Unidentified => "no identity record".to_string(),
    }
}

fn print_report(report: &ScanReport) {
    println_pad!(
        "{} {} scanned, {} already known",
        "📂 Directories:".bright_magenta(),
        report.scanned,
        report.known
    );
    print_ids("✨ Inserted:", &report.inserted);
    print_ids("⬆️  Advanced:", &report.advanced);
    print_ids("🔁 Replaced:", &report.replaced);
    print_ids("❓ Unresolved:", &report.unresolved);

    if report.rejected + report.discarded + report.excluded > 0 {
        println_pad!(
            "{}",
            format!(
                "{} rejected, {} discarded, {} excluded",
                report.rejected, report.discarded, report.excluded
            )
            .dimmed()
        );
    }

    for (path, error) in &report.errors {
        println_pad!("{} {}: {}", "⚠️".bright_red(), path, error);
    }

    for patch in &report.patches {
        println_pad!(
            "{} {} {}",
            "🩹".bright_green(),
            patch.content_id.bright_cyan(),
            describe_patch(patch)
        );
    }
}

fn print_ids(label: &str, ids: &[String]) {
    if ids.is_empty() {
        return;
    }
    println_pad!("{} {}", label.bright_green(), ids.len());
    for id in ids {
        println_pad!("   {} {}", "•".bright_cyan(), id);
    }
}
