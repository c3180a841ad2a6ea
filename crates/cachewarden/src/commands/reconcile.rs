use colored::Colorize;
use cw_content::IndexReconciler;
use miette::Result;

use super::Context;
use crate::errors::CliError;
use crate::println_pad;

pub fn reconcile_index(ctx: &Context) -> Result<()> {
    let index = ctx.open_index()?;
    let report = IndexReconciler::new(&index)
        .reconcile()
        .map_err(CliError::from)?;

    println_pad!(
        "{} {} records checked",
        "🧹 Reconciled:".bright_blue().bold(),
        report.checked
    );
    for id in &report.removed {
        println_pad!("   {} {} {}", "•".bright_red(), id, "removed".dimmed());
    }
    for id in &report.retargeted {
        println_pad!("   {} {} {}", "•".bright_yellow(), id, "retargeted".dimmed());
    }
    for id in &report.stale {
        println_pad!(
            "   {} {} {}",
            "•".bright_white(),
            id,
            "no version directory, kept until one appears".dimmed()
        );
    }

    Ok(())
}
