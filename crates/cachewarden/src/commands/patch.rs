use colored::Colorize;
use cw_content::{Content, ContentIndex, PatchPipeline};
use miette::Result;

use super::{describe_patch, Context};
use crate::errors::CliError;
use crate::println_pad;

pub struct PatchContentsArgs {
    /// Patch only this id; otherwise every indexed world.
    pub id: Option<String>,
}

pub fn patch_contents(ctx: &Context, args: PatchContentsArgs) -> Result<()> {
    let index = ctx.open_index()?;
    let pipeline = ctx.pipeline()?;

    let targets = select_targets(&index, args.id.as_deref())?;
    if targets.is_empty() {
        println_pad!("{}", "No indexed worlds to patch".dimmed());
        return Ok(());
    }

    if pipeline.settings().dry_run {
        println_pad!("{}", "Dry run, nothing will be written".bright_yellow());
    }

    let mut failures = 0;
    for content in &targets {
        match pipeline_patch(&pipeline, &index, content) {
            Ok(line) => println_pad!("{} {} {}", "🩹".bright_green(), content.id.bright_cyan(), line),
            Err(CliError::Fatal { source }) => return Err(CliError::Fatal { source }.into()),
            Err(e) => {
                failures += 1;
                tracing::error!("Patching {} failed: {}", content.id, e);
                println_pad!("{} {} {}", "⚠️".bright_red(), content.id.bright_cyan(), e);
            }
        }
    }

    if failures > 0 {
        println_pad!(
            "{}",
            format!("{} of {} entries failed", failures, targets.len()).bright_red()
        );
    }
    Ok(())
}

fn pipeline_patch(
    pipeline: &PatchPipeline,
    index: &ContentIndex,
    content: &Content,
) -> Result<String, CliError> {
    let report = pipeline.patch(index, content)?;
    Ok(describe_patch(&report))
}

/// The requested entry, or every world sorted by id.
fn select_targets(index: &ContentIndex, id: Option<&str>) -> Result<Vec<Content>, CliError> {
    match id {
        Some(id) => index
            .lookup_by_id(id)
            .map(|content| vec![content])
            .ok_or_else(|| CliError::unknown_content(id)),
        None => {
            let mut worlds: Vec<Content> = index
                .snapshot()
                .into_iter()
                .filter(Content::is_world)
                .collect();
            worlds.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(worlds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_content::ContentType;

    fn content(id: &str, content_type: ContentType) -> Content {
        Content::new(
            id,
            content_type,
            id,
            1,
            format!("/cache/{}/00000001", id).into(),
        )
    }

    #[test]
    fn selects_worlds_only() {
        let index = ContentIndex::in_memory();
        index.insert(content("wrld_b", ContentType::World)).unwrap();
        index.insert(content("avtr_a", ContentType::Avatar)).unwrap();
        index.insert(content("wrld_a", ContentType::World)).unwrap();

        let ids: Vec<String> = select_targets(&index, None)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, ["wrld_a", "wrld_b"]);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let index = ContentIndex::in_memory();
        assert!(matches!(
            select_targets(&index, Some("wrld_missing")),
            Err(CliError::UnknownContent { .. })
        ));
    }
}
