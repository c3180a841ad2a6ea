use colored::Colorize;
use cw_content::{Content, BLOCKLIST_MARKER};
use miette::{IntoDiagnostic, Result};

use super::Context;
use crate::println_pad;

pub struct ListContentsArgs {
    pub json: bool,
}

pub fn list_contents(ctx: &Context, args: ListContentsArgs) -> Result<()> {
    let index = ctx.open_index()?;
    let mut contents = index.snapshot();
    contents.sort_by(|a, b| a.id.cmp(&b.id));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&contents).into_diagnostic()?);
        return Ok(());
    }

    if contents.is_empty() {
        println_pad!("{}", "The index is empty, run `cachewarden scan` first".dimmed());
        return Ok(());
    }

    println_pad!(
        "{} {}",
        "📚 Indexed content:".bright_blue().bold(),
        contents.len().to_string().bright_white().bold()
    );
    for content in &contents {
        println_pad!("{}", describe(content));
    }
    Ok(())
}

fn describe(content: &Content) -> String {
    let actors: Vec<&str> = content
        .version_meta
        .patched_by
        .iter()
        .map(String::as_str)
        .filter(|actor| *actor != BLOCKLIST_MARKER)
        .collect();
    let blocklisted = content.version_meta.is_patched_by(BLOCKLIST_MARKER);

    let mut line = format!(
        "   {} {} {} {} {}",
        "•".bright_cyan(),
        content.id.bright_cyan().bold(),
        format!("[{}]", content.content_type).dimmed(),
        content.stable_name,
        format!("v{:08x}", content.version()).bright_white()
    );
    if !actors.is_empty() {
        line.push_str(&format!(" patched by {}", actors.join(", ")).bright_green().to_string());
    }
    if blocklisted {
        line.push_str(&" blocklisted".bright_yellow().to_string());
    }
    line
}
