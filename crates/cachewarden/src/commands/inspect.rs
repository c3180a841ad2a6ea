use std::fs::File;
use std::io::BufReader;

use camino::Utf8PathBuf;
use colored::Colorize;
use cw_bundle::{Bundle, BundleHeader};
use cw_content::{identify, layout};
use miette::Result;

use crate::errors::CliError;
use crate::println_pad;
use crate::utils::format_bytes;

pub struct InspectBundleArgs {
    /// A version directory or a data file.
    pub path: Utf8PathBuf,
}

pub fn inspect_bundle(args: InspectBundleArgs) -> Result<()> {
    let data_path = if args.path.is_dir() {
        layout::data_file(&args.path)
    } else {
        args.path.clone()
    };

    let file = File::open(&data_path)
        .map_err(|e| miette::miette!("Failed to open '{}': {}", data_path, e))?;
    let header = BundleHeader::read_from(&mut BufReader::new(file))
        .map_err(|e| CliError::bundle(data_path.clone(), e))?;

    println_pad!(
        "{} {}",
        "📦 Bundle:".bright_blue().bold(),
        data_path.as_str().bright_cyan().bold()
    );
    println_pad!(
        "{} {} ({} on disk, {} declared)",
        "🧱 Blocks:".bright_green(),
        header.blocks.len(),
        format_bytes(header.declared_compressed_size()),
        format_bytes(header.declared_uncompressed_size())
    );
    for (i, block) in header.blocks.iter().enumerate() {
        println_pad!(
            "   {} {} {}",
            "•".bright_cyan(),
            format!("#{}", i).bright_white(),
            format!(
                "{:?}, {} -> {}",
                block.compression,
                format_bytes(u64::from(block.compressed_size)),
                format_bytes(u64::from(block.uncompressed_size))
            )
            .dimmed()
        );
    }

    let bundle = Bundle::open(data_path.as_std_path())
        .map_err(|e| CliError::bundle(data_path.clone(), e))?;
    println_pad!(
        "{} {}",
        "🗂️  Records:".bright_magenta(),
        bundle.records().len()
    );

    match identify::identify_bundle(&bundle, &data_path).map_err(CliError::from)? {
        Some((id, content_type)) => {
            println_pad!(
                "{} {} {}",
                "🏷️ Identity:".bright_yellow(),
                id.bright_white().bold(),
                format!("[{}]", content_type).dimmed()
            );
            if content_type == cw_content::ContentType::Avatar
                && identify::is_imposter_bundle(&bundle)
            {
                println_pad!("{}", "   imposter avatar".bright_red());
            }
        }
        None => println_pad!("{} {}", "🏷️ Identity:".bright_yellow(), "none".dimmed()),
    }

    match identify::engine_version_of(&bundle, &data_path) {
        Ok(version) => println_pad!("{} {}", "⚙️  Engine:".bright_yellow(), version),
        Err(e) => println_pad!("{} {}", "⚙️  Engine:".bright_yellow(), e.to_string().dimmed()),
    }

    let version_dir = layout::normalize_version_dir(&data_path);
    if let Some(stable_name) = layout::stable_name_of(&version_dir) {
        println_pad!("{} {}", "📁 Stable name:".bright_yellow(), stable_name);
    }

    tracing::debug!("Inspected {} ({} blocks)", data_path, header.blocks.len());
    Ok(())
}
