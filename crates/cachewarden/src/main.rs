use camino::Utf8PathBuf;
use clap::builder::{styling::AnsiColor, Styles};
use clap::ColorChoice;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use commands::{
    inspect_bundle, list_contents, patch_contents, reconcile_index, scan_cache, Context,
    InspectBundleArgs, ListContentsArgs, PatchContentsArgs, ScanCacheArgs,
};
use miette::Result;
use utils::config::{default_log_dir, load_config};
use utils::logging::{cleanup_old_logs, init_logging};

mod commands;
mod errors;
mod utils;

const LOG_RETENTION_DAYS: u64 = 7;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Cache root holding one directory per stable name
    #[arg(long, global = true)]
    cache_dir: Option<Utf8PathBuf>,

    /// Where the content index is stored
    #[arg(long, global = true)]
    index: Option<Utf8PathBuf>,

    /// Run plugins and the blocklist without writing anything
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile the index, then index new content in the cache
    Scan {
        /// Do not run the patch pipeline on new or changed worlds
        #[arg(long)]
        no_patch: bool,

        /// Process a single new version directory instead of the whole cache
        #[arg(short, long)]
        directory: Option<Utf8PathBuf>,
    },
    /// Repair index records whose directories changed on disk
    Reconcile,
    /// Run the patch pipeline over indexed worlds
    Patch {
        /// The content id to patch; every world when omitted
        #[arg(short, long)]
        id: Option<String>,
    },
    /// List indexed content
    List {
        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the header, identity and engine version of a bundle
    Inspect {
        /// A version directory or its data file
        path: Utf8PathBuf,
    },
}

fn parse_args() -> Args {
    // Configure colored/styled help output
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default())
        .placeholder(AnsiColor::Blue.on_default());

    let matches = Args::command()
        .styles(styles)
        .color(ColorChoice::Auto)
        .get_matches();

    Args::from_arg_matches(&matches).expect("failed to parse arguments")
}

fn main() -> Result<()> {
    let args = parse_args();

    let log_dir = default_log_dir();
    let (_log_guard, log_dir) = init_logging(log_dir);
    if let Some(log_dir) = &log_dir {
        cleanup_old_logs(log_dir, LOG_RETENTION_DAYS);
    }

    let config = load_config()?;
    let ctx = Context {
        config,
        cache_dir: args.cache_dir,
        index_path: args.index,
        dry_run: args.dry_run,
    };

    match args.command {
        Commands::Scan {
            no_patch,
            directory,
        } => scan_cache(
            &ctx,
            ScanCacheArgs {
                no_patch,
                directory,
            },
        ),
        Commands::Reconcile => reconcile_index(&ctx),
        Commands::Patch { id } => patch_contents(&ctx, PatchContentsArgs { id }),
        Commands::List { json } => list_contents(&ctx, ListContentsArgs { json }),
        Commands::Inspect { path } => inspect_bundle(InspectBundleArgs { path }),
    }
}
