use std::fmt::Display;

use anyhow::Result;
use chrono::Utc;
use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::debug;

use crate::archive::config::{
    DEFAULT_COLLECTION, DEFAULT_PROCESSED_TAG, DEFAULT_STATE, DEFAULT_WRITER_SIZE, HubConfig,
    active_env_keys, load_config,
};
use crate::archive::dump::parse_filter;
use crate::archive::orchestrator::{ArchiveOptions, validate_options};
use crate::archive::transform::TransformRegistry;
use crate::commands;
use crate::commands::archive_items::ArchiveItemsOptions;
use crate::commands::dump_collection::DumpCollectionOptions;
use crate::hubstorage::ProjectId;
use crate::hubstorage::client::ApiKey;
use crate::logging;
use crate::util::env_nonempty;

#[derive(Debug, Parser)]
#[command(
    name = "shub-archive",
    version,
    about = "Archive Scrapinghub job items into collections"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Archive the items of finished jobs into a collection and tag the jobs.
    ArchiveItems(ArchiveItemsArgs),
    /// Print the raw records stored in a collection.
    DumpCollection(DumpCollectionArgs),
}

#[derive(Debug, Args)]
struct ArchiveItemsArgs {
    /// Project ID (default: project of SHUB_JOBKEY)
    project: Option<String>,
    /// Scrapinghub API key
    #[arg(long, env = "SHUB_APIKEY", hide_env_values = true)]
    apikey: Option<String>,
    /// Filter jobs by this tag (repeatable)
    #[arg(short = 't', long = "has-tag", value_name = "TAG")]
    has_tags: Vec<String>,
    /// Tag applied to processed jobs
    #[arg(long, default_value = DEFAULT_PROCESSED_TAG)]
    processed_tag: String,
    /// Filter jobs by this state
    #[arg(long, default_value = DEFAULT_STATE)]
    state: String,
    /// Collection write batch size
    #[arg(long, default_value_t = DEFAULT_WRITER_SIZE)]
    writer_size: usize,
    /// Collection name, formatted as a strftime pattern with the current UTC time
    #[arg(short = 'c', long, default_value = DEFAULT_COLLECTION)]
    collection: String,
    /// Registered function used to transform or skip items
    #[arg(long, value_name = "NAME")]
    process_func: Option<String>,
    /// Number of jobs to process (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    limit: u64,
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Args)]
struct DumpCollectionArgs {
    /// Project ID
    project: String,
    /// Collection name
    collection: String,
    /// Scrapinghub API key
    #[arg(long, env = "SHUB_APIKEY", hide_env_values = true)]
    apikey: Option<String>,
    /// Query filter in JSON format
    #[arg(long)]
    filter: Option<String>,
}

/// Reports a configuration problem the way clap reports argument errors
/// and exits with the usage status.
fn usage_error(subcommand: &str, message: impl Display) -> ! {
    let mut cmd = Cli::command();
    cmd.build();
    match cmd.find_subcommand_mut(subcommand) {
        Some(sub) => sub.error(ErrorKind::ValueValidation, message).exit(),
        None => cmd.error(ErrorKind::ValueValidation, message).exit(),
    }
}

fn default_project() -> Option<String> {
    let jobkey = env_nonempty("SHUB_JOBKEY")?;
    project_from_jobkey(&jobkey)
}

fn project_from_jobkey(jobkey: &str) -> Option<String> {
    let prefix = jobkey.split('/').next()?.trim();
    if prefix.is_empty() {
        None
    } else {
        Some(prefix.to_string())
    }
}

fn require_apikey(subcommand: &str, raw: Option<String>) -> ApiKey {
    match raw.and_then(|key| ApiKey::new(key)) {
        Some(apikey) => apikey,
        None => usage_error(subcommand, "--apikey required"),
    }
}

fn hub_config(subcommand: &str) -> HubConfig {
    load_config().unwrap_or_else(|err| usage_error(subcommand, format!("{err:#}")))
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::ArchiveItems(args) => archive_items(args),
        Command::DumpCollection(args) => dump_collection(args),
    }
}

fn archive_items(args: ArchiveItemsArgs) -> Result<()> {
    const NAME: &str = "archive-items";

    let apikey = require_apikey(NAME, args.apikey);
    let Some(project) = args.project.or_else(default_project) else {
        usage_error(NAME, "project required");
    };
    let project = project
        .parse::<ProjectId>()
        .unwrap_or_else(|_| usage_error(NAME, "invalid project value"));

    let registry = TransformRegistry::default();
    let transform = args.process_func.as_deref().map(|reference| {
        registry
            .resolve(reference)
            .unwrap_or_else(|err| usage_error(NAME, err))
    });

    let archive = ArchiveOptions {
        state: args.state,
        has_tags: args.has_tags,
        processed_tag: args.processed_tag,
        collection_pattern: args.collection,
        writer_size: args.writer_size,
        limit: args.limit,
        dry_run: args.dry_run,
    };
    if let Err(err) = validate_options(&archive, Utc::now()) {
        usage_error(NAME, err);
    }
    let cfg = hub_config(NAME);

    logging::init(args.debug);
    let opts = ArchiveItemsOptions {
        project,
        apikey,
        archive,
    };
    debug!(options = ?opts, process_func = ?args.process_func, "arguments");
    debug!(
        endpoint = %cfg.endpoint,
        timeout_secs = cfg.timeout_secs,
        env = ?active_env_keys(),
        "hubstorage config"
    );

    let report = commands::archive_items::run(&cfg, &opts, transform)?;
    println!("{}", report.summary());
    Ok(())
}

fn dump_collection(args: DumpCollectionArgs) -> Result<()> {
    const NAME: &str = "dump-collection";

    let apikey = require_apikey(NAME, args.apikey);
    let filter =
        parse_filter(args.filter.as_deref()).unwrap_or_else(|err| usage_error(NAME, err));
    let project = args
        .project
        .parse::<ProjectId>()
        .unwrap_or_else(|_| usage_error(NAME, "Invalid project identifier"));
    let cfg = hub_config(NAME);

    logging::init(false);
    let opts = DumpCollectionOptions {
        project,
        apikey,
        collection: args.collection,
        filter,
    };
    debug!(options = ?opts, "arguments");

    commands::dump_collection::run(&cfg, &opts)?;
    Ok(())
}
