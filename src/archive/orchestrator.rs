use std::fmt::Write as _;

use chrono::format::{Item as FormatItem, StrftimeItems};
use chrono::{DateTime, Utc};
use tracing::info;

use super::processor::process_job;
use super::selector::{build_filter, select_jobs};
use super::transform::ItemTransform;
use super::writer::ScopedWriter;
use crate::error::{ArchiveError, ArchiveResult};
use crate::hubstorage::{CollectionStore, JobQueue, JobStore};

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub state: String,
    pub has_tags: Vec<String>,
    pub processed_tag: String,
    pub collection_pattern: String,
    pub writer_size: usize,
    pub limit: u64,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub jobs: u64,
    pub items: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub collection: String,
    pub totals: RunTotals,
}

/// Formats a strftime-style collection pattern with the run timestamp.
pub fn collection_name(pattern: &str, now: DateTime<Utc>) -> ArchiveResult<String> {
    let items = StrftimeItems::new(pattern).collect::<Vec<_>>();
    if items.iter().any(|item| matches!(item, FormatItem::Error)) {
        return Err(ArchiveError::config(format!(
            "invalid collection pattern `{pattern}`"
        )));
    }
    let mut name = String::new();
    write!(name, "{}", now.format_with_items(items.into_iter())).map_err(|_| {
        ArchiveError::config(format!("collection pattern `{pattern}` cannot be formatted"))
    })?;
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(ArchiveError::config("collection name cannot be empty"));
    }
    Ok(name)
}

/// Validates options that must hold before any remote call is made.
pub fn validate_options(opts: &ArchiveOptions, now: DateTime<Utc>) -> ArchiveResult<()> {
    if opts.writer_size == 0 {
        return Err(ArchiveError::config("--writer-size must be >= 1"));
    }
    if opts.processed_tag.trim().is_empty() {
        return Err(ArchiveError::config("--processed-tag cannot be empty"));
    }
    if opts.state.trim().is_empty() {
        return Err(ArchiveError::config("--state cannot be empty"));
    }
    collection_name(&opts.collection_pattern, now)?;
    Ok(())
}

/// Archives the items of every selected job into one collection and tags
/// each job once its items are flushed.
///
/// Any error aborts the run. Jobs tagged before the failure stay tagged; the
/// failing job is left untagged so the next run retries it. The collection
/// writer is released on every exit path.
pub fn run_archive<H>(
    hub: &H,
    opts: &ArchiveOptions,
    transform: Option<&dyn ItemTransform>,
    now: DateTime<Utc>,
) -> ArchiveResult<ArchiveOutcome>
where
    H: JobQueue + JobStore + CollectionStore + ?Sized,
{
    validate_options(opts, now)?;
    let collection = collection_name(&opts.collection_pattern, now)?;
    let mut writer = ScopedWriter::new(
        hub.create_writer(&collection, opts.writer_size)?,
        collection.clone(),
    );

    let filter = build_filter(&opts.state, &opts.has_tags, &opts.processed_tag, opts.limit);
    let mut totals = RunTotals::default();

    for summary in select_jobs(hub, &filter)? {
        let summary = summary?;
        let mut job = hub.get_job(&summary.key)?;

        info!(job = %job.key, "processing");
        let stored = process_job(
            hub,
            &job,
            transform,
            |item| writer.write(item),
            opts.writer_size,
            opts.dry_run,
        )?;
        writer.flush()?;
        info!(job = %job.key, items = stored, collection = writer.collection(), "stored items");

        if job.metadata.add_tag(&opts.processed_tag) && !opts.dry_run {
            hub.save_metadata(&job)?;
        }

        totals.jobs += 1;
        totals.items += stored;
    }

    writer.finish()?;
    info!(
        jobs = totals.jobs,
        total = totals.items,
        collection = %collection,
        dry_run = opts.dry_run,
        "stored items in total"
    );

    Ok(ArchiveOutcome { collection, totals })
}
