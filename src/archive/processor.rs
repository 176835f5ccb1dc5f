use tracing::info;

use super::transform::ItemTransform;
use crate::error::{ArchiveError, ArchiveResult};
use crate::hubstorage::{HubResult, Item, Job, JobStore};

/// Drains one job's items into `write`, returning how many were (or in
/// dry-run, would have been) stored.
///
/// Items are read once in store order. Skipped items are not counted. An
/// item without `_key` aborts the job with [`ArchiveError::MissingKey`].
pub fn process_job<S, F>(
    store: &S,
    job: &Job,
    transform: Option<&dyn ItemTransform>,
    mut write: F,
    batch_size: usize,
    dry_run: bool,
) -> ArchiveResult<u64>
where
    S: JobStore + ?Sized,
    F: FnMut(&Item) -> HubResult<()>,
{
    debug_assert!(batch_size > 0, "batch size must be validated before processing");
    let batch_size = batch_size as u64;
    let mut stored = 0u64;
    let mut position = 0u64;

    for item in store.iter_items(&job.key)? {
        let item = item?;
        position += 1;

        let item = match transform {
            Some(transform) => match transform.apply(job, item) {
                Some(item) => item,
                None => continue,
            },
            None => item,
        };

        if !item.contains_key("_key") {
            return Err(ArchiveError::MissingKey {
                job: job.key,
                position,
            });
        }

        if !dry_run {
            write(&item)?;
        }

        stored += 1;
        if stored % batch_size == 0 {
            info!(job = %job.key, items = stored, "stored items");
        }
    }

    Ok(stored)
}
