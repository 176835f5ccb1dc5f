use tracing::debug;

use crate::hubstorage::{HubResult, JobFilter, JobQueue, JobStream};

/// Builds the job queue filter for one run. A `limit` of zero means unlimited.
pub fn build_filter(
    state: &str,
    has_tags: &[String],
    processed_tag: &str,
    limit: u64,
) -> JobFilter {
    JobFilter {
        state: state.to_string(),
        has_tags: has_tags.to_vec(),
        lacks_tag: processed_tag.to_string(),
        count: (limit > 0).then_some(limit),
    }
}

/// Jobs matching `filter`, as evaluated by the queue itself.
pub fn select_jobs<'a, Q>(queue: &'a Q, filter: &JobFilter) -> HubResult<JobStream<'a>>
where
    Q: JobQueue + ?Sized,
{
    debug!(filter = ?filter, "listing jobs");
    queue.list_jobs(filter)
}
