//! Collaborator interfaces for the hubstorage job queue, job metadata and
//! collection stores, plus the HTTP client that implements them.

pub mod client;
pub mod error;
#[cfg(test)]
pub mod memory;

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub use error::{HubError, HubResult};

/// A single stored record. Field order is kept as produced by the source job.
pub type Item = Map<String, Value>;

pub type JobStream<'a> = Box<dyn Iterator<Item = HubResult<JobSummary>> + 'a>;
pub type ItemStream<'a> = Box<dyn Iterator<Item = HubResult<Item>> + 'a>;
pub type RawStream<'a> = Box<dyn Iterator<Item = HubResult<String>> + 'a>;

/// Numeric project identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectId(u64);

impl ProjectId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for ProjectId {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("`{raw}` is not a numeric project id"));
        }
        raw.parse::<u64>()
            .map(Self::new)
            .map_err(|err| format!("`{raw}` is not a valid project id: {err}"))
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique job key, rendered as `project/spider/job`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobKey {
    pub project: ProjectId,
    pub spider: u64,
    pub job: u64,
}

impl JobKey {
    pub const fn new(project: u64, spider: u64, job: u64) -> Self {
        Self {
            project: ProjectId::new(project),
            spider,
            job,
        }
    }
}

impl FromStr for JobKey {
    type Err = HubError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts = raw.split('/').collect::<Vec<_>>();
        let [project, spider, job] = parts.as_slice() else {
            return Err(HubError::InvalidJobKey(raw.to_string()));
        };
        let parse = |part: &str| {
            part.parse::<u64>()
                .map_err(|_| HubError::InvalidJobKey(raw.to_string()))
        };
        Ok(Self::new(parse(project)?, parse(spider)?, parse(job)?))
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.spider, self.job)
    }
}

impl<'de> Deserialize<'de> for JobKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Query evaluated server-side by the job queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFilter {
    pub state: String,
    pub has_tags: Vec<String>,
    pub lacks_tag: String,
    pub count: Option<u64>,
}

impl JobFilter {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("state", self.state.clone())];
        for tag in &self.has_tags {
            pairs.push(("has_tag", tag.clone()));
        }
        pairs.push(("lacks_tag", self.lacks_tag.clone()));
        if let Some(count) = self.count {
            pairs.push(("count", count.to_string()));
        }
        pairs
    }
}

/// One entry of a job queue listing.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSummary {
    pub key: JobKey,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobMetadata {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobMetadata {
    /// Appends `tag` unless already present. Returns whether the tag set changed.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        if self.has_tag(tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub key: JobKey,
    pub metadata: JobMetadata,
}

pub trait JobQueue {
    fn list_jobs(&self, filter: &JobFilter) -> HubResult<JobStream<'_>>;
}

pub trait JobStore {
    fn get_job(&self, key: &JobKey) -> HubResult<Job>;

    /// Items in the order the job wrote them.
    fn iter_items(&self, key: &JobKey) -> HubResult<ItemStream<'_>>;

    fn save_metadata(&self, job: &Job) -> HubResult<()>;
}

/// Staging side of a collection. Implementations buffer and flush in batches.
pub trait ItemWriter {
    fn write(&mut self, item: &Item) -> HubResult<()>;

    fn flush(&mut self) -> HubResult<()>;

    fn close(&mut self) -> HubResult<()>;
}

pub trait CollectionStore {
    type Writer: ItemWriter;

    fn create_writer(&self, collection: &str, batch_size: usize) -> HubResult<Self::Writer>;

    /// Raw JSON text of each stored record, unparsed.
    fn iter_json(&self, collection: &str, filter: &[(String, String)]) -> HubResult<RawStream<'_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_key_parses_and_renders() {
        let key: JobKey = "123/4/56".parse().expect("parse");
        assert_eq!(key, JobKey::new(123, 4, 56));
        assert_eq!(key.to_string(), "123/4/56");
    }

    #[test]
    fn job_key_rejects_short_or_non_numeric() {
        assert!("123/4".parse::<JobKey>().is_err());
        assert!("123/x/5".parse::<JobKey>().is_err());
        assert!("1/2/3/4".parse::<JobKey>().is_err());
    }

    #[test]
    fn project_id_requires_digits_only() {
        assert_eq!("42".parse::<ProjectId>(), Ok(ProjectId::new(42)));
        assert!("+42".parse::<ProjectId>().is_err());
        assert!("".parse::<ProjectId>().is_err());
        assert!("abc".parse::<ProjectId>().is_err());
    }

    #[test]
    fn add_tag_is_idempotent() {
        let mut meta = JobMetadata::default();
        assert!(meta.add_tag("processed"));
        assert!(!meta.add_tag("processed"));
        assert_eq!(meta.tags, vec!["processed".to_string()]);
    }

    #[test]
    fn filter_query_repeats_has_tag_and_omits_missing_count() {
        let filter = JobFilter {
            state: "finished".to_string(),
            has_tags: vec!["a".to_string(), "b".to_string()],
            lacks_tag: "processed".to_string(),
            count: None,
        };
        let pairs = filter.query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("state", "finished".to_string()),
                ("has_tag", "a".to_string()),
                ("has_tag", "b".to_string()),
                ("lacks_tag", "processed".to_string()),
            ]
        );
    }

    #[test]
    fn metadata_keeps_unknown_fields() {
        let meta: JobMetadata =
            serde_json::from_str(r#"{"state":"finished","tags":["x"],"spider":"s1"}"#)
                .expect("decode");
        assert_eq!(meta.tags, vec!["x".to_string()]);
        assert_eq!(meta.extra.get("spider"), Some(&Value::from("s1")));
    }
}
