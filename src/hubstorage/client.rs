use std::fmt;
use std::io::{BufRead, BufReader};
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use tracing::debug;

use super::{
    CollectionStore, HubError, HubResult, Item, ItemStream, ItemWriter, Job, JobFilter, JobKey,
    JobMetadata, JobQueue, JobStore, JobStream, JobSummary, ProjectId, RawStream,
};
use crate::util::truncate_with_ellipsis;

const JSON_LINES: &str = "application/x-jsonlines";
const ERROR_BODY_MAX_CHARS: usize = 300;
const NO_QUERY: &[(&str, &str)] = &[];

/// API key sent as the basic-auth user. Never rendered in logs.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("*****")
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub endpoint: String,
    pub timeout: Duration,
    pub user_agent: String,
}

/// Project-scoped hubstorage client over the blocking HTTP API.
#[derive(Debug, Clone)]
pub struct HubClient {
    http: Client,
    base: Url,
    apikey: ApiKey,
    project: ProjectId,
}

impl HubClient {
    pub fn new(settings: &ClientSettings, apikey: ApiKey, project: ProjectId) -> HubResult<Self> {
        let base = Url::parse(&settings.endpoint)
            .map_err(|err| HubError::unexpected("storage endpoint", err.to_string()))?;
        let http = Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            base,
            apikey,
            project,
        })
    }

    fn url(&self, segments: &[&str]) -> HubResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| HubError::unexpected("storage endpoint", "cannot be a base url"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn job_segments(prefix: &'static str, key: &JobKey) -> [String; 4] {
        [
            prefix.to_string(),
            key.project.to_string(),
            key.spider.to_string(),
            key.job.to_string(),
        ]
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(self.apikey.expose(), Some(""))
    }

    fn get<Q: Serialize + ?Sized>(&self, url: Url, query: &Q) -> HubResult<Response> {
        debug!(url = %url, "GET");
        let response = self
            .authed(self.http.get(url))
            .header(ACCEPT, JSON_LINES)
            .query(query)
            .send()?;
        check_status(response)
    }

    fn job_url(&self, prefix: &'static str, key: &JobKey) -> HubResult<Url> {
        let segments = Self::job_segments(prefix, key);
        let refs = segments.iter().map(String::as_str).collect::<Vec<_>>();
        self.url(&refs)
    }

    fn collection_url(&self, collection: &str) -> HubResult<Url> {
        let project = self.project.to_string();
        self.url(&["collections", &project, "s", collection])
    }
}

fn check_status(response: Response) -> HubResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().unwrap_or_default();
    Err(HubError::Status {
        status: status.as_u16(),
        url,
        body: truncate_with_ellipsis(body.trim(), ERROR_BODY_MAX_CHARS),
    })
}

fn json_lines(response: Response) -> impl Iterator<Item = HubResult<String>> {
    BufReader::new(response)
        .lines()
        .filter_map(|line| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(Ok(line)),
            Err(err) => Some(Err(HubError::Io(err))),
        })
}

impl JobQueue for HubClient {
    fn list_jobs(&self, filter: &JobFilter) -> HubResult<JobStream<'_>> {
        let project = self.project.to_string();
        let url = self.url(&["jobq", &project, "list"])?;
        let response = self.get(url, &filter.query_pairs())?;
        Ok(Box::new(json_lines(response).map(|line| {
            let line = line?;
            serde_json::from_str::<JobSummary>(&line)
                .map_err(|err| HubError::decode("job queue entry", err))
        })))
    }
}

impl JobStore for HubClient {
    fn get_job(&self, key: &JobKey) -> HubResult<Job> {
        let url = self.job_url("jobs", key)?;
        let response = self.get(url, NO_QUERY)?;
        let context = format!("metadata of job {key}");
        let line = json_lines(response)
            .next()
            .ok_or_else(|| HubError::unexpected(context.clone(), "empty response"))??;
        let metadata = serde_json::from_str::<JobMetadata>(&line)
            .map_err(|err| HubError::decode(context, err))?;
        Ok(Job {
            key: *key,
            metadata,
        })
    }

    fn iter_items(&self, key: &JobKey) -> HubResult<ItemStream<'_>> {
        let url = self.job_url("items", key)?;
        let response = self.get(url, NO_QUERY)?;
        let key = *key;
        Ok(Box::new(json_lines(response).map(move |line| {
            let line = line?;
            serde_json::from_str::<Item>(&line)
                .map_err(|err| HubError::decode(format!("item of job {key}"), err))
        })))
    }

    fn save_metadata(&self, job: &Job) -> HubResult<()> {
        let url = self.job_url("jobs", &job.key)?;
        debug!(url = %url, tags = ?job.metadata.tags, "POST job metadata");
        let response = self
            .authed(self.http.post(url))
            .json(&serde_json::json!({ "tags": job.metadata.tags }))
            .send()?;
        check_status(response)?;
        Ok(())
    }
}

impl CollectionStore for HubClient {
    type Writer = BatchWriter;

    fn create_writer(&self, collection: &str, batch_size: usize) -> HubResult<BatchWriter> {
        debug_assert!(batch_size > 0, "batch size must be validated before writing");
        Ok(BatchWriter {
            http: self.http.clone(),
            apikey: self.apikey.clone(),
            url: self.collection_url(collection)?,
            batch_size,
            buffer: Vec::new(),
            flushed: 0,
            closed: false,
        })
    }

    fn iter_json(&self, collection: &str, filter: &[(String, String)]) -> HubResult<RawStream<'_>> {
        let url = self.collection_url(collection)?;
        let response = self.get(url, filter)?;
        Ok(Box::new(json_lines(response)))
    }
}

/// Buffers items as JSON lines and posts them `batch_size` at a time.
#[derive(Debug)]
pub struct BatchWriter {
    http: Client,
    apikey: ApiKey,
    url: Url,
    batch_size: usize,
    buffer: Vec<String>,
    flushed: u64,
    closed: bool,
}

impl ItemWriter for BatchWriter {
    fn write(&mut self, item: &Item) -> HubResult<()> {
        if self.closed {
            return Err(HubError::unexpected(self.url.to_string(), "writer already closed"));
        }
        let line = serde_json::to_string(item)
            .map_err(|err| HubError::decode("collection item", err))?;
        self.buffer.push(line);
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> HubResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut body = self.buffer.join("\n");
        body.push('\n');
        debug!(url = %self.url, items = self.buffer.len(), "POST collection batch");
        let response = self
            .http
            .post(self.url.clone())
            .basic_auth(self.apikey.expose(), Some(""))
            .header(CONTENT_TYPE, JSON_LINES)
            .body(body)
            .send()?;
        check_status(response)?;
        self.flushed += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    fn close(&mut self) -> HubResult<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.closed = true;
        debug!(url = %self.url, items = self.flushed, "collection writer closed");
        Ok(())
    }
}
