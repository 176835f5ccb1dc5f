//! In-process hub used by unit tests. Evaluates job filters the way the
//! remote queue does and records every write and metadata save.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;

use super::{
    CollectionStore, HubError, HubResult, Item, ItemStream, ItemWriter, Job, JobFilter, JobKey,
    JobMetadata, JobQueue, JobStore, JobStream, JobSummary, RawStream,
};

#[derive(Debug, Default)]
struct State {
    jobs: BTreeMap<JobKey, (JobMetadata, Vec<Item>)>,
    collections: BTreeMap<String, BTreeMap<String, Item>>,
    writes: Vec<Item>,
    batches: Vec<usize>,
    saves: Vec<JobKey>,
    items_opened: Vec<JobKey>,
    closed_writers: usize,
    fail_batches: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    state: Rc<RefCell<State>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(&self, key: JobKey, state: &str, tags: &[&str], items: Vec<Value>) {
        let metadata = JobMetadata {
            state: Some(state.to_string()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            extra: Default::default(),
        };
        let items = items
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map,
                other => panic!("test item must be an object: {other}"),
            })
            .collect();
        self.state.borrow_mut().jobs.insert(key, (metadata, items));
    }

    pub fn fail_batches(&self) {
        self.state.borrow_mut().fail_batches = true;
    }

    pub fn tags(&self, key: &JobKey) -> Vec<String> {
        self.state.borrow().jobs[key].0.tags.clone()
    }

    pub fn writes(&self) -> Vec<Item> {
        self.state.borrow().writes.clone()
    }

    pub fn batches(&self) -> Vec<usize> {
        self.state.borrow().batches.clone()
    }

    pub fn saves(&self) -> Vec<JobKey> {
        self.state.borrow().saves.clone()
    }

    pub fn items_opened(&self) -> Vec<JobKey> {
        self.state.borrow().items_opened.clone()
    }

    pub fn closed_writers(&self) -> usize {
        self.state.borrow().closed_writers
    }

    pub fn collection(&self, name: &str) -> BTreeMap<String, Item> {
        self.state
            .borrow()
            .collections
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.state.borrow().collections.keys().cloned().collect()
    }

    pub fn put_record(&self, collection: &str, item: Value) {
        let Value::Object(map) = item else {
            panic!("record must be an object");
        };
        let key = key_string(&map);
        self.state
            .borrow_mut()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key, map);
    }
}

fn key_string(item: &Item) -> String {
    match item.get("_key") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn matches(metadata: &JobMetadata, filter: &JobFilter) -> bool {
    metadata.state.as_deref() == Some(filter.state.as_str())
        && filter.has_tags.iter().all(|t| metadata.has_tag(t))
        && !metadata.has_tag(&filter.lacks_tag)
}

impl JobQueue for MemoryHub {
    fn list_jobs(&self, filter: &JobFilter) -> HubResult<JobStream<'_>> {
        let state = self.state.borrow();
        let limit = filter.count.map_or(usize::MAX, |c| c as usize);
        let found = state
            .jobs
            .iter()
            .filter(|(_, (meta, _))| matches(meta, filter))
            .take(limit)
            .map(|(key, (meta, _))| {
                Ok(JobSummary {
                    key: *key,
                    state: meta.state.clone(),
                    tags: meta.tags.clone(),
                })
            })
            .collect::<Vec<_>>();
        Ok(Box::new(found.into_iter()))
    }
}

impl JobStore for MemoryHub {
    fn get_job(&self, key: &JobKey) -> HubResult<Job> {
        let state = self.state.borrow();
        let (metadata, _) = state.jobs.get(key).ok_or_else(|| HubError::Status {
            status: 404,
            url: format!("jobs/{key}"),
            body: "not found".to_string(),
        })?;
        Ok(Job {
            key: *key,
            metadata: metadata.clone(),
        })
    }

    fn iter_items(&self, key: &JobKey) -> HubResult<ItemStream<'_>> {
        let mut state = self.state.borrow_mut();
        state.items_opened.push(*key);
        let items = state
            .jobs
            .get(key)
            .map(|(_, items)| items.clone())
            .unwrap_or_default();
        Ok(Box::new(items.into_iter().map(Ok)))
    }

    fn save_metadata(&self, job: &Job) -> HubResult<()> {
        let mut state = self.state.borrow_mut();
        state.saves.push(job.key);
        if let Some((metadata, _)) = state.jobs.get_mut(&job.key) {
            metadata.tags = job.metadata.tags.clone();
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryWriter {
    state: Rc<RefCell<State>>,
    collection: String,
    batch_size: usize,
    buffer: Vec<Item>,
    closed: bool,
}

impl ItemWriter for MemoryWriter {
    fn write(&mut self, item: &Item) -> HubResult<()> {
        if self.closed {
            return Err(HubError::unexpected(&self.collection, "writer already closed"));
        }
        self.state.borrow_mut().writes.push(item.clone());
        self.buffer.push(item.clone());
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> HubResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut state = self.state.borrow_mut();
        if state.fail_batches {
            return Err(HubError::Status {
                status: 503,
                url: format!("collections/s/{}", self.collection),
                body: "unavailable".to_string(),
            });
        }
        state.batches.push(self.buffer.len());
        let collection = state.collections.entry(self.collection.clone()).or_default();
        for item in self.buffer.drain(..) {
            collection.insert(key_string(&item), item);
        }
        Ok(())
    }

    fn close(&mut self) -> HubResult<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.closed = true;
        self.state.borrow_mut().closed_writers += 1;
        Ok(())
    }
}

impl CollectionStore for MemoryHub {
    type Writer = MemoryWriter;

    fn create_writer(&self, collection: &str, batch_size: usize) -> HubResult<MemoryWriter> {
        Ok(MemoryWriter {
            state: Rc::clone(&self.state),
            collection: collection.to_string(),
            batch_size,
            buffer: Vec::new(),
            closed: false,
        })
    }

    fn iter_json(&self, collection: &str, filter: &[(String, String)]) -> HubResult<RawStream<'_>> {
        let records = self.collection(collection);
        let wanted = filter
            .iter()
            .filter(|(name, _)| name == "key")
            .map(|(_, value)| value.clone())
            .collect::<Vec<_>>();
        let lines = records
            .into_iter()
            .filter(|(key, _)| wanted.is_empty() || wanted.contains(key))
            .map(|(_, item)| {
                serde_json::to_string(&item).map_err(|err| HubError::decode("record", err))
            })
            .collect::<Vec<_>>();
        Ok(Box::new(lines.into_iter()))
    }
}
