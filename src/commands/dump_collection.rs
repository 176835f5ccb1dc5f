use std::io;

use anyhow::{Context, Result};
use tracing::debug;

use crate::archive::config::HubConfig;
use crate::archive::dump::dump_records;
use crate::hubstorage::ProjectId;
use crate::hubstorage::client::{ApiKey, HubClient};

#[derive(Debug, Clone)]
pub struct DumpCollectionOptions {
    pub project: ProjectId,
    pub apikey: ApiKey,
    pub collection: String,
    pub filter: Vec<(String, String)>,
}

/// Prints the collection's raw records to stdout and returns how many were printed.
pub fn run(cfg: &HubConfig, opts: &DumpCollectionOptions) -> Result<u64> {
    let client = HubClient::new(&cfg.client_settings(), opts.apikey.clone(), opts.project)
        .context("failed to create hubstorage client")?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let count = dump_records(&client, &opts.collection, &opts.filter, &mut out)?;
    debug!(collection = %opts.collection, records = count, "dumped collection");
    Ok(count)
}
