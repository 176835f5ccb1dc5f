use anyhow::{Context, Result};
use chrono::Utc;
use tracing::error;

use crate::archive::config::HubConfig;
use crate::archive::orchestrator::{ArchiveOptions, run_archive};
use crate::archive::transform::ItemTransform;
use crate::commands::CommandReport;
use crate::hubstorage::ProjectId;
use crate::hubstorage::client::{ApiKey, HubClient};

#[derive(Debug, Clone)]
pub struct ArchiveItemsOptions {
    pub project: ProjectId,
    pub apikey: ApiKey,
    pub archive: ArchiveOptions,
}

pub fn run(
    cfg: &HubConfig,
    opts: &ArchiveItemsOptions,
    transform: Option<&dyn ItemTransform>,
) -> Result<CommandReport> {
    let client = HubClient::new(&cfg.client_settings(), opts.apikey.clone(), opts.project)
        .context("failed to create hubstorage client")?;
    let mut report = CommandReport::new("archive-items");
    report.detail(format!("project={}", opts.project));

    let outcome = match run_archive(&client, &opts.archive, transform, Utc::now()) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(code = err.code().as_str(), error = %err, "archive run aborted");
            return Err(err).context("archive run aborted");
        }
    };

    report.detail(format!("collection={}", outcome.collection));
    report.detail(format!("jobs={}", outcome.totals.jobs));
    report.detail(format!("items={}", outcome.totals.items));
    if opts.archive.dry_run {
        report.detail("dry_run=true");
    }
    Ok(report)
}
