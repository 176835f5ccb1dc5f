use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::hubstorage::client::ClientSettings;
use crate::util::env_nonempty;

include!(concat!(env!("OUT_DIR"), "/shub_env_allowlist.rs"));

pub const DEFAULT_COLLECTION: &str = "archived_items";
pub const DEFAULT_PROCESSED_TAG: &str = "processed";
pub const DEFAULT_STATE: &str = "finished";
pub const DEFAULT_WRITER_SIZE: usize = 1000;

pub const DEFAULT_ENDPOINT: &str = "https://storage.scrapinghub.com/";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: format!("shub-archive/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HubConfig {
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartialConfigFile {
    hubstorage: Option<HubConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    env_nonempty(var).unwrap_or_else(|| fallback.to_string())
}

fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

fn validate(cfg: &HubConfig) -> Result<()> {
    if !(cfg.endpoint.starts_with("http://") || cfg.endpoint.starts_with("https://")) {
        return Err(anyhow!(
            "invalid storage endpoint `{}`: must start with http:// or https://",
            cfg.endpoint
        ));
    }
    if cfg.timeout_secs == 0 {
        return Err(anyhow!("invalid request timeout: must be >= 1 second"));
    }
    if cfg.user_agent.trim().is_empty() {
        return Err(anyhow!("invalid user agent: cannot be empty"));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Some(custom) = env_nonempty("SHUB_ARCHIVE_CONFIG") {
        return Some(PathBuf::from(custom));
    }

    let home = dirs::home_dir()?;
    Some(home.join(".shub").join("archive.toml"))
}

fn merge_file_config(base: &mut HubConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialConfigFile = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse archive config {}: {err}", path.display()))?;
    if let Some(hubstorage) = parsed.hubstorage {
        *base = hubstorage;
    }
    Ok(())
}

fn apply_env(cfg: &mut HubConfig) {
    cfg.endpoint = env_or_string("SHUB_STORAGE_ENDPOINT", &cfg.endpoint);
    cfg.timeout_secs = env_or_u64("SHUB_TIMEOUT_SECS", cfg.timeout_secs);
    cfg.user_agent = env_or_string("SHUB_USER_AGENT", &cfg.user_agent);
}

pub fn load_config() -> Result<HubConfig> {
    let mut cfg = HubConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env(&mut cfg);
    cfg.endpoint = normalize_endpoint(&cfg.endpoint);

    validate(&cfg)?;
    Ok(cfg)
}

/// Recognised `SHUB_*` variables that are currently set. Names only.
pub fn active_env_keys() -> Vec<&'static str> {
    GENERATED_SHUB_ENV_ALLOWLIST
        .iter()
        .copied()
        .filter(|key| env::var_os(key).is_some())
        .collect()
}
