// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::criteria::Criteria;
use crate::pfclient::DEFAULT_BASE_URL;

pub const ENV_API_KEY: &str = "PF_API_KEY";
pub const ENV_API_SECRET: &str = "PF_API_SECRET";
pub const ENV_BASE_URL: &str = "PF_URL";
pub const ENV_INTERVAL_SECS: &str = "PF_INTERVAL_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "PF_REQUEST_TIMEOUT_SECS";
pub const ENV_CRITERIA_PATH: &str = "PF_CRITERIA_PATH";

pub const DEFAULT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Everything needed to assemble a fetcher. Built once at the edge of the
/// program; the library itself never reads the environment.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    pub interval: Duration,
    pub request_timeout_secs: u64,
    pub criteria: Criteria,
}

impl FetcherConfig {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            criteria: Criteria::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(ENV_API_KEY).with_context(|| format!("missing {ENV_API_KEY}"))?;
        let api_secret =
            std::env::var(ENV_API_SECRET).with_context(|| format!("missing {ENV_API_SECRET}"))?;

        let mut cfg = Self::new(api_key, api_secret);
        if let Some(url) = env_nonempty(ENV_BASE_URL) {
            cfg.base_url = url;
        }
        if let Some(secs) = env_secs(ENV_INTERVAL_SECS)? {
            if secs == 0 {
                bail!("{ENV_INTERVAL_SECS} must be greater than zero");
            }
            cfg.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_secs(ENV_REQUEST_TIMEOUT_SECS)? {
            cfg.request_timeout_secs = secs.max(1);
        }
        cfg.criteria = load_criteria_default()?;
        Ok(cfg)
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_secs(name: &str) -> Result<Option<u64>> {
    env_nonempty(name)
        .map(|v| {
            v.parse::<u64>()
                .with_context(|| format!("{name} must be a whole number of seconds, got `{v}`"))
        })
        .transpose()
}

/// Load initial criteria from an explicit path. Supports TOML or JSON.
pub fn load_criteria_from(path: &Path) -> Result<Criteria> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading criteria from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_criteria(&content, ext.as_str())
        .with_context(|| format!("parsing criteria in {}", path.display()))
}

/// Load initial criteria using env var + fallbacks:
/// 1) $PF_CRITERIA_PATH
/// 2) config/criteria.toml
/// 3) config/criteria.json
///
/// No file at all means an empty criteria.
pub fn load_criteria_default() -> Result<Criteria> {
    if let Some(p) = env_nonempty(ENV_CRITERIA_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CRITERIA_PATH} points to non-existent path"));
        }
        return load_criteria_from(&pb);
    }
    let toml_p = PathBuf::from("config/criteria.toml");
    if toml_p.exists() {
        return load_criteria_from(&toml_p);
    }
    let json_p = PathBuf::from("config/criteria.json");
    if json_p.exists() {
        return load_criteria_from(&json_p);
    }
    Ok(Criteria::default())
}

fn parse_criteria(s: &str, hint_ext: &str) -> Result<Criteria> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ if s.trim_start().starts_with('{') => Ok(serde_json::from_str(s)?),
        _ => toml::from_str(s).map_err(|e| anyhow!("unsupported criteria format: {e}")),
    }
}
