//! Runtime configuration read from the environment.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::state::ConcurrencyPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const API_URL_VAR: &str = "DBCHAT_API_URL";
const TIMEOUT_VAR: &str = "DBCHAT_REQUEST_TIMEOUT_SECS";
const SERIALIZE_VAR: &str = "DBCHAT_SERIALIZE_OPERATIONS";
const PREFERENCES_VAR: &str = "DBCHAT_PREFERENCES_PATH";

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the remote collaborator, always ending with `/`
    pub api_base_url: Url,
    /// Time to wait for a response before reporting the server as unresponsive
    pub request_timeout: Duration,
    /// How overlapping operations of the same kind are handled
    pub concurrency: ConcurrencyPolicy,
    /// Preference file override; `None` uses the config directory
    pub preferences_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_base_url = match lookup(API_URL_VAR) {
            Some(raw) => parse_base_url(&raw).with_context(|| format!("Invalid {}", API_URL_VAR))?,
            None => parse_base_url(DEFAULT_API_URL)?,
        };
        let mut config = Self {
            api_base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            concurrency: ConcurrencyPolicy::default(),
            preferences_path: None,
        };

        if let Some(raw) = lookup(TIMEOUT_VAR) {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", TIMEOUT_VAR, raw))?;
            if secs == 0 {
                bail!("{} must be greater than zero", TIMEOUT_VAR);
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(SERIALIZE_VAR) {
            config.concurrency = if parse_flag(&raw).with_context(|| format!("Invalid {}", SERIALIZE_VAR))? {
                ConcurrencyPolicy::RejectWhileInFlight
            } else {
                ConcurrencyPolicy::Allow
            };
        }

        config.preferences_path = lookup(PREFERENCES_VAR)
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }
}

/// Parse a base URL, adding the trailing slash relative joins rely on
fn parse_base_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let url = if raw.ends_with('/') {
        Url::parse(raw)
    } else {
        Url::parse(&format!("{}/", raw))
    }
    .with_context(|| format!("Not a URL: {}", raw))?;

    if url.cannot_be_a_base() {
        bail!("URL cannot be used as a base: {}", raw);
    }
    Ok(url)
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("Expected a boolean flag, got {}", other),
    }
}
