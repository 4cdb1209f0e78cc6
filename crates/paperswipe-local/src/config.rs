use paperswipe_core::{Error, Result};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "xingchen-api.xf-yun.com";
pub const DEFAULT_ENDPOINT: &str = "/workflow/v1/chat/completions";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub const ENV_HOST: &str = "PAPERSWIPE_API_HOST";
pub const ENV_ENDPOINT: &str = "PAPERSWIPE_API_ENDPOINT";
pub const ENV_TIMEOUT_S: &str = "PAPERSWIPE_API_TIMEOUT_S";
pub const ENV_API_KEY: [&str; 2] = ["PAPERSWIPE_API_KEY", "XFIND_API_KEY"];
pub const ENV_API_SECRET: [&str; 2] = ["PAPERSWIPE_API_SECRET", "XFIND_API_SECRET"];
pub const ENV_FLOW_ID: [&str; 2] = ["PAPERSWIPE_FLOW_ID", "XFIND_FLOW_ID"];

/// Connection settings for the workflow API. Immutable once built.
#[derive(Clone)]
pub struct WorkflowConfig {
    /// Bare host (`https://` is implied) or a full `http(s)://host[:port]` origin.
    pub host: String,
    pub endpoint: String,
    pub api_key: String,
    pub api_secret: String,
    pub flow_id: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for WorkflowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowConfig")
            .field("host", &self.host)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("flow_id", &self.flow_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn first_of(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| non_empty(lookup(k)))
}

fn required(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str; 2]) -> Result<String> {
    first_of(lookup, keys)
        .ok_or_else(|| Error::NotConfigured(format!("missing {} (or {})", keys[0], keys[1])))
}

impl WorkflowConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Builds a config from any key/value source. Empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let timeout = match first_of(&lookup, &[ENV_TIMEOUT_S]) {
            Some(s) => {
                let secs = s.parse::<u64>().ok().filter(|&n| n > 0).ok_or_else(|| {
                    Error::NotConfigured(format!(
                        "{ENV_TIMEOUT_S} must be a positive number of seconds, got {s:?}"
                    ))
                })?;
                Duration::from_secs(secs)
            }
            None => DEFAULT_TIMEOUT,
        };
        Ok(Self {
            host: first_of(&lookup, &[ENV_HOST]).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            endpoint: first_of(&lookup, &[ENV_ENDPOINT])
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key: required(&lookup, &ENV_API_KEY)?,
            api_secret: required(&lookup, &ENV_API_SECRET)?,
            flow_id: required(&lookup, &ENV_FLOW_ID)?,
            timeout,
        })
    }

    pub fn url(&self) -> Result<url::Url> {
        let host = self.host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(Error::InvalidUrl("empty host".to_string()));
        }
        let origin = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        let endpoint = self.endpoint.trim();
        let full = if endpoint.starts_with('/') {
            format!("{origin}{endpoint}")
        } else {
            format!("{origin}/{endpoint}")
        };
        url::Url::parse(&full).map_err(|e| Error::InvalidUrl(format!("{full}: {e}")))
    }

    /// `Bearer <key>:<secret>`.
    pub fn authorization(&self) -> String {
        format!("Bearer {}:{}", self.api_key, self.api_secret)
    }
}
