//! Opt-in `KEY=VALUE` env file, for hosts where exporting secrets in a shell is awkward.
//!
//! - only read when `PAPERSWIPE_ENV_FILE` names a file
//! - never overrides a variable already present in the process environment
//! - never logs values

use std::path::{Path, PathBuf};

pub const ENV_FILE_VAR: &str = "PAPERSWIPE_ENV_FILE";

/// Parses `KEY=VALUE` lines. Blank lines, `#` comments and lines without `=` are skipped.
pub fn parse(text: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in text.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        out.push((k.to_string(), v.trim().to_string()));
    }
    out
}

/// Loads `path` into the process environment. Returns the keys that were set.
pub fn load(path: &Path) -> std::io::Result<Vec<String>> {
    let txt = std::fs::read_to_string(path)?;
    let mut set = Vec::new();
    for (k, v) in parse(&txt) {
        if std::env::var_os(&k).is_none() {
            std::env::set_var(&k, v);
            set.push(k);
        }
    }
    Ok(set)
}

/// What happened to the file named by `PAPERSWIPE_ENV_FILE`.
#[derive(Debug)]
pub struct EnvFileOutcome {
    pub path: PathBuf,
    pub result: std::io::Result<Vec<String>>,
}

impl EnvFileOutcome {
    pub fn loaded(&self) -> bool {
        self.result.is_ok()
    }

    /// Logs the outcome. Call after the subscriber is installed.
    pub fn log(&self) {
        let path = self.path.display();
        match &self.result {
            Ok(keys) => tracing::debug!(%path, ?keys, "env file loaded"),
            Err(e) => tracing::warn!(%path, error = %e, "env file could not be read"),
        }
    }
}

/// Loads the file named by `PAPERSWIPE_ENV_FILE`, if any.
///
/// Runs before logging is set up, so it only reports; the caller logs.
pub fn load_from_env() -> Option<EnvFileOutcome> {
    let p = std::env::var(ENV_FILE_VAR).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    let path = PathBuf::from(p);
    let result = load(&path);
    Some(EnvFileOutcome { path, result })
}
