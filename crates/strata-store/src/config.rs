//! Workspace configuration: `strata.toml`, then `.env` and environment

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Optional config file at the workspace root.
pub const CONFIG_FILE: &str = "strata.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Title given to a freshly initialized entity pool.
    pub title: String,
    pub entity_file: String,
    pub views_dir: String,
    /// How long a read of the entity pool or a view may be served from memory.
    pub cache_ttl_ms: u64,
    /// Quiet period before buffered canvas edits are written.
    pub autosave_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            title: "Architecture".to_string(),
            entity_file: "entities.json".to_string(),
            views_dir: "views".to_string(),
            cache_ttl_ms: 5_000,
            autosave_ms: 1_000,
        }
    }
}

impl StoreConfig {
    /// Load from `root`, honouring a `.env` file and process environment.
    pub fn load(root: &Path) -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::load_with(root, |key| std::env::var(key).ok())
    }

    /// Like [`StoreConfig::load`] with an explicit environment lookup.
    pub fn load_with(root: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        config.apply_env(env);
        Ok(config)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = parse_ms(&env, "STRATA_CACHE_TTL_MS") {
            self.cache_ttl_ms = ms;
        }
        if let Some(ms) = parse_ms(&env, "STRATA_AUTOSAVE_MS") {
            self.autosave_ms = ms;
        }
        if let Some(title) = env("STRATA_TITLE").filter(|t| !t.trim().is_empty()) {
            self.title = title;
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_ms)
    }
}

fn parse_ms(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(ms) => Some(ms),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a number of milliseconds", key, raw);
            None
        }
    }
}
