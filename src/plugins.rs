//! Drone plugin registry, cached on disk for an hour.

use crate::cache::{is_stale, write_atomic, Clock, SystemClock};
use crate::error::{DroneError, Result};
use crate::types::DronePlugin;
use chrono::Duration;
use std::fs;
use std::path::{Path, PathBuf};

pub const PLUGINS_API_URL: &str = "https://plugins.drone.io/api/plugins";

pub struct PluginRegistry {
    client: reqwest::Client,
    url: String,
    cache_file: PathBuf,
    clock: Box<dyn Clock>,
    freshness: Duration,
}

impl PluginRegistry {
    /// Registry cached under `<install folder>/plugins/plugins.json`.
    pub fn new(install_folder: &Path) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: PLUGINS_API_URL.to_string(),
            cache_file: install_folder.join("plugins").join("plugins.json"),
            clock: Box::new(SystemClock),
            freshness: Duration::hours(1),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// All plugins, from the cache when it is fresh.
    pub async fn plugins(&self) -> Result<Vec<DronePlugin>> {
        if !is_stale(&self.cache_file, self.clock.as_ref(), self.freshness)? {
            match fs::read_to_string(&self.cache_file)
                .map_err(DroneError::from)
                .and_then(|content| Ok(serde_json::from_str::<Vec<DronePlugin>>(&content)?))
            {
                Ok(plugins) => return Ok(plugins),
                Err(e) => tracing::warn!("Plugin cache unreadable ({}), refreshing", e),
            }
        }
        self.fetch_and_cache().await
    }

    /// Fetches the registry and rewrites the cache file.
    pub async fn fetch_and_cache(&self) -> Result<Vec<DronePlugin>> {
        tracing::info!("Fetching plugin registry from {}", self.url);
        let wrap = |e: DroneError| DroneError::Fetch(format!("Failed to cache plugins info : {}", e));

        let response = self.client.get(&self.url).send().await.map_err(|e| wrap(e.into()))?;
        if !response.status().is_success() {
            return Err(wrap(DroneError::Fetch(response.status().to_string())));
        }
        let body = response.text().await.map_err(|e| wrap(e.into()))?;
        let plugins: Vec<DronePlugin> = serde_json::from_str(&body).map_err(|e| wrap(e.into()))?;

        write_atomic(&self.cache_file, body.as_bytes())?;
        tracing::debug!("Cached {} plugins in {}", plugins.len(), self.cache_file.display());
        Ok(plugins)
    }

    /// Plugins whose name or any tag contains one of `terms`, ignoring case.
    /// No terms returns every plugin.
    pub async fn search(&self, terms: &[String]) -> Result<Vec<DronePlugin>> {
        let plugins = self.plugins().await?;
        Ok(filter_plugins(plugins, terms))
    }
}

pub fn filter_plugins(plugins: Vec<DronePlugin>, terms: &[String]) -> Vec<DronePlugin> {
    if terms.is_empty() {
        return plugins;
    }
    let terms: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
    plugins
        .into_iter()
        .filter(|plugin| {
            let name = plugin.name.to_lowercase();
            terms.iter().any(|term| {
                name.contains(term.as_str())
                    || plugin
                        .tags
                        .iter()
                        .any(|tag| tag.to_lowercase().contains(term.as_str()))
            })
        })
        .collect()
}
