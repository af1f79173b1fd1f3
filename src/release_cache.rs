//! Latest stable release lookup backed by a JSON file of sorted tags.

use crate::cache::{is_stale, write_atomic, Clock, SystemClock};
use crate::error::{DroneError, Result};
use crate::install::github::{GitHubClient, ReleaseSource};
use crate::version::sort_stable_releases;
use chrono::Duration;
use std::fs;
use std::path::Path;

pub struct VersionCache {
    source: Box<dyn ReleaseSource>,
    clock: Box<dyn Clock>,
    freshness: Duration,
}

impl Default for VersionCache {
    fn default() -> Self {
        Self::new(Box::new(GitHubClient::default()), Box::new(SystemClock))
    }
}

impl VersionCache {
    pub fn new(source: Box<dyn ReleaseSource>, clock: Box<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            freshness: Duration::days(1),
        }
    }

    /// Returns the newest stable tag of `owner/repo`, refreshing `cache_file`
    /// from upstream when it is missing or older than the freshness window.
    pub async fn latest_release(&self, owner: &str, repo: &str, cache_file: &Path) -> Result<String> {
        let releases = if is_stale(cache_file, self.clock.as_ref(), self.freshness)? {
            self.refresh(owner, repo, cache_file).await?
        } else {
            match read_cached_releases(cache_file) {
                Ok(releases) => releases,
                Err(e) => {
                    tracing::warn!(
                        "Release cache {} is unreadable ({}), refreshing",
                        cache_file.display(),
                        e
                    );
                    self.refresh(owner, repo, cache_file).await?
                }
            }
        };

        releases
            .into_iter()
            .next()
            .ok_or_else(|| DroneError::NoStableRelease {
                owner: owner.to_string(),
                repo: repo.to_string(),
            })
    }

    async fn refresh(&self, owner: &str, repo: &str, cache_file: &Path) -> Result<Vec<String>> {
        tracing::info!("Fetching {}/{} releases", owner, repo);

        let tags = self
            .source
            .list_release_tags(owner, repo)
            .await
            .map_err(|e| {
                DroneError::Fetch(format!("Failed to find {}/{} stable version: {}", owner, repo, e))
            })?;

        let releases = sort_stable_releases(tags);
        write_atomic(cache_file, serde_json::to_string(&releases)?.as_bytes())?;
        tracing::debug!(
            "Cached {} stable release(s) in {}",
            releases.len(),
            cache_file.display()
        );
        Ok(releases)
    }
}

fn read_cached_releases(cache_file: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(cache_file)?;
    Ok(serde_json::from_str(&content)?)
}
