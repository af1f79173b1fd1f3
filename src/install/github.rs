//! Release listing through the GitHub API and release archive URLs.

use crate::config::APP_NAME;
use crate::error::{DroneError, Result};
use crate::types::{GitHubRelease, PlatformInfo};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::fmt;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const GITHUB_HOST: &str = "github.com";

#[derive(Debug)]
pub enum GitHubReleaseError {
    RepoNotFound { repo: String },
    RequestFailed { repo: String, status: StatusCode },
}

impl fmt::Display for GitHubReleaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitHubReleaseError::RepoNotFound { repo } => {
                write!(f, "Repository {} not found on GitHub (Status: 404)", repo)
            }
            GitHubReleaseError::RequestFailed { repo, status } => {
                write!(f, "Failed to list releases for {}: {}", repo, status)
            }
        }
    }
}

impl From<GitHubReleaseError> for DroneError {
    fn from(e: GitHubReleaseError) -> Self {
        DroneError::Fetch(e.to_string())
    }
}

/// Anything that can list the release tags of a repository.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn list_release_tags(&self, owner: &str, repo: &str) -> Result<Vec<String>>;
}

/// Build GitHub API URL listing the releases of `owner/repo`
pub fn build_gh_releases_url(api_base: &str, owner: &str, repo: &str) -> String {
    format!(
        "{}/repos/{}/{}/releases?per_page=100",
        api_base.trim_end_matches('/'),
        owner,
        repo
    )
}

/// Build the download URL of a release archive, e.g.
/// `https://github.com/harness/drone-cli/releases/download/v1.5.0/drone_linux_amd64.tar.gz`
pub fn build_release_archive_url(
    host: &str,
    owner: &str,
    repo: &str,
    tag: &str,
    tool_name: &str,
    platform: &PlatformInfo,
) -> String {
    format!(
        "https://{}/{}/{}/releases/download/{}/{}_{}_{}.tar.gz",
        host, owner, repo, tag, tool_name, platform.os, platform.arch
    )
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_base: String,
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::with_api_base(GITHUB_API_BASE)
    }
}

impl GitHubClient {
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }

    /// All releases of `owner/repo` (first page of 100).
    pub async fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<GitHubRelease>> {
        let url = build_gh_releases_url(&self.api_base, owner, repo);
        let full_repo = format!("{}/{}", owner, repo);

        tracing::debug!("Fetching GitHub releases from: {}", url);

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .header(
                "User-Agent",
                format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION")),
            );

        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            request = request.header("Authorization", format!("token {}", token));
            tracing::debug!("Using GITHUB_TOKEN");
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            if response.status() == StatusCode::NOT_FOUND {
                return Err(GitHubReleaseError::RepoNotFound { repo: full_repo }.into());
            }
            return Err(GitHubReleaseError::RequestFailed {
                repo: full_repo,
                status: response.status(),
            }
            .into());
        }

        let releases: Vec<GitHubRelease> = response.json().await?;
        Ok(releases)
    }
}

#[async_trait]
impl ReleaseSource for GitHubClient {
    async fn list_release_tags(&self, owner: &str, repo: &str) -> Result<Vec<String>> {
        let releases = self.list_releases(owner, repo).await?;
        Ok(releases
            .into_iter()
            .filter(|r| !r.prerelease)
            .map(|r| r.tag_name)
            .collect())
    }
}
