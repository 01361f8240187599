//! GitHub API source host with caching.
//!
//! Provides:
//! - Releases, branches, and commits listings behind the narrow
//!   [`SourceHost`] interface
//! - Three-tier releases caching: in-memory → disk → network
//! - Offline-first strategy with stale data fallback
//! - Rate limit handling

use crate::config::NetworkConfig;
use crate::models::github::{CachedListing, GitHubBranch, GitHubCommit, GitHubRelease};
use crate::network::client::HttpClient;
use crate::network::retry::{retry_async, RetryConfig};
use crate::{HangarError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mini_moka::sync::Cache;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Narrow interface over a repository hosting provider.
///
/// The version resolver only needs listings; keeping this small lets tests
/// substitute an in-memory host and keeps the engine decoupled from GitHub
/// specifics.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// List releases for `owner/name`, newest first.
    async fn list_releases(&self, repo: &str) -> Result<Vec<GitHubRelease>>;

    /// List branches for `owner/name`.
    async fn list_branches(&self, repo: &str) -> Result<Vec<GitHubBranch>>;

    /// List commits on a branch of `owner/name`, newest first.
    async fn list_commits(&self, repo: &str, branch: &str) -> Result<Vec<GitHubCommit>>;
}

/// GitHub API client implementing [`SourceHost`].
pub struct GitHubClient {
    http: Arc<HttpClient>,
    /// In-memory caches with TTL, one per listing kind.
    releases_cache: Cache<String, Vec<GitHubRelease>>,
    branches_cache: Cache<String, Vec<GitHubBranch>>,
    commits_cache: Cache<String, Vec<GitHubCommit>>,
    /// Directory for the releases disk cache.
    cache_dir: PathBuf,
    ttl: Duration,
}

impl GitHubClient {
    /// Create a new GitHub client with the default cache TTL.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_ttl(cache_dir, NetworkConfig::GITHUB_CACHE_TTL)
    }

    /// Create a new GitHub client with a custom TTL.
    pub fn with_ttl(cache_dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let http = HttpClient::new()?;
        Ok(Self {
            http: Arc::new(http),
            releases_cache: Cache::builder().time_to_live(ttl).max_capacity(32).build(),
            branches_cache: Cache::builder().time_to_live(ttl).max_capacity(32).build(),
            commits_cache: Cache::builder()
                // Commit listings go stale quickly; keep them briefly
                .time_to_live(Duration::from_secs(300))
                .max_capacity(64)
                .build(),
            cache_dir: cache_dir.into(),
            ttl,
        })
    }

    /// Invalidate all cached listings for a repository.
    pub fn invalidate(&self, repo: &str) {
        self.releases_cache.invalidate(&repo.to_string());
        self.branches_cache.invalidate(&repo.to_string());
        let path = self.disk_cache_path(repo);
        if path.exists() {
            let _ = std::fs::remove_file(&path);
        }
    }

    fn disk_cache_path(&self, repo: &str) -> PathBuf {
        let safe_key = repo.replace('/', "-");
        self.cache_dir
            .join(format!("github-releases-{}.json", safe_key))
    }

    fn read_disk_cache(&self, repo: &str) -> Option<CachedListing<GitHubRelease>> {
        let path = self.disk_cache_path(repo);
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!("Failed to parse disk cache {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read disk cache {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write_disk_cache(&self, repo: &str, releases: &[GitHubRelease]) -> Result<()> {
        let path = self.disk_cache_path(repo);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HangarError::io_with_path(e, parent.to_path_buf()))?;
        }

        let cache = CachedListing {
            last_fetched: Utc::now().to_rfc3339(),
            ttl: self.ttl.as_secs(),
            items: releases.to_vec(),
        };

        let contents = serde_json::to_string_pretty(&cache)?;
        std::fs::write(&path, contents).map_err(|e| HangarError::io_with_path(e, path))?;
        Ok(())
    }

    fn is_disk_cache_valid(cache: &CachedListing<GitHubRelease>) -> bool {
        if let Ok(last_fetched) = DateTime::parse_from_rfc3339(&cache.last_fetched) {
            let age = Utc::now().signed_duration_since(last_fetched);
            age.num_seconds() < cache.ttl as i64
        } else {
            false
        }
    }

    /// GET a JSON listing with retry, mapping rate limits and API errors.
    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let retry_config = RetryConfig::new()
            .with_max_attempts(NetworkConfig::MAX_RETRIES)
            .with_base_delay(Duration::from_secs(2));

        let http = self.http.clone();
        let url_owned = url.to_string();

        let (result, stats) = retry_async(
            &retry_config,
            || {
                let http = http.clone();
                let url = url_owned.clone();
                async move {
                    let headers = vec![(
                        "Accept".to_string(),
                        "application/vnd.github.v3+json".to_string(),
                    )];
                    http.get_with_headers(&url, &headers).await
                }
            },
            |e| e.is_retryable(),
        )
        .await;

        if stats.attempts > 1 {
            debug!("GitHub API request succeeded after {} attempts", stats.attempts);
        }

        let response = result?;
        let status = response.status();

        if status == StatusCode::FORBIDDEN {
            return Err(HangarError::RateLimited {
                service: "GitHub".to_string(),
                retry_after_secs: None,
            });
        }

        if !status.is_success() {
            return Err(HangarError::GitHubApi {
                message: format!("GitHub API returned {}", status),
                status_code: Some(status.as_u16()),
            });
        }

        response.json::<T>().await.map_err(|e| HangarError::Json {
            message: format!("Failed to parse GitHub response: {}", e),
            source: None,
        })
    }

    async fn fetch_all_releases(&self, repo: &str) -> Result<Vec<GitHubRelease>> {
        let mut all_releases = Vec::new();
        let per_page = NetworkConfig::GITHUB_PER_PAGE;

        for page in 1..=NetworkConfig::GITHUB_MAX_PAGES {
            let url = format!(
                "{}/repos/{}/releases?per_page={}&page={}",
                NetworkConfig::GITHUB_API_BASE,
                repo,
                per_page,
                page
            );

            let releases: Vec<GitHubRelease> = self.fetch_json(&url).await?;
            let count = releases.len();
            all_releases.extend(releases);

            if count < per_page as usize {
                break;
            }
        }

        info!("Fetched {} releases from GitHub for {}", all_releases.len(), repo);
        Ok(all_releases)
    }
}

#[async_trait]
impl SourceHost for GitHubClient {
    /// Get releases with the offline-first strategy:
    /// 1. In-memory cache
    /// 2. Valid disk cache
    /// 3. Network, falling back to stale disk cache on failure
    async fn list_releases(&self, repo: &str) -> Result<Vec<GitHubRelease>> {
        let cache_key = repo.to_string();

        if let Some(releases) = self.releases_cache.get(&cache_key) {
            debug!("GitHub releases cache hit (memory) for {}", repo);
            return Ok(releases);
        }

        if let Some(disk_cache) = self.read_disk_cache(repo) {
            if Self::is_disk_cache_valid(&disk_cache) {
                debug!("GitHub releases cache hit (disk) for {}", repo);
                self.releases_cache
                    .insert(cache_key, disk_cache.items.clone());
                return Ok(disk_cache.items);
            }

            // Stale cache available: try network, fall back to stale
            debug!("GitHub releases cache stale for {}, trying network", repo);
            match self.fetch_all_releases(repo).await {
                Ok(releases) => {
                    self.releases_cache.insert(cache_key, releases.clone());
                    let _ = self.write_disk_cache(repo, &releases);
                    return Ok(releases);
                }
                Err(e) => {
                    warn!("Network fetch failed for {}, using stale cache: {}", repo, e);
                    self.releases_cache
                        .insert(cache_key, disk_cache.items.clone());
                    return Ok(disk_cache.items);
                }
            }
        }

        let releases = self.fetch_all_releases(repo).await?;
        self.releases_cache.insert(cache_key, releases.clone());
        let _ = self.write_disk_cache(repo, &releases);
        Ok(releases)
    }

    async fn list_branches(&self, repo: &str) -> Result<Vec<GitHubBranch>> {
        let cache_key = repo.to_string();

        if let Some(branches) = self.branches_cache.get(&cache_key) {
            return Ok(branches);
        }

        let url = format!(
            "{}/repos/{}/branches?per_page={}",
            NetworkConfig::GITHUB_API_BASE,
            repo,
            NetworkConfig::GITHUB_PER_PAGE
        );
        let branches: Vec<GitHubBranch> = self.fetch_json(&url).await?;
        self.branches_cache.insert(cache_key, branches.clone());
        Ok(branches)
    }

    async fn list_commits(&self, repo: &str, branch: &str) -> Result<Vec<GitHubCommit>> {
        let cache_key = format!("{}@{}", repo, branch);

        if let Some(commits) = self.commits_cache.get(&cache_key) {
            return Ok(commits);
        }

        let url = format!(
            "{}/repos/{}/commits?sha={}&per_page=30",
            NetworkConfig::GITHUB_API_BASE,
            repo,
            branch
        );
        let commits: Vec<GitHubCommit> = self.fetch_json(&url).await?;
        self.commits_cache.insert(cache_key, commits.clone());
        Ok(commits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_release(tag: &str) -> GitHubRelease {
        GitHubRelease {
            tag_name: tag.to_string(),
            name: Some(format!("Release {}", tag)),
            published_at: Some("2024-01-01T00:00:00Z".to_string()),
            body: None,
            prerelease: false,
            html_url: None,
        }
    }

    #[test]
    fn test_disk_cache_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let client = GitHubClient::new(temp_dir.path()).unwrap();

        let releases = vec![sample_release("v1.0.0")];
        client.write_disk_cache("test/repo", &releases).unwrap();

        let cached = client.read_disk_cache("test/repo").unwrap();
        assert_eq!(cached.items.len(), 1);
        assert_eq!(cached.items[0].tag_name, "v1.0.0");
        assert!(GitHubClient::is_disk_cache_valid(&cached));
    }

    #[test]
    fn test_expired_disk_cache_invalid() {
        let cache = CachedListing {
            last_fetched: "2020-01-01T00:00:00+00:00".to_string(),
            ttl: 3600,
            items: vec![sample_release("v1.0.0")],
        };
        assert!(!GitHubClient::is_disk_cache_valid(&cache));
    }

    #[test]
    fn test_invalidate_removes_disk_cache() {
        let temp_dir = TempDir::new().unwrap();
        let client = GitHubClient::new(temp_dir.path()).unwrap();

        client
            .write_disk_cache("test/repo", &[sample_release("v1.0.0")])
            .unwrap();
        assert!(client.disk_cache_path("test/repo").exists());

        client.invalidate("test/repo");
        assert!(!client.disk_cache_path("test/repo").exists());
    }

    #[test]
    fn test_disk_cache_path_sanitizes_slash() {
        let temp_dir = TempDir::new().unwrap();
        let client = GitHubClient::new(temp_dir.path()).unwrap();
        let path = client.disk_cache_path("owner/name");
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("owner-name"));
    }
}
