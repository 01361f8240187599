//! In-memory test doubles for the hosting-provider interface.

use async_trait::async_trait;
use hangar_core::models::github::{
    GitHubBranch, GitHubCommit, GitHubCommitRef, GitHubRelease,
};
use hangar_core::network::SourceHost;
use hangar_core::{HangarError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A [`SourceHost`] backed by in-memory listings.
#[derive(Default)]
pub struct FakeSourceHost {
    releases: Vec<GitHubRelease>,
    branches: Vec<GitHubBranch>,
    /// Branch name -> commits, newest first.
    commits: HashMap<String, Vec<GitHubCommit>>,
    fail_with_network_error: bool,
    commit_queries: AtomicUsize,
}

impl FakeSourceHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a release; call order is newest-first, matching the API.
    pub fn with_release(mut self, tag: &str, prerelease: bool) -> Self {
        self.releases.push(GitHubRelease {
            tag_name: tag.to_string(),
            name: Some(tag.to_string()),
            published_at: None,
            body: None,
            prerelease,
            html_url: None,
        });
        self
    }

    /// Append a commit to a branch; call order is newest-first.
    pub fn with_commit(mut self, branch: &str, sha: &str) -> Self {
        self.commits
            .entry(branch.to_string())
            .or_default()
            .push(GitHubCommit {
                sha: sha.to_string(),
                commit: None,
            });
        if !self.branches.iter().any(|b| b.name == branch) {
            self.branches.push(GitHubBranch {
                name: branch.to_string(),
                commit: GitHubCommitRef {
                    sha: sha.to_string(),
                },
            });
        }
        self
    }

    /// Every call fails with a network error.
    pub fn with_network_failure(mut self) -> Self {
        self.fail_with_network_error = true;
        self
    }

    /// How many commit listings were requested.
    pub fn commit_queries(&self) -> usize {
        self.commit_queries.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail_with_network_error {
            Err(HangarError::Network {
                message: "simulated network failure".into(),
                cause: None,
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SourceHost for FakeSourceHost {
    async fn list_releases(&self, _repo: &str) -> Result<Vec<GitHubRelease>> {
        self.check_failure()?;
        Ok(self.releases.clone())
    }

    async fn list_branches(&self, _repo: &str) -> Result<Vec<GitHubBranch>> {
        self.check_failure()?;
        Ok(self.branches.clone())
    }

    async fn list_commits(&self, _repo: &str, branch: &str) -> Result<Vec<GitHubCommit>> {
        self.commit_queries.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.commits.get(branch).cloned().unwrap_or_default())
    }
}
