//! GitHub listing types for releases, branches, and commits.

use serde::{Deserialize, Serialize};

/// GitHub release information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// GitHub branch information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubBranch {
    pub name: String,
    pub commit: GitHubCommitRef,
}

/// Commit reference embedded in a branch listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommitRef {
    pub sha: String,
}

/// GitHub commit information from the commits listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    #[serde(default)]
    pub commit: Option<GitHubCommitDetail>,
}

/// Nested commit detail (message and author date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommitDetail {
    #[serde(default)]
    pub message: Option<String>,
}

/// Disk-cache wrapper for a GitHub listing, with fetch time and TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedListing<T> {
    pub last_fetched: String,
    pub ttl: u64,
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_deserialization_defaults() {
        let json = r#"{"tag_name": "v1.0.0"}"#;
        let release: GitHubRelease = serde_json::from_str(json).unwrap();
        assert_eq!(release.tag_name, "v1.0.0");
        assert!(!release.prerelease);
        assert!(release.body.is_none());
    }

    #[test]
    fn test_branch_deserialization() {
        let json = r#"{"name": "master", "commit": {"sha": "abc123"}}"#;
        let branch: GitHubBranch = serde_json::from_str(json).unwrap();
        assert_eq!(branch.name, "master");
        assert_eq!(branch.commit.sha, "abc123");
    }

    #[test]
    fn test_commit_deserialization() {
        let json = r#"{"sha": "abc123", "commit": {"message": "fix"}}"#;
        let commit: GitHubCommit = serde_json::from_str(json).unwrap();
        assert_eq!(commit.sha, "abc123");
        assert_eq!(commit.commit.unwrap().message.as_deref(), Some("fix"));
    }
}
