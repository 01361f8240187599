//! Installable version representation.

use serde::{Deserialize, Serialize};

/// A resolved, installable version of a package.
///
/// Exactly one variant applies to a given install: packages distributed via
/// release tags use `Release`, packages tracked from a branch head use
/// `Branch`. Comparison is variant-matched only — a release-mode install is
/// never compared against branch/commit data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VersionSpec {
    Release {
        tag: String,
        #[serde(default)]
        prerelease: bool,
        #[serde(default)]
        is_latest: bool,
    },
    Branch {
        name: String,
        commit: String,
        #[serde(default)]
        is_latest: bool,
    },
}

impl VersionSpec {
    /// Construct a release-mode version.
    pub fn release(tag: impl Into<String>, prerelease: bool) -> Self {
        VersionSpec::Release {
            tag: tag.into(),
            prerelease,
            is_latest: false,
        }
    }

    /// Construct a branch-mode version pinned at a commit.
    pub fn branch(name: impl Into<String>, commit: impl Into<String>) -> Self {
        VersionSpec::Branch {
            name: name.into(),
            commit: commit.into(),
            is_latest: false,
        }
    }

    pub fn is_release_mode(&self) -> bool {
        matches!(self, VersionSpec::Release { .. })
    }

    /// Variant-matched equality for update checks.
    ///
    /// Release installs compare tag strings; branch installs compare commit
    /// SHAs. Mismatched variants never compare equal — switching a package
    /// between release and branch tracking always reads as an update.
    pub fn matches(&self, other: &VersionSpec) -> bool {
        match (self, other) {
            (VersionSpec::Release { tag: a, .. }, VersionSpec::Release { tag: b, .. }) => a == b,
            (VersionSpec::Branch { commit: a, .. }, VersionSpec::Branch { commit: b, .. }) => {
                a == b
            }
            _ => false,
        }
    }

    /// Short human-readable label: the tag, or `branch@shortsha`.
    pub fn display_label(&self) -> String {
        match self {
            VersionSpec::Release { tag, .. } => tag.clone(),
            VersionSpec::Branch { name, commit, .. } => {
                let short = &commit[..commit.len().min(7)];
                format!("{}@{}", name, short)
            }
        }
    }
}

impl std::fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_label())
    }
}
