//! Version resolution against the hosting provider.
//!
//! Resolves the next installable version for a descriptor and diffs it
//! against an installed version. Comparisons are always variant-matched:
//! release installs compare tags, branch installs compare commit SHAs, and
//! the two are never cross-compared.

use crate::descriptors::PackageDescriptor;
use crate::registry::InstalledPackage;
use hangar_core::models::github::GitHubRelease;
use hangar_core::network::SourceHost;
use hangar_core::{HangarError, Result, VersionSpec};
use std::sync::Arc;
use tracing::{debug, warn};

/// Pick the newest eligible release.
///
/// Tags that parse as semver (with an optional `v` prefix) are ordered by
/// version so an out-of-order listing cannot select a stale tag; when no
/// candidate parses, the API's newest-first ordering is trusted.
fn newest_release(
    releases: &[GitHubRelease],
    include_prerelease: bool,
) -> Option<&GitHubRelease> {
    let candidates: Vec<&GitHubRelease> = releases
        .iter()
        .filter(|r| include_prerelease || !r.prerelease)
        .collect();

    candidates
        .iter()
        .filter_map(|r| {
            semver::Version::parse(r.tag_name.trim_start_matches('v'))
                .ok()
                .map(|v| (v, *r))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, r)| r)
        .or_else(|| candidates.first().copied())
}

/// Resolves installable versions for package descriptors.
pub struct VersionResolver {
    host: Arc<dyn SourceHost>,
}

impl VersionResolver {
    pub fn new(host: Arc<dyn SourceHost>) -> Self {
        Self { host }
    }

    /// Resolve the latest installable version for a descriptor.
    ///
    /// Descriptors flagged `ignores_release_tags` always resolve the head
    /// commit of the main branch. Otherwise the newest release tag wins
    /// (optionally including prereleases), falling back to branch mode
    /// when the project has no releases at all.
    pub async fn resolve_latest(
        &self,
        descriptor: &PackageDescriptor,
        include_prerelease: bool,
    ) -> Result<VersionSpec> {
        if descriptor.ignores_release_tags {
            return self.resolve_branch_head(descriptor).await;
        }

        let releases = self.host.list_releases(&descriptor.repo()).await?;
        match newest_release(&releases, include_prerelease) {
            Some(release) => Ok(VersionSpec::Release {
                tag: release.tag_name.clone(),
                prerelease: release.prerelease,
                is_latest: true,
            }),
            None => {
                debug!(
                    "{} has no releases, falling back to branch mode",
                    descriptor.repo()
                );
                self.resolve_branch_head(descriptor).await
            }
        }
    }

    /// Check whether an update is available for an installed package.
    ///
    /// Fail-closed: any network or API failure returns `false` and is
    /// logged; the caller retries on its next polling interval rather than
    /// blocking a launch on connectivity.
    pub async fn check_update(
        &self,
        installed: &InstalledPackage,
        descriptor: &PackageDescriptor,
    ) -> bool {
        match self.resolve_matching_latest(installed, descriptor).await {
            Ok(Some(latest)) => !installed.version.matches(&latest),
            Ok(None) => false,
            Err(e) => {
                warn!(
                    "Update check for {} failed (retried next poll): {}",
                    installed.display_name, e
                );
                false
            }
        }
    }

    /// Resolve the version an update would move to, or `None` when the
    /// install is already current.
    pub async fn resolve_update_target(
        &self,
        installed: &InstalledPackage,
        descriptor: &PackageDescriptor,
    ) -> Result<Option<VersionSpec>> {
        let latest = self.resolve_matching_latest(installed, descriptor).await?;
        Ok(latest.filter(|spec| !installed.version.matches(spec)))
    }

    /// Resolve the latest version in the installed package's own mode.
    ///
    /// A release-mode install only ever consults releases; a branch-mode
    /// install only consults its branch's commits.
    async fn resolve_matching_latest(
        &self,
        installed: &InstalledPackage,
        descriptor: &PackageDescriptor,
    ) -> Result<Option<VersionSpec>> {
        match &installed.version {
            VersionSpec::Release { prerelease, .. } => {
                let releases = self.host.list_releases(&descriptor.repo()).await?;
                // A prerelease install keeps seeing prereleases; a stable
                // install only moves between stable tags.
                Ok(newest_release(&releases, *prerelease).map(|r| VersionSpec::Release {
                    tag: r.tag_name.clone(),
                    prerelease: r.prerelease,
                    is_latest: true,
                }))
            }
            VersionSpec::Branch { name, .. } => {
                let commits = self.host.list_commits(&descriptor.repo(), name).await?;
                Ok(commits.first().map(|c| VersionSpec::Branch {
                    name: name.clone(),
                    commit: c.sha.clone(),
                    is_latest: true,
                }))
            }
        }
    }

    async fn resolve_branch_head(&self, descriptor: &PackageDescriptor) -> Result<VersionSpec> {
        let repo = descriptor.repo();
        let commits = self
            .host
            .list_commits(&repo, &descriptor.main_branch)
            .await?;

        if let Some(head) = commits.first() {
            return Ok(VersionSpec::Branch {
                name: descriptor.main_branch.clone(),
                commit: head.sha.clone(),
                is_latest: true,
            });
        }

        // The main branch may be named differently upstream; take the
        // first listed branch as a last resort.
        let branches = self.host.list_branches(&repo).await?;
        branches
            .first()
            .map(|b| VersionSpec::Branch {
                name: b.name.clone(),
                commit: b.commit.sha.clone(),
                is_latest: true,
            })
            .ok_or(HangarError::NoVersionsAvailable { repo })
    }
}
