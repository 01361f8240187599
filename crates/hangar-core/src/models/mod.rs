//! Shared data types for the Hangar engine.

pub mod github;
pub mod version;

pub use github::{GitHubBranch, GitHubCommit, GitHubRelease};
pub use version::VersionSpec;
