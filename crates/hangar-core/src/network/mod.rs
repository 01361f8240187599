//! Network access: HTTP client, retry policy, and the GitHub source host.

pub mod client;
pub mod github;
pub mod retry;

pub use client::HttpClient;
pub use github::{GitHubClient, SourceHost};
pub use retry::{retry_async, RetryConfig, RetryStats};
