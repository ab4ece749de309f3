pub mod client;
pub mod retry;
pub mod types;

pub use client::ActivityClient;
pub use retry::{with_retry, RetryPolicy};

/// Where and how to reach the activity source.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// REST base, e.g. `https://api.figma.com/v1`.
    pub api_base: String,
    /// Header carrying the per-account secret.
    pub token_header: String,
    /// Base for human-facing deep links.
    pub link_base: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.figma.com/v1".to_string(),
            token_header: "X-Figma-Token".to_string(),
            link_base: "https://www.figma.com".to_string(),
        }
    }
}
