//! Image analysis backend (a Dify app).
//!
//! The handler only sees the `Analyzer` trait; which upload strategy the Dify client uses is
//! a configuration detail.

mod dify;

use crate::channels::Attachment;
use async_trait::async_trait;

pub use dify::DifyClient;

/// Raw backend output carried into errors and user notices is cut to this many characters.
pub const RAW_RESPONSE_PREVIEW_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("analysis api error: {0}")]
    Api(String),
    /// The backend answered 2xx with a body that is not JSON.
    #[error("analysis response is not JSON")]
    Parse { raw: String },
    #[error("analysis api key or url not configured")]
    NotConfigured,
}

/// Submit one image for analysis.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Returns the answer text, or `None` when the backend answered without one.
    async fn analyze(
        &self,
        user: &str,
        image: &Attachment,
    ) -> Result<Option<String>, AnalysisError>;
}
