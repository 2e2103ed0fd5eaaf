//! Collaborator seams: the remote post search service and the sentiment model.
//!
//! Both are constructed once at startup and handed to the fetcher and the
//! classifier adapter; tests substitute in-memory implementations.

use crate::{CoreError, Prediction, RateLimitQuota, RawPost};
use async_trait::async_trait;

#[async_trait]
pub trait PostSource: Send + Sync {
    /// Sources relevant to `query`, in the service's relevance order.
    async fn search_sources(&self, query: &str) -> Result<Vec<String>, CoreError>;

    /// Up to `limit` posts in `source` matching `query`. Inaccessible sources
    /// fail with `SourceApiError::Forbidden`.
    async fn search_posts(
        &self,
        source: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RawPost>, CoreError>;

    /// Remaining remote quota as of the last response.
    async fn quota(&self) -> RateLimitQuota;
}

#[async_trait]
pub trait SentimentModel: Send + Sync {
    /// One prediction per input text, in input order.
    async fn classify_batch(
        &self,
        texts: &[String],
        truncation: bool,
        max_length: usize,
    ) -> Result<Vec<Prediction>, CoreError>;

    fn name(&self) -> &str;
}
