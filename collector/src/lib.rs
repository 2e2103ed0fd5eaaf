//! Fetch orchestration: resolve the sources for a query, pull posts from each
//! one in turn, and pace requests against the remote quota.

use chrono::Utc;
use sentiscope_core::{CoreError, FetchConfig, Post, PostSource, RateLimitQuota};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What to wait for after a successful per-source fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    Courtesy(Duration),
    AwaitReset(Duration),
}

impl Pacing {
    pub fn delay(&self) -> Duration {
        match self {
            Pacing::Courtesy(delay) | Pacing::AwaitReset(delay) => *delay,
        }
    }
}

/// Decides the pause before the next source. Below the quota floor the
/// fetcher waits for the window reset; a reset already in the past waits zero.
pub fn pacing_after_fetch(quota: RateLimitQuota, config: &FetchConfig, now_epoch: i64) -> Pacing {
    match (quota.remaining, quota.reset_at) {
        (Some(remaining), Some(reset_at)) if remaining < config.quota_floor => {
            let wait = reset_at.saturating_sub(now_epoch).max(0) as u64;
            Pacing::AwaitReset(Duration::from_secs(wait))
        }
        _ => Pacing::Courtesy(config.courtesy_delay()),
    }
}

#[derive(Debug, Clone)]
pub struct FetchSummary {
    pub run_id: Uuid,
    pub query: String,
    pub sources_found: usize,
    pub sources_fetched: usize,
    pub sources_skipped: Vec<String>,
    pub rows: usize,
    pub elapsed: Duration,
}

pub struct FetchOrchestrator<S: PostSource + ?Sized> {
    source: Arc<S>,
    config: FetchConfig,
}

impl<S: PostSource + ?Sized> FetchOrchestrator<S> {
    pub fn new(source: Arc<S>, config: FetchConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// All posts for `query`, up to `per_source_limit` from each source.
    ///
    /// Inaccessible sources are skipped. Any other failure aborts the run
    /// and nothing collected so far is returned.
    pub async fn fetch(&self, query: &str, per_source_limit: usize) -> Result<Vec<Post>, CoreError> {
        let (posts, _summary) = self.fetch_with_summary(query, per_source_limit).await?;
        Ok(posts)
    }

    pub async fn fetch_with_summary(
        &self,
        query: &str,
        per_source_limit: usize,
    ) -> Result<(Vec<Post>, FetchSummary), CoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CoreError::invalid_input("Search query must not be empty"));
        }

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(%run_id, "Starting fetch for '{}' ({} posts per source)", query, per_source_limit);

        let sources = self.source.search_sources(query).await.map_err(|e| {
            error!(%run_id, "Source search failed: {}", e);
            e
        })?;
        info!(%run_id, "Resolved {} sources", sources.len());

        let mut posts = Vec::new();
        let mut sources_fetched = 0;
        let mut sources_skipped = Vec::new();

        for source_name in &sources {
            let raw_posts = match self
                .source
                .search_posts(source_name, query, per_source_limit)
                .await
            {
                Ok(raw_posts) => raw_posts,
                Err(e) if e.is_forbidden() => {
                    warn!(%run_id, "Forbidden: skipping source '{}'", source_name);
                    sources_skipped.push(source_name.clone());
                    continue;
                }
                Err(e) => {
                    error!(%run_id, "Fetching '{}' failed, aborting: {}", source_name, e);
                    return Err(e);
                }
            };

            info!(%run_id, "Fetched {} posts from '{}'", raw_posts.len(), source_name);
            sources_fetched += 1;
            posts.extend(
                raw_posts
                    .into_iter()
                    .map(|raw| Post::from_raw(source_name, raw)),
            );

            let quota = self.source.quota().await;
            match pacing_after_fetch(quota, &self.config, Utc::now().timestamp()) {
                Pacing::AwaitReset(delay) => {
                    warn!(
                        %run_id,
                        "Approaching rate limit ({:?} remaining), sleeping {:?}",
                        quota.remaining,
                        delay
                    );
                    sleep(delay).await;
                }
                Pacing::Courtesy(delay) => {
                    debug!(%run_id, "Courtesy delay {:?}", delay);
                    sleep(delay).await;
                }
            }
        }

        for post in &mut posts {
            post.post_time = post.post_time.to_month();
        }

        let summary = FetchSummary {
            run_id,
            query: query.to_string(),
            sources_found: sources.len(),
            sources_fetched,
            sources_skipped,
            rows: posts.len(),
            elapsed: started.elapsed(),
        };
        info!(
            %run_id,
            "Fetch complete: {} rows from {}/{} sources ({} skipped) in {:?}",
            summary.rows,
            summary.sources_fetched,
            summary.sources_found,
            summary.sources_skipped.len(),
            summary.elapsed
        );

        Ok((posts, summary))
    }
}
