use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use reqwest::header::HeaderValue;
use reqwest::{Client, Method, Response, StatusCode};
use sentiscope_core::{CoreError, RateLimitQuota, RawPost, SourceApiError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const REDDIT_WEB_BASE: &str = "https://www.reddit.com";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Reddit caps listing pages at 100 children.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListing<T> {
    #[serde(default)]
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingData<T> {
    #[serde(default = "Vec::new")]
    pub children: Vec<RedditListingChild<T>>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingChild<T> {
    #[serde(default)]
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditPostData {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    pub created_utc: f64,
    #[serde(default)]
    pub is_self: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditSubredditData {
    pub display_name: String,
    #[serde(default)]
    pub subscribers: Option<u64>,
    #[serde(default)]
    pub over18: Option<bool>,
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: Url,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(user_agent: String, timeout: Duration) -> Result<Self, CoreError> {
        Self::with_base_url(user_agent, timeout, REDDIT_API_BASE)
    }

    pub fn with_base_url(
        user_agent: String,
        timeout: Duration,
        base_url: &str,
    ) -> Result<Self, CoreError> {
        let base_url = Url::parse(base_url).map_err(|e| CoreError::InvalidInput {
            message: format!("Invalid API base URL {}: {}", base_url, e),
        })?;

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig::reddit_oauth())),
            base_url,
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn quota(&self) -> RateLimitQuota {
        self.rate_limiter.quota().await
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, &str)],
    ) -> Result<Response, CoreError> {
        let url = self.base_url.join(endpoint).map_err(|e| CoreError::InvalidInput {
            message: format!("Invalid endpoint {}: {}", endpoint, e),
        })?;
        let start_time = Instant::now();

        let permit = self.rate_limiter.acquire_permit().await;
        debug!(
            "Acquired rate limit permit for {} {} after {:?}",
            method, endpoint, permit.queue_wait_time
        );

        let request_builder = self
            .http_client
            .request(method.clone(), url)
            .bearer_auth(access_token)
            .query(query_params);

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(SourceApiError::RequestTimeout.into());
                }
                return Err(CoreError::Network(e));
            }
        };

        // Quota headers ride along on error responses too
        self.rate_limiter.record_headers(response.headers()).await;

        let status = response.status();
        if !status.is_success() {
            let api_error =
                map_error_status(status, response.headers().get("retry-after"), endpoint);
            match &api_error {
                SourceApiError::Forbidden { .. } => {
                    warn!("Access forbidden for {}", endpoint)
                }
                SourceApiError::RateLimitExceeded { retry_after } => {
                    warn!("Rate limited, retry after {} seconds", retry_after)
                }
                _ => error!("Request failed with status: {} for {}", status, endpoint),
            }
            return Err(api_error.into());
        }

        debug!(
            "Request successful: {} {} in {:?}",
            status,
            endpoint,
            start_time.elapsed()
        );
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, &str)],
    ) -> Result<T, CoreError> {
        let response = self
            .make_request(Method::GET, endpoint, access_token, query_params)
            .await?;

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                return CoreError::from(SourceApiError::RequestTimeout);
            }
            error!("Failed to parse response from {}: {}", endpoint, e);
            CoreError::from(SourceApiError::InvalidResponse {
                details: format!("Failed to parse response from {}", endpoint),
            })
        })
    }

    /// One page of subreddits matching `query`, in Reddit's relevance order.
    pub async fn search_subreddits(
        &self,
        access_token: &str,
        query: &str,
        after: Option<&str>,
    ) -> Result<RedditListing<RedditSubredditData>, CoreError> {
        let limit = MAX_PAGE_SIZE.to_string();
        let mut params = vec![("q", query), ("limit", limit.as_str())];
        if let Some(after_val) = after {
            params.push(("after", after_val));
        }

        let listing: RedditListing<RedditSubredditData> = self
            .get_json("/subreddits/search", access_token, &params)
            .await?;

        debug!(
            "Subreddit search for '{}' returned {} results",
            query,
            listing.data.children.len()
        );
        Ok(listing)
    }

    /// One page of posts in `subreddit` matching `query`.
    pub async fn search_subreddit_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        query: &str,
        limit: usize,
        after: Option<&str>,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let endpoint = format!("/r/{}/search", subreddit);
        let limit = limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut params = vec![
            ("q", query),
            ("restrict_sr", "1"),
            ("limit", limit.as_str()),
        ];
        if let Some(after_val) = after {
            params.push(("after", after_val));
        }

        let listing: RedditListing<RedditPostData> =
            self.get_json(&endpoint, access_token, &params).await?;

        info!(
            "Retrieved {} posts from r/{}",
            listing.data.children.len(),
            subreddit
        );
        Ok(listing)
    }
}

/// Maps a non-success status to the error the fetcher acts on.
pub fn map_error_status(
    status: StatusCode,
    retry_after: Option<&HeaderValue>,
    resource: &str,
) -> SourceApiError {
    match status {
        StatusCode::UNAUTHORIZED => SourceApiError::InvalidToken,
        StatusCode::FORBIDDEN => SourceApiError::Forbidden {
            resource: resource.to_string(),
        },
        StatusCode::NOT_FOUND => SourceApiError::SubredditNotFound {
            subreddit: resource.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => SourceApiError::RateLimitExceeded {
            retry_after: retry_after
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        status if status.is_server_error() => SourceApiError::ServerError {
            status_code: status.as_u16(),
        },
        status => SourceApiError::InvalidResponse {
            details: format!("Unexpected status {} for {}", status, resource),
        },
    }
}

impl From<RedditPostData> for RawPost {
    fn from(post_data: RedditPostData) -> Self {
        let url = if post_data.url.is_empty() {
            format!("{}{}", REDDIT_WEB_BASE, post_data.permalink)
        } else {
            post_data.url
        };

        Self {
            title: post_data.title,
            text: Some(post_data.selftext),
            created_utc: post_data.created_utc as i64,
            url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSTS_PAGE: &str = r#"{
        "kind": "Listing",
        "data": {
            "after": "t3_next",
            "dist": 2,
            "children": [
                {"kind": "t3", "data": {
                    "id": "abc", "title": "Async is great", "selftext": "tokio rocks",
                    "subreddit": "rust", "url": "https://www.reddit.com/r/rust/comments/abc/",
                    "permalink": "/r/rust/comments/abc/", "created_utc": 1714557600.0,
                    "is_self": true, "score": 10
                }},
                {"kind": "t3", "data": {
                    "id": "def", "title": "Link post", "selftext": "",
                    "subreddit": "rust", "url": "",
                    "permalink": "/r/rust/comments/def/", "created_utc": 1714644000.7
                }}
            ]
        }
    }"#;

    #[test]
    fn test_api_client_creation() {
        let client =
            RedditApiClient::new("test-user-agent/1.0".to_string(), Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.user_agent(), "test-user-agent/1.0");
        assert_eq!(client.base_url.as_str(), "https://oauth.reddit.com/");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = RedditApiClient::with_base_url(
            "ua".to_string(),
            Duration::from_secs(5),
            "not a url",
        );
        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));
    }

    #[test]
    fn test_post_listing_parsing_and_conversion() {
        let listing: RedditListing<RedditPostData> = serde_json::from_str(POSTS_PAGE).unwrap();
        assert_eq!(listing.data.after.as_deref(), Some("t3_next"));
        assert_eq!(listing.data.children.len(), 2);

        let posts: Vec<RawPost> = listing
            .data
            .children
            .into_iter()
            .map(|child| child.data.into())
            .collect();

        assert_eq!(posts[0].title, "Async is great");
        assert_eq!(posts[0].text.as_deref(), Some("tokio rocks"));
        assert_eq!(posts[0].created_utc, 1714557600);
        assert_eq!(posts[0].url, "https://www.reddit.com/r/rust/comments/abc/");

        // Empty selftext is still present text; empty url falls back to the permalink
        assert_eq!(posts[1].text.as_deref(), Some(""));
        assert_eq!(posts[1].created_utc, 1714644000);
        assert_eq!(posts[1].url, "https://www.reddit.com/r/rust/comments/def/");
    }

    #[test]
    fn test_subreddit_listing_parsing() {
        let json = r#"{"kind": "Listing", "data": {"after": null, "children": [
            {"kind": "t5", "data": {"display_name": "rust", "subscribers": 300000}},
            {"kind": "t5", "data": {"display_name": "learnrust"}}
        ]}}"#;
        let listing: RedditListing<RedditSubredditData> = serde_json::from_str(json).unwrap();
        let names: Vec<_> = listing
            .data
            .children
            .iter()
            .map(|child| child.data.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["rust", "learnrust"]);
        assert!(listing.data.after.is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            map_error_status(StatusCode::UNAUTHORIZED, None, "/r/rust/search"),
            SourceApiError::InvalidToken
        );
        assert_eq!(
            map_error_status(StatusCode::FORBIDDEN, None, "/r/private/search"),
            SourceApiError::Forbidden {
                resource: "/r/private/search".to_string()
            }
        );
        assert_eq!(
            map_error_status(StatusCode::NOT_FOUND, None, "/r/gone/search"),
            SourceApiError::SubredditNotFound {
                subreddit: "/r/gone/search".to_string()
            }
        );
        assert_eq!(
            map_error_status(StatusCode::BAD_GATEWAY, None, "/subreddits/search"),
            SourceApiError::ServerError { status_code: 502 }
        );
        assert!(matches!(
            map_error_status(StatusCode::BAD_REQUEST, None, "/subreddits/search"),
            SourceApiError::InvalidResponse { .. }
        ));
    }

    #[test]
    fn test_rate_limit_retry_after() {
        let header = HeaderValue::from_static("17");
        assert_eq!(
            map_error_status(StatusCode::TOO_MANY_REQUESTS, Some(&header), "/r/rust/search"),
            SourceApiError::RateLimitExceeded { retry_after: 17 }
        );

        let garbage = HeaderValue::from_static("soon");
        assert_eq!(
            map_error_status(StatusCode::TOO_MANY_REQUESTS, Some(&garbage), "/r/rust/search"),
            SourceApiError::RateLimitExceeded { retry_after: 60 }
        );
        assert_eq!(
            map_error_status(StatusCode::TOO_MANY_REQUESTS, None, "/r/rust/search"),
            SourceApiError::RateLimitExceeded { retry_after: 60 }
        );
    }

    #[tokio::test]
    async fn test_fresh_client_has_no_quota() {
        let client =
            RedditApiClient::new("test-user-agent/1.0".to_string(), Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.quota().await, RateLimitQuota::default());
    }
}
