//! Reddit implementation of [`PostSource`].
//!
//! Authenticates with the app-only client-credentials grant, then pages
//! through subreddit search and per-subreddit post search. Every request
//! passes the local token bucket, and the remote quota headers are kept for
//! the fetcher to pace itself against.

pub mod api;
pub mod rate_limiter;
pub mod retry;

#[cfg(test)]
mod tests;

use api::{RedditApiClient, MAX_PAGE_SIZE};
use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::http::header::USER_AGENT;
use oauth2::http::HeaderValue;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthType, AuthUrl, ClientId, ClientSecret, HttpRequest, Scope, TokenResponse, TokenUrl};
use retry::{RetryConfig, RetryExecutor};
use sentiscope_core::{
    CoreError, PostSource, RateLimitQuota, RawPost, RedditConfig, SourceApiError,
};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
/// Tokens this close to expiry are refreshed before use.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: Instant,
}

impl CachedToken {
    pub fn new(access_token: String, expires_in: Option<Duration>) -> Self {
        Self {
            access_token,
            expires_at: Instant::now() + expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME),
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now + TOKEN_REFRESH_MARGIN
    }
}

pub struct RedditClient {
    api: RedditApiClient,
    oauth_client: BasicClient,
    user_agent: HeaderValue,
    token: Mutex<Option<CachedToken>>,
    retry: RetryExecutor,
    max_sources: usize,
}

impl RedditClient {
    pub fn new(config: &RedditConfig) -> Result<Self, CoreError> {
        let (client_id, client_secret) = config.credentials()?;

        let oauth_client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            AuthUrl::new(AUTH_URL.to_string()).map_err(invalid_url)?,
            Some(TokenUrl::new(TOKEN_URL.to_string()).map_err(invalid_url)?),
        )
        .set_auth_type(AuthType::BasicAuth);

        let user_agent =
            HeaderValue::from_str(&config.user_agent).map_err(|_| CoreError::InvalidInput {
                message: format!("Invalid user agent: {}", config.user_agent),
            })?;

        let api = RedditApiClient::new(config.user_agent.clone(), config.request_timeout())?;

        Ok(Self {
            api,
            oauth_client,
            user_agent,
            token: Mutex::new(None),
            retry: RetryExecutor::new(RetryConfig::reddit()),
            max_sources: config.max_sources,
        })
    }

    pub fn max_sources(&self) -> usize {
        self.max_sources
    }

    /// Returns the cached bearer token, requesting a new one when it is
    /// missing or about to expire.
    pub async fn access_token(&self) -> Result<String, CoreError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh(Instant::now())) {
            return Ok(token.access_token.clone());
        }

        debug!("Requesting application-only access token");
        let user_agent = self.user_agent.clone();
        let response = self
            .oauth_client
            .exchange_client_credentials()
            .add_scope(Scope::new("read".to_string()))
            .request_async(move |mut request: HttpRequest| {
                // Reddit rejects token requests without a descriptive user agent
                request.headers.insert(USER_AGENT, user_agent);
                async_http_client(request)
            })
            .await
            .map_err(|e| SourceApiError::AuthenticationFailed {
                reason: e.to_string(),
            })?;

        let token = CachedToken::new(
            response.access_token().secret().clone(),
            response.expires_in(),
        );
        info!("Obtained Reddit access token");
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    pub async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Runs `call` with a bearer token under the retry policy. A rejected
    /// token is dropped and the call is made once more with a fresh one.
    async fn with_token<T, F, Fut>(&self, operation_name: &str, call: F) -> Result<T, CoreError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let call = &call;
        with_reauthentication(
            move || {
                self.retry.execute(operation_name, move || async move {
                    let token = self.access_token().await?;
                    call(token).await
                })
            },
            move || self.invalidate_token(),
        )
        .await
    }
}

/// Runs `operation`, and after an `InvalidToken` failure runs `invalidate`
/// and tries exactly once more.
pub(crate) async fn with_reauthentication<T, F, Fut, I, IFut>(
    operation: F,
    invalidate: I,
) -> Result<T, CoreError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
    I: Fn() -> IFut,
    IFut: Future<Output = ()>,
{
    match operation().await {
        Err(CoreError::SourceApi(SourceApiError::InvalidToken)) => {
            warn!("Access token rejected, re-authenticating");
            invalidate().await;
            let result = operation().await;
            if let Err(CoreError::SourceApi(SourceApiError::InvalidToken)) = &result {
                invalidate().await;
            }
            result
        }
        result => result,
    }
}

fn invalid_url(error: oauth2::url::ParseError) -> CoreError {
    CoreError::Internal {
        message: format!("Invalid OAuth2 endpoint: {}", error),
    }
}

#[async_trait]
impl PostSource for RedditClient {
    async fn search_sources(&self, query: &str) -> Result<Vec<String>, CoreError> {
        let mut sources = Vec::new();
        let mut after: Option<String> = None;

        while sources.len() < self.max_sources {
            let cursor = after.as_deref();
            let page = self
                .with_token("search_subreddits", move |token| async move {
                    self.api.search_subreddits(&token, query, cursor).await
                })
                .await?;

            let page_len = page.data.children.len();
            sources.extend(
                page.data
                    .children
                    .into_iter()
                    .map(|child| child.data.display_name)
                    .take(self.max_sources - sources.len()),
            );

            match page.data.after {
                Some(next) if page_len > 0 => after = Some(next),
                _ => break,
            }
        }

        info!("Found {} subreddits for '{}'", sources.len(), query);
        Ok(sources)
    }

    async fn search_posts(
        &self,
        source: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RawPost>, CoreError> {
        let mut posts = Vec::new();
        let mut after: Option<String> = None;

        while posts.len() < limit {
            let remaining = limit - posts.len();
            let cursor = after.as_deref();
            let page = self
                .with_token("search_subreddit_posts", move |token| async move {
                    self.api
                        .search_subreddit_posts(
                            &token,
                            source,
                            query,
                            remaining.min(MAX_PAGE_SIZE),
                            cursor,
                        )
                        .await
                })
                .await?;

            let page_len = page.data.children.len();
            posts.extend(
                page.data
                    .children
                    .into_iter()
                    .take(remaining)
                    .map(|child| RawPost::from(child.data)),
            );

            match page.data.after {
                Some(next) if page_len > 0 => after = Some(next),
                _ => break,
            }
        }

        debug!("Collected {} posts from r/{}", posts.len(), source);
        Ok(posts)
    }

    async fn quota(&self) -> RateLimitQuota {
        self.api.quota().await
    }
}
