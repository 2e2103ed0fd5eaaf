use crate::{with_reauthentication, CachedToken, RedditClient, TOKEN_REFRESH_MARGIN};
use sentiscope_core::{
    ConfigError, CoreError, PostSource, RateLimitQuota, RedditConfig, SourceApiError,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

fn create_test_config() -> RedditConfig {
    RedditConfig {
        client_id: Some("test_client_id".to_string()),
        client_secret: Some("test_client_secret".to_string()),
        user_agent: "sentiscope/0.1 by test_user".to_string(),
        ..RedditConfig::default()
    }
}

#[test]
fn test_client_creation() {
    let client = RedditClient::new(&create_test_config());
    assert!(client.is_ok());
    assert_eq!(client.unwrap().max_sources(), 100);
}

#[test]
fn test_client_requires_credentials() {
    let config = RedditConfig {
        client_secret: None,
        ..create_test_config()
    };

    match RedditClient::new(&config) {
        Err(CoreError::Config(ConfigError::MissingEnvironmentVariable { var_name })) => {
            assert_eq!(var_name, "REDDIT_CLIENT_SECRET")
        }
        Err(other) => panic!("Expected missing credential error, got {:?}", other),
        Ok(_) => panic!("Client should not be created without a secret"),
    }
}

#[test]
fn test_client_rejects_invalid_user_agent() {
    let config = RedditConfig {
        user_agent: "bad\nagent".to_string(),
        ..create_test_config()
    };
    assert!(matches!(
        RedditClient::new(&config),
        Err(CoreError::InvalidInput { .. })
    ));
}

#[test]
fn test_token_freshness() {
    let now = Instant::now();

    let fresh = CachedToken {
        access_token: "valid_token".to_string(),
        expires_at: now + Duration::from_secs(3600),
    };
    assert!(fresh.is_fresh(now));

    // Inside the refresh margin counts as stale
    let expiring = CachedToken {
        access_token: "expiring_token".to_string(),
        expires_at: now + TOKEN_REFRESH_MARGIN - Duration::from_secs(1),
    };
    assert!(!expiring.is_fresh(now));

    let token = CachedToken::new("abc".to_string(), None);
    assert!(token.is_fresh(Instant::now()));
    assert_eq!(token.access_token, "abc");
}

#[test]
fn test_short_lived_token_is_refreshed() {
    let token = CachedToken::new("short".to_string(), Some(Duration::from_secs(30)));
    assert!(!token.is_fresh(Instant::now()));
}

#[test]
fn test_zero_limit_makes_no_request() {
    let client = RedditClient::new(&create_test_config()).unwrap();

    // No token was ever requested, so a network round trip would fail here
    let posts = tokio_test::block_on(client.search_posts("rust", "async", 0)).unwrap();
    assert!(posts.is_empty());
    assert_eq!(
        tokio_test::block_on(client.quota()),
        RateLimitQuota::default()
    );
}

#[tokio::test]
async fn test_invalidate_token_clears_cache() {
    let client = RedditClient::new(&create_test_config()).unwrap();
    *client.token.lock().await = Some(CachedToken::new("cached".to_string(), None));

    assert_eq!(client.access_token().await.unwrap(), "cached");

    client.invalidate_token().await;
    assert!(client.token.lock().await.is_none());
}

#[tokio::test]
async fn test_rejected_token_is_retried_once() {
    let calls = &AtomicU32::new(0);
    let invalidations = &AtomicU32::new(0);

    let result = with_reauthentication(
        move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CoreError::SourceApi(SourceApiError::InvalidToken))
            } else {
                Ok("listing")
            }
        },
        move || async move {
            invalidations.fetch_add(1, Ordering::SeqCst);
        },
    )
    .await;

    assert_eq!(result.unwrap(), "listing");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(invalidations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_token_rejected_twice_gives_up() {
    let calls = &AtomicU32::new(0);
    let invalidations = &AtomicU32::new(0);

    let result: Result<(), CoreError> = with_reauthentication(
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::SourceApi(SourceApiError::InvalidToken))
        },
        move || async move {
            invalidations.fetch_add(1, Ordering::SeqCst);
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(CoreError::SourceApi(SourceApiError::InvalidToken))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(invalidations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_other_errors_skip_reauthentication() {
    let calls = &AtomicU32::new(0);
    let invalidations = &AtomicU32::new(0);

    let result: Result<(), CoreError> = with_reauthentication(
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::SourceApi(SourceApiError::Forbidden {
                resource: "r/private".to_string(),
            }))
        },
        move || async move {
            invalidations.fetch_add(1, Ordering::SeqCst);
        },
    )
    .await;

    assert!(result.unwrap_err().is_forbidden());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(invalidations.load(Ordering::SeqCst), 0);
}
