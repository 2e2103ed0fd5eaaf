use chrono::Utc;
use reqwest::header::HeaderMap;
use sentiscope_core::RateLimitQuota;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";
const USED_HEADER: &str = "x-ratelimit-used";

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window: Duration,
    pub burst_allowance: u32,
}

impl RateLimitConfig {
    pub fn reddit_oauth() -> Self {
        Self {
            max_requests: 100, // Reddit allows 100 requests per minute for OAuth2
            time_window: Duration::from_secs(60),
            burst_allowance: 10,
        }
    }
}

#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.burst_allowance as f64;
        let refill_rate = config.max_requests as f64 / config.time_window.as_secs_f64();

        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate,
        }
    }

    /// Takes `tokens_needed` or reports how long until they are available.
    pub async fn acquire(&self, tokens_needed: f64) -> Result<(), Duration> {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.tokens >= tokens_needed {
            state.tokens -= tokens_needed;
            Ok(())
        } else {
            let missing = tokens_needed - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    pub async fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }
}

/// Quota as reported by Reddit's `x-ratelimit-*` response headers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RemoteQuota {
    pub remaining: Option<f64>,
    pub used: Option<u32>,
    pub reset_at: Option<i64>,
}

impl RemoteQuota {
    pub fn from_headers(headers: &HeaderMap, now_epoch: i64) -> Option<Self> {
        let remaining = header_value::<f64>(headers, REMAINING_HEADER);
        let reset_in = header_value::<f64>(headers, RESET_HEADER);
        let used = header_value::<u32>(headers, USED_HEADER);

        if remaining.is_none() && reset_in.is_none() && used.is_none() {
            return None;
        }

        Some(Self {
            remaining,
            used,
            reset_at: reset_in.map(|seconds| now_epoch + seconds.ceil() as i64),
        })
    }
}

fn header_value<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<T>().ok())
}

pub fn now_epoch_secs() -> i64 {
    Utc::now().timestamp()
}

/// Local token bucket in front of every request, plus the remote quota the
/// fetcher paces itself against.
#[derive(Debug)]
pub struct RateLimiter {
    token_bucket: TokenBucket,
    semaphore: Arc<Semaphore>,
    remote: Mutex<RemoteQuota>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            token_bucket: TokenBucket::new(&config),
            semaphore: Arc::new(Semaphore::new(config.burst_allowance as usize)),
            remote: Mutex::new(RemoteQuota::default()),
        }
    }

    pub async fn acquire_permit(&self) -> RateLimitPermit {
        let start_time = Instant::now();
        let permit = self.semaphore.clone().acquire_owned().await.ok();

        loop {
            match self.token_bucket.acquire(1.0).await {
                Ok(()) => break,
                Err(wait_time) => {
                    tracing::debug!("Local rate limit reached, waiting {:?}", wait_time);
                    sleep(wait_time).await;
                }
            }
        }

        RateLimitPermit {
            _permit: permit,
            queue_wait_time: start_time.elapsed(),
        }
    }

    pub async fn record_headers(&self, headers: &HeaderMap) {
        if let Some(quota) = RemoteQuota::from_headers(headers, now_epoch_secs()) {
            tracing::debug!(
                "Remote quota: remaining={:?} used={:?} reset_at={:?}",
                quota.remaining,
                quota.used,
                quota.reset_at
            );
            *self.remote.lock().await = quota;
        }
    }

    pub async fn quota(&self) -> RateLimitQuota {
        let remote = *self.remote.lock().await;
        RateLimitQuota {
            remaining: remote.remaining,
            reset_at: remote.reset_at,
        }
    }

    pub async fn available_tokens(&self) -> f64 {
        self.token_bucket.available_tokens().await
    }
}

#[derive(Debug)]
pub struct RateLimitPermit {
    _permit: Option<tokio::sync::OwnedSemaphorePermit>,
    pub queue_wait_time: Duration,
}
