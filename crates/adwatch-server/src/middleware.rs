//! Request-layer guards for the offer API.
//!
//! Ordering matters: auth runs first and stamps a [`ClientId`] on the
//! request, then the rate limiter buckets by that identity. The budget is
//! deliberately small because the refresh route drives a real browser
//! session per page.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Bucket used when auth is disabled in development and no key identifies
/// the caller.
const ANONYMOUS_CLIENT: &str = "anonymous";

/// Request ID carried through extensions and echoed as `x-request-id`.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Identity the rate limiter buckets by: the API key that authenticated the
/// request, or [`ANONYMOUS_CLIENT`] when auth is disabled.
#[derive(Debug, Clone)]
pub struct ClientId(String);

/// Accepted bearer keys for the offer routes.
#[derive(Clone)]
pub struct ApiKeys {
    keys: Arc<HashSet<String>>,
}

impl ApiKeys {
    /// Reads `ADWATCH_API_KEYS` (comma-separated bearer keys).
    ///
    /// Development tolerates an empty set and serves unauthenticated for
    /// local iteration; any other environment refuses to start without keys.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let keys = parse_keys(&std::env::var("ADWATCH_API_KEYS").unwrap_or_default());

        if keys.is_empty() {
            if is_development {
                tracing::warn!("ADWATCH_API_KEYS not set; serving unauthenticated (development)");
            } else {
                anyhow::bail!(
                    "ADWATCH_API_KEYS is required outside development; \
                     provide comma-separated bearer keys"
                );
            }
        }

        Ok(Self::from_keys(keys))
    }

    pub(crate) fn from_keys(keys: HashSet<String>) -> Self {
        Self {
            keys: Arc::new(keys),
        }
    }

    /// Empty key set means auth is disabled (development only).
    fn open(&self) -> bool {
        self.keys.is_empty()
    }

    /// Validate an `Authorization` header and return the accepted key.
    fn accept(&self, header: Option<&HeaderValue>) -> Option<String> {
        let presented = header
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|k| !k.is_empty())?;
        self.keys.contains(presented).then(|| presented.to_string())
    }
}

fn parse_keys(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[derive(Debug)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window request limiter, bucketed per [`ClientId`] so one noisy
/// caller cannot starve the others.
#[derive(Clone)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn try_acquire(&self, client: &str) -> bool {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let window = windows.entry(client.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.duration_since(window.started_at) >= self.window {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.max_per_window {
            return false;
        }
        window.count += 1;
        true
    }
}

#[derive(Debug, Serialize)]
struct RejectBody {
    error: RejectDetail,
}

#[derive(Debug, Serialize)]
struct RejectDetail {
    code: &'static str,
    message: &'static str,
}

fn reject(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    (status, Json(RejectBody {
        error: RejectDetail { code, message },
    }))
        .into_response()
}

/// Reuses an incoming `x-request-id` or generates a `UUIDv4`, stores it as a
/// [`RequestId`] extension, and echoes it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut res = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }
    res
}

/// Bearer-key auth. On success the accepted key becomes the request's
/// [`ClientId`]; with auth disabled every caller shares the anonymous bucket.
pub async fn require_bearer_auth(
    State(keys): State<ApiKeys>,
    mut req: Request,
    next: Next,
) -> Response {
    if keys.open() {
        req.extensions_mut()
            .insert(ClientId(ANONYMOUS_CLIENT.to_string()));
        return next.run(req).await;
    }

    match keys.accept(req.headers().get(AUTHORIZATION)) {
        Some(key) => {
            req.extensions_mut().insert(ClientId(key));
            next.run(req).await
        }
        None => reject(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        ),
    }
}

/// Per-client fixed-window rate limit; runs inside the auth layer so the
/// [`ClientId`] extension is already present.
pub async fn enforce_rate_limit(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    let client = req
        .extensions()
        .get::<ClientId>()
        .map_or(ANONYMOUS_CLIENT, |c| c.0.as_str())
        .to_string();

    if limiter.try_acquire(&client).await {
        next.run(req).await
    } else {
        reject(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> ApiKeys {
        ApiKeys::from_keys(list.iter().map(|k| (*k).to_string()).collect())
    }

    #[test]
    fn parse_keys_splits_trims_and_drops_empties() {
        let parsed = parse_keys(" key-a , key-b,, ,key-c");
        assert_eq!(parsed.len(), 3);
        assert!(parsed.contains("key-a"));
        assert!(parsed.contains("key-b"));
        assert!(parsed.contains("key-c"));
    }

    #[test]
    fn accept_returns_the_matching_key() {
        let header = HeaderValue::from_static("Bearer key-a");
        assert_eq!(keys(&["key-a"]).accept(Some(&header)), Some("key-a".to_string()));
    }

    #[test]
    fn accept_rejects_unknown_and_non_bearer_credentials() {
        let api_keys = keys(&["key-a"]);
        let unknown = HeaderValue::from_static("Bearer other-key");
        assert_eq!(api_keys.accept(Some(&unknown)), None);
        let basic = HeaderValue::from_static("Basic a2V5LWE=");
        assert_eq!(api_keys.accept(Some(&basic)), None);
        assert_eq!(api_keys.accept(None), None);
    }

    #[test]
    fn empty_key_set_is_open() {
        assert!(keys(&[]).open());
        assert!(!keys(&["key-a"]).open());
    }

    #[tokio::test]
    async fn rate_limiter_buckets_are_isolated_per_client() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));

        assert!(limiter.try_acquire("client-a").await);
        assert!(limiter.try_acquire("client-a").await);
        assert!(!limiter.try_acquire("client-a").await, "budget exhausted");

        assert!(
            limiter.try_acquire("client-b").await,
            "client-a's exhaustion must not affect client-b"
        );
    }

    #[tokio::test]
    async fn rate_limiter_window_resets_after_elapsing() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));

        assert!(limiter.try_acquire("client-a").await);
        assert!(!limiter.try_acquire("client-a").await);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(
            limiter.try_acquire("client-a").await,
            "a fresh window grants a fresh budget"
        );
    }
}
