//! Rendered-page fetching through a Browserless `/content` endpoint.
//!
//! Ad Library pages render their creative count client-side, so a plain GET
//! returns a shell document. The fetcher drives a headless Chrome session via
//! the Browserless HTTP API: one isolated session per call, torn down by the
//! service on every exit path, nothing shared between scrapes.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;

/// Navigation timeout applied inside the browser session.
pub const DEFAULT_NAV_TIMEOUT_SECS: u64 = 30;

/// Fixed settle delay after `domcontentloaded` so client-side rendering can
/// paint the ad count. Full network idle is useless here — Ad Library pages
/// keep streaming content indefinitely.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 3000;

// Headroom on the outer HTTP timeout for session startup and teardown.
const SESSION_OVERHEAD_MS: u64 = 15_000;

/// Capability seam for obtaining the rendered HTML of one URL.
///
/// The real implementation drives a headless browser; tests substitute a
/// fake so the extractor, scrape task, and fleet loops run without one.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the fully rendered HTML for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on navigation timeout, network failure, or a
    /// browser-endpoint error. Implementations must not leak sessions on
    /// any error path.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// [`PageFetcher`] backed by a Browserless `/content` endpoint.
pub struct BrowserlessFetcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    user_agent: String,
    nav_timeout_ms: u64,
    settle_delay_ms: u64,
}

impl BrowserlessFetcher {
    /// Build a fetcher against `base_url` (e.g. `http://localhost:9222`).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        user_agent: &str,
        nav_timeout_secs: u64,
        settle_delay_ms: u64,
    ) -> Result<Self, FetchError> {
        let nav_timeout_ms = nav_timeout_secs.saturating_mul(1000);
        // The outer timeout must outlast navigation plus the settle delay,
        // or reqwest would abort sessions that are still legitimately loading.
        let total_ms = nav_timeout_ms
            .saturating_add(settle_delay_ms)
            .saturating_add(SESSION_OVERHEAD_MS);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(total_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            user_agent: user_agent.to_string(),
            nav_timeout_ms,
            settle_delay_ms,
        })
    }

    /// Build a fetcher from the application config.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the underlying HTTP client cannot be
    /// constructed.
    pub fn from_app_config(config: &adwatch_core::AppConfig) -> Result<Self, FetchError> {
        Self::new(
            &config.browserless_url,
            config.browserless_token.as_deref(),
            &config.scraper_user_agent,
            config.scraper_nav_timeout_secs,
            config.scraper_settle_delay_ms,
        )
    }
}

#[async_trait]
impl PageFetcher for BrowserlessFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = serde_json::json!({
            "url": url,
            "userAgent": self.user_agent,
            "gotoOptions": {
                "waitUntil": "domcontentloaded",
                "timeout": self.nav_timeout_ms,
            },
            "waitForTimeout": self.settle_delay_ms,
        });

        // The token rides in the endpoint's query string, and transport
        // errors echo the URL they failed against. Strip the URL before the
        // error can reach failure reasons, logs, or API responses.
        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response
            .text()
            .await
            .map_err(reqwest::Error::without_url)?)
    }
}
