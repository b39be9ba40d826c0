use thiserror::Error;

/// Failures while obtaining rendered page content through the browser
/// endpoint. Every variant carries enough context to produce a readable
/// failure reason; none of them are retried automatically.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("browser endpoint error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// Extraction ran to completion but no strategy produced a creative count.
///
/// A page with no recognizable count is a hard failure, never a count of 0 —
/// zero would poison the time series with false "offer died" signals.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no count pattern matched")]
    NoCountPattern,
}
