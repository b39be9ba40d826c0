//! The scrape task: fetch one page, extract its data, and contain every
//! failure behind a uniform outcome type.

use crate::extract::extract;
use crate::fetch::PageFetcher;

/// Outcome of one page-scrape attempt.
///
/// This is the task's entire contract: exactly one of these two variants,
/// never a propagated error, under any browser or network condition. The
/// scheduler and the on-demand path both rely on that to keep a single bad
/// page from taking down a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Success {
        creative_count: u32,
        page_name: Option<String>,
    },
    Failure {
        reason: String,
    },
}

/// Scrape a single page: fetch rendered content, then extract the creative
/// count and page name. Fetch failures skip extraction entirely.
pub async fn scrape_page(fetcher: &dyn PageFetcher, url: &str) -> ScrapeOutcome {
    let html = match fetcher.fetch(url).await {
        Ok(html) => html,
        Err(e) => {
            return ScrapeOutcome::Failure {
                reason: e.to_string(),
            }
        }
    };

    match extract(&html) {
        Ok(extraction) => ScrapeOutcome::Success {
            creative_count: extraction.creative_count,
            page_name: extraction.page_name,
        },
        Err(_) => ScrapeOutcome::Failure {
            reason: "could not extract creative count".to_string(),
        },
    }
}
