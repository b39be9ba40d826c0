//! Creative-count and page-name extraction from rendered Ad Library HTML.
//!
//! The target site's markup and copy are not stable, so extraction is an
//! ordered chain of independent strategies, most specific first: the explicit
//! "N ads" copy, the "N results" variant, then literally counting ad-card
//! elements. Minor copy or markup changes degrade to a coarser strategy
//! instead of silently reporting zero.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::ExtractError;

/// Test attribute on individual ad cards, used by the counting fallback.
const AD_CARD_SELECTOR: &str = r#"[data-testid="ad-card"]"#;

/// Name selectors in priority order; the first non-empty trimmed text wins.
/// Name extraction is best-effort and never fails the overall scrape.
const NAME_SELECTORS: &[(&str, &str)] = &[
    ("page_name_testid", r#"[data-testid="page-name"]"#),
    ("page_link", r#"a[href*="facebook.com/"]"#),
    ("heading_role", r#"[role="heading"]"#),
    ("page_title_classes", "div._8jh2 span._8jh5"),
];

/// Result of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub creative_count: u32,
    pub page_name: Option<String>,
}

/// Parsed page content shared by the extraction strategies.
struct PageContent {
    doc: Html,
    text: String,
}

struct CountStrategy {
    name: &'static str,
    run: fn(&PageContent) -> Option<u32>,
}

/// Ordered fallback chain; first strategy to yield a count wins.
const COUNT_STRATEGIES: &[CountStrategy] = &[
    CountStrategy {
        name: "ads_text",
        run: count_from_ads_text,
    },
    CountStrategy {
        name: "results_text",
        run: count_from_results_text,
    },
    CountStrategy {
        name: "ad_card_elements",
        run: count_from_ad_cards,
    },
];

/// Extract the creative count and (optionally) the page's display name from
/// rendered HTML.
///
/// # Errors
///
/// Returns [`ExtractError::NoCountPattern`] when no strategy yields a count.
/// A missing name is not an error.
pub fn extract(html: &str) -> Result<Extraction, ExtractError> {
    let doc = Html::parse_document(html);
    let text = visible_text(&doc);
    let content = PageContent { doc, text };

    let page_name = extract_page_name(&content.doc);

    for strategy in COUNT_STRATEGIES {
        if let Some(creative_count) = (strategy.run)(&content) {
            tracing::debug!(
                strategy = strategy.name,
                creative_count,
                "creative count extracted"
            );
            return Ok(Extraction {
                creative_count,
                page_name,
            });
        }
    }

    Err(ExtractError::NoCountPattern)
}

// ---------------------------------------------------------------------------
// Count strategies
// ---------------------------------------------------------------------------

fn count_from_ads_text(content: &PageContent) -> Option<u32> {
    find_grouped_count(&content.text, "ads?")
}

fn count_from_results_text(content: &PageContent) -> Option<u32> {
    find_grouped_count(&content.text, "results?")
}

fn count_from_ad_cards(content: &PageContent) -> Option<u32> {
    let selector = Selector::parse(AD_CARD_SELECTOR).expect("valid selector");
    let count = content.doc.select(&selector).count();
    if count > 0 {
        u32::try_from(count).ok()
    } else {
        None
    }
}

/// Find a number immediately followed by `unit` ("ads?"/"results?") and parse
/// it, stripping thousands separators.
///
/// The separator class treats `.`, `,`, and space uniformly as grouping
/// characters every three digits: the site displays integer counts grouped
/// per-locale, so "1.234 ads" is one thousand two hundred thirty-four, never
/// a decimal.
fn find_grouped_count(text: &str, unit: &str) -> Option<u32> {
    let pattern = format!(r"(?i)\b(\d+(?:[.,\s]\d{{3}})*)\s*{unit}\b");
    let re = Regex::new(&pattern).expect("valid regex");
    let raw = re.captures(text)?.get(1)?.as_str();
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse::<u32>().ok()
}

// ---------------------------------------------------------------------------
// Name extraction
// ---------------------------------------------------------------------------

fn extract_page_name(doc: &Html) -> Option<String> {
    for (name, raw_selector) in NAME_SELECTORS {
        let selector = Selector::parse(raw_selector).expect("valid selector");
        for element in doc.select(&selector) {
            let text = element.text().collect::<String>();
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                tracing::debug!(strategy = name, page_name = trimmed, "page name extracted");
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Visible text
// ---------------------------------------------------------------------------

/// Collect the document's visible text, skipping script/style/noscript
/// subtrees so embedded JSON cannot satisfy a count pattern.
fn visible_text(doc: &Html) -> String {
    let mut out = String::new();
    collect_text(doc.root_element(), &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    if matches!(element.value().name(), "script" | "style" | "noscript") {
        return;
    }
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_element) = ElementRef::wrap(child) {
            collect_text(child_element, out);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
