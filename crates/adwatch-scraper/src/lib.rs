pub mod error;
pub mod extract;
pub mod fetch;
pub mod fleet;
pub mod recorder;
pub mod store;
pub mod task;

pub use error::{ExtractError, FetchError};
pub use extract::{extract, Extraction};
pub use fetch::{BrowserlessFetcher, PageFetcher};
pub use fleet::{
    refresh_offer, run_snapshot_pass, DelayPolicy, FleetError, PageRefreshResult, PassStats,
    RefreshSummary,
};
pub use recorder::record_success;
pub use store::{ActiveOffer, NewSnapshot, OfferPage, SnapshotStore, StoreError};
pub use task::{scrape_page, ScrapeOutcome};
