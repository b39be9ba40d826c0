//! Persistence seam consumed by the recorder and the fleet loops.
//!
//! The scraper crate never talks to Postgres directly; it sees this trait,
//! which the server implements over `adwatch-db` and tests implement with an
//! in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// An offer eligible for scraping.
#[derive(Debug, Clone)]
pub struct ActiveOffer {
    pub id: i64,
    pub name: String,
}

/// One monitored page associated with an offer.
#[derive(Debug, Clone)]
pub struct OfferPage {
    pub id: i64,
    pub public_id: Uuid,
    pub url: String,
    /// Cached display name as currently stored.
    pub page_name: Option<String>,
}

/// Input for one append-only snapshot insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSnapshot {
    pub offer_id: i64,
    pub page_id: i64,
    pub creative_count: u32,
    pub captured_at: DateTime<Utc>,
}

/// Opaque persistence failure; the fleet loops only log it and count it.
#[derive(Debug, Error)]
#[error("store error: {0}")]
pub struct StoreError(String);

impl StoreError {
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self(message.to_string())
    }
}

/// Operations the core needs from the persistence collaborator.
///
/// `insert_snapshot` is append-only by contract: implementations must never
/// upsert or dedup.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn list_active_offers(&self) -> Result<Vec<ActiveOffer>, StoreError>;

    async fn list_pages_for_offer(&self, offer_id: i64) -> Result<Vec<OfferPage>, StoreError>;

    async fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<(), StoreError>;

    async fn update_page_name(&self, page_id: i64, name: &str) -> Result<(), StoreError>;
}
