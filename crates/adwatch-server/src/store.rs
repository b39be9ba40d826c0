//! Postgres-backed [`SnapshotStore`] bridging the scraper's persistence seam
//! to `adwatch-db`.

use async_trait::async_trait;
use sqlx::PgPool;

use adwatch_scraper::{ActiveOffer, NewSnapshot, OfferPage, SnapshotStore, StoreError};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgStore {
    async fn list_active_offers(&self) -> Result<Vec<ActiveOffer>, StoreError> {
        let rows = adwatch_db::list_active_offers(&self.pool)
            .await
            .map_err(StoreError::new)?;
        Ok(rows
            .into_iter()
            .map(|row| ActiveOffer {
                id: row.id,
                name: row.name,
            })
            .collect())
    }

    async fn list_pages_for_offer(&self, offer_id: i64) -> Result<Vec<OfferPage>, StoreError> {
        let rows = adwatch_db::list_pages_for_offer(&self.pool, offer_id)
            .await
            .map_err(StoreError::new)?;
        Ok(rows
            .into_iter()
            .map(|row| OfferPage {
                id: row.id,
                public_id: row.public_id,
                url: row.url,
                page_name: row.page_name,
            })
            .collect())
    }

    async fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<(), StoreError> {
        // The column is a non-negative INTEGER; counts past i32::MAX cannot
        // be stored and surface as an insert failure rather than wrapping.
        let creative_count = i32::try_from(snapshot.creative_count).map_err(StoreError::new)?;
        adwatch_db::insert_snapshot(
            &self.pool,
            &adwatch_db::NewSnapshotRow {
                offer_id: snapshot.offer_id,
                page_id: snapshot.page_id,
                creative_count,
                captured_at: snapshot.captured_at,
            },
        )
        .await
        .map_err(StoreError::new)
    }

    async fn update_page_name(&self, page_id: i64, name: &str) -> Result<(), StoreError> {
        adwatch_db::update_page_name(&self.pool, page_id, name)
            .await
            .map_err(StoreError::new)
    }
}
