//! Database operations for `monitored_pages` and the `offer_pages` association.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A monitored page joined with its association to one offer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OfferPageRow {
    pub id: i64,
    pub public_id: Uuid,
    pub url: String,
    pub page_name: Option<String>,
    pub name_updated_at: Option<DateTime<Utc>>,
    /// Informational only; every associated page is scraped regardless.
    pub is_primary: bool,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns all pages associated with an offer, in association-creation order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pages_for_offer(
    pool: &PgPool,
    offer_id: i64,
) -> Result<Vec<OfferPageRow>, DbError> {
    let rows = sqlx::query_as::<_, OfferPageRow>(
        "SELECT p.id, p.public_id, p.url, p.page_name, p.name_updated_at, op.is_primary \
         FROM monitored_pages p \
         JOIN offer_pages op ON op.page_id = p.id \
         WHERE op.offer_id = $1 \
         ORDER BY op.created_at, p.id",
    )
    .bind(offer_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Updates the cached display name of a monitored page and stamps
/// `name_updated_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn update_page_name(pool: &PgPool, page_id: i64, name: &str) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE monitored_pages \
         SET page_name = $1, name_updated_at = NOW() \
         WHERE id = $2",
    )
    .bind(name)
    .bind(page_id)
    .execute(pool)
    .await?;
    Ok(())
}
