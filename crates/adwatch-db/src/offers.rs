//! Database operations for the `offers` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `offers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OfferRow {
    pub id: i64,
    pub public_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns all active, non-deleted offers, ordered by creation time.
///
/// This is the scheduler's enumeration order: any fixed order works, and
/// creation order keeps passes deterministic between runs.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_offers(pool: &PgPool) -> Result<Vec<OfferRow>, DbError> {
    let rows = sqlx::query_as::<_, OfferRow>(
        "SELECT id, public_id, user_id, name, is_active, created_at, updated_at, deleted_at \
         FROM offers \
         WHERE is_active = true AND deleted_at IS NULL \
         ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns a single active, non-deleted offer by public UUID, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_active_offer_by_public_id(
    pool: &PgPool,
    public_id: Uuid,
) -> Result<Option<OfferRow>, DbError> {
    let row = sqlx::query_as::<_, OfferRow>(
        "SELECT id, public_id, user_id, name, is_active, created_at, updated_at, deleted_at \
         FROM offers \
         WHERE public_id = $1 AND is_active = true AND deleted_at IS NULL",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
