//! Database operations for the append-only `snapshots` table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Input for one snapshot insert.
#[derive(Debug, Clone)]
pub struct NewSnapshotRow {
    pub offer_id: i64,
    pub page_id: i64,
    pub creative_count: i32,
    pub captured_at: DateTime<Utc>,
}

/// A snapshot joined with its page's public id, for the dashboard read path.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub page_id: Uuid,
    pub creative_count: i32,
    pub captured_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Appends one snapshot row. No upsert, no dedup: every successful scrape
/// inserts exactly one row, and rows are never updated or deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_snapshot(pool: &PgPool, snapshot: &NewSnapshotRow) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO snapshots (offer_id, page_id, creative_count, captured_at) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(snapshot.offer_id)
    .bind(snapshot.page_id)
    .bind(snapshot.creative_count)
    .bind(snapshot.captured_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns an offer's snapshots in ascending capture order — the time series
/// the dashboard charts. Same-timestamp rows across pages of one offer are
/// summed by the dashboard, not here.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_snapshots_for_offer(
    pool: &PgPool,
    offer_id: i64,
    limit: i64,
) -> Result<Vec<SnapshotRow>, DbError> {
    let rows = sqlx::query_as::<_, SnapshotRow>(
        "SELECT s.id, p.public_id AS page_id, s.creative_count, s.captured_at \
         FROM snapshots s \
         JOIN monitored_pages p ON p.id = s.page_id \
         WHERE s.offer_id = $1 \
         ORDER BY s.captured_at ASC, s.id ASC \
         LIMIT $2",
    )
    .bind(offer_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
