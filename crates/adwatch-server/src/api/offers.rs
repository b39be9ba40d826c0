use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use adwatch_scraper::{FleetError, RefreshSummary};

use crate::middleware::RequestId;
use crate::store::PgStore;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct OfferItem {
    offer_id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SnapshotQuery {
    pub limit: Option<i64>,
}

pub(super) async fn list_offers(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<OfferItem>>>, ApiError> {
    let rows = adwatch_db::list_active_offers(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| OfferItem {
            offer_id: row.public_id,
            name: row.name,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_offer_snapshots(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(offer_id): Path<Uuid>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<ApiResponse<Vec<adwatch_db::SnapshotRow>>>, ApiError> {
    let offer = resolve_offer(&state, &req_id.0, offer_id).await?;

    let data = adwatch_db::list_snapshots_for_offer(&state.pool, offer.id, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Scrape every page of one offer right now and report per-page outcomes.
/// Runs inline with the request; the caller waits for the real result.
pub(super) async fn refresh_offer(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(offer_id): Path<Uuid>,
) -> Result<Json<ApiResponse<RefreshSummary>>, ApiError> {
    let offer = resolve_offer(&state, &req_id.0, offer_id).await?;

    let store = PgStore::new(state.pool.clone());
    let summary = adwatch_scraper::refresh_offer(&store, state.fetcher.as_ref(), offer.id)
        .await
        .map_err(|e| match e {
            FleetError::NoPages => ApiError::new(
                req_id.0.clone(),
                "bad_request",
                "offer has no monitored pages",
            ),
            FleetError::Store(err) => {
                tracing::error!(error = %err, "refresh: failed to list offer pages");
                ApiError::new(req_id.0.clone(), "internal_error", "database query failed")
            }
        })?;

    Ok(Json(ApiResponse {
        data: summary,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Look up an active offer by public UUID, mapping a miss to 404. Inactive
/// and soft-deleted offers are indistinguishable from nonexistent ones.
async fn resolve_offer(
    state: &AppState,
    request_id: &str,
    offer_id: Uuid,
) -> Result<adwatch_db::OfferRow, ApiError> {
    adwatch_db::get_active_offer_by_public_id(&state.pool, offer_id)
        .await
        .map_err(|e| map_db_error(request_id.to_string(), &e))?
        .ok_or_else(|| ApiError::new(request_id.to_string(), "not_found", "offer not found"))
}
