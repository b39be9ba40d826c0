//! Turns a successful scrape into persisted state: one appended snapshot,
//! plus a page-name refresh when the extracted name changed.

use chrono::{DateTime, Timelike, Utc};

use crate::store::{NewSnapshot, OfferPage, SnapshotStore, StoreError};

/// Persist one successful scrape.
///
/// The snapshot insert happens on every call — the time series is append-only
/// and two identical calls produce two rows. The name update is conditional:
/// only when the extracted name is non-empty and differs from the stored one
/// (including when no name is stored yet). A failed name update after a
/// successful insert is logged and swallowed; the series row is the primary
/// contract and it already landed.
///
/// # Errors
///
/// Returns [`StoreError`] only if the snapshot insert itself fails.
pub async fn record_success(
    store: &dyn SnapshotStore,
    offer_id: i64,
    page: &OfferPage,
    creative_count: u32,
    extracted_name: Option<&str>,
) -> Result<(), StoreError> {
    store
        .insert_snapshot(NewSnapshot {
            offer_id,
            page_id: page.id,
            creative_count,
            captured_at: minute_floor(Utc::now()),
        })
        .await?;

    if let Some(name) = extracted_name {
        let name = name.trim();
        if !name.is_empty() && page.page_name.as_deref() != Some(name) {
            if let Err(e) = store.update_page_name(page.id, name).await {
                tracing::warn!(
                    page_id = page.id,
                    page_url = %page.url,
                    error = %e,
                    "snapshot stored but page name update failed"
                );
            }
        }
    }

    Ok(())
}

/// Truncate to the minute so snapshots of one offer gathered in the same pass
/// share a capture timestamp and sum cleanly in downstream aggregation.
fn minute_floor(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::fleet::tests_support::MemoryStore;
    use uuid::Uuid;

    fn page(stored_name: Option<&str>) -> OfferPage {
        OfferPage {
            id: 7,
            public_id: Uuid::new_v4(),
            url: "https://example.com/ads?id=7".to_string(),
            page_name: stored_name.map(String::from),
        }
    }

    #[test]
    fn minute_floor_drops_seconds_and_nanos() {
        let t = Utc.with_ymd_and_hms(2026, 8, 1, 12, 34, 56).unwrap();
        let floored = minute_floor(t);
        assert_eq!(floored, Utc.with_ymd_and_hms(2026, 8, 1, 12, 34, 0).unwrap());
    }

    #[tokio::test]
    async fn inserts_one_snapshot_per_call_append_only() {
        let store = MemoryStore::default();
        let page = page(None);

        record_success(&store, 1, &page, 50, None).await.unwrap();
        record_success(&store, 1, &page, 50, None).await.unwrap();

        let snapshots = store.snapshots();
        assert_eq!(snapshots.len(), 2, "append-only: no dedup of identical results");
        assert!(snapshots.iter().all(|s| s.creative_count == 50));
    }

    #[tokio::test]
    async fn updates_name_when_stored_name_absent() {
        let store = MemoryStore::default();
        record_success(&store, 1, &page(None), 5, Some("Acme"))
            .await
            .unwrap();
        assert_eq!(store.name_updates(), vec![(7, "Acme".to_string())]);
    }

    #[tokio::test]
    async fn updates_name_when_it_differs() {
        let store = MemoryStore::default();
        record_success(&store, 1, &page(Some("Old Name")), 5, Some("New Name"))
            .await
            .unwrap();
        assert_eq!(store.name_updates(), vec![(7, "New Name".to_string())]);
    }

    #[tokio::test]
    async fn skips_update_for_identical_name() {
        let store = MemoryStore::default();
        record_success(&store, 1, &page(Some("Acme")), 5, Some("Acme"))
            .await
            .unwrap();
        assert!(store.name_updates().is_empty());
    }

    #[tokio::test]
    async fn skips_update_for_empty_extracted_name() {
        let store = MemoryStore::default();
        record_success(&store, 1, &page(Some("Acme")), 5, Some("   "))
            .await
            .unwrap();
        assert!(store.name_updates().is_empty());
    }

    #[tokio::test]
    async fn name_update_failure_does_not_fail_the_record() {
        let store = MemoryStore::default().failing_name_updates();
        let result = record_success(&store, 1, &page(None), 5, Some("Acme")).await;
        assert!(result.is_ok(), "snapshot landed; name failure is non-fatal");
        assert_eq!(store.snapshots().len(), 1);
    }
}
