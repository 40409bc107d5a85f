use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::Mutex;

use super::{LocationRecord, LocationStore, StoreError, UpsertOutcome, VenueCursor, VenueQuery};

/// Process-local store. The map lock stands in for the atomic conditional
/// write of a real database, so it is only safe for a single process.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocationStore {
    records: Arc<Mutex<BTreeMap<String, LocationRecord>>>,
}

impl MemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes records as-is, bypassing the check-in protocol.
    pub async fn seed(&self, records: impl IntoIterator<Item = LocationRecord>) {
        let mut map = self.records.lock().await;
        for record in records {
            map.insert(record.user_id.clone(), record);
        }
    }

    /// Stored record regardless of freshness.
    pub async fn get(&self, user_id: &str) -> Option<LocationRecord> {
        self.records.lock().await.get(user_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

impl LocationStore for MemoryLocationStore {
    fn upsert_if_newer<'a>(
        &'a self,
        record: &'a LocationRecord,
    ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>> {
        Box::pin(async move {
            let mut map = self.records.lock().await;
            match map.get_mut(&record.user_id) {
                Some(stored) if stored.checkin_ts < record.checkin_ts => {
                    stored.venue_id.clone_from(&record.venue_id);
                    stored.checkin_ts = record.checkin_ts;
                    Ok(UpsertOutcome::Updated)
                }
                Some(_) => Err(StoreError::DuplicateKey {
                    user_id: record.user_id.clone(),
                }),
                None => {
                    map.insert(record.user_id.clone(), record.clone());
                    Ok(UpsertOutcome::Inserted)
                }
            }
        })
    }

    fn find_fresh<'a>(
        &'a self,
        user_id: &'a str,
        fresh_after: i64,
    ) -> BoxFuture<'a, Result<Option<LocationRecord>, StoreError>> {
        Box::pin(async move {
            let map = self.records.lock().await;
            Ok(map
                .get(user_id)
                .filter(|record| record.checkin_ts > fresh_after)
                .cloned())
        })
    }

    fn open_venue_cursor(
        &self,
        query: VenueQuery,
    ) -> BoxFuture<'_, Result<Box<dyn VenueCursor>, StoreError>> {
        let cursor = MemoryVenueCursor {
            records: Arc::clone(&self.records),
            query,
            last_user_id: None,
        };
        Box::pin(async move { Ok(Box::new(cursor) as Box<dyn VenueCursor>) })
    }
}

/// Walks the map in key order, resuming after the last user handed out.
struct MemoryVenueCursor {
    records: Arc<Mutex<BTreeMap<String, LocationRecord>>>,
    query: VenueQuery,
    last_user_id: Option<String>,
}

impl VenueCursor for MemoryVenueCursor {
    fn next_batch(&mut self, max: usize) -> BoxFuture<'_, Result<Vec<LocationRecord>, StoreError>> {
        Box::pin(async move {
            let map = self.records.lock().await;
            let lower = match &self.last_user_id {
                Some(last) => Bound::Excluded(last.clone()),
                None => Bound::Unbounded,
            };

            let batch: Vec<LocationRecord> = map
                .range((lower, Bound::Unbounded))
                .map(|(_, record)| record)
                .filter(|record| {
                    record.venue_id == self.query.venue_id
                        && record.checkin_ts > self.query.fresh_after
                })
                .take(max)
                .cloned()
                .collect();

            if let Some(last) = batch.last() {
                self.last_user_id = Some(last.user_id.clone());
            }
            Ok(batch)
        })
    }
}
