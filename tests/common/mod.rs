#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::response::Response;
use checkin_tracker::admission::AdmissionController;
use checkin_tracker::database::{
    LocationRecord, LocationStore, MemoryLocationStore, StoreError, UpsertOutcome, VenueCursor,
    VenueQuery,
};
use checkin_tracker::tracker::UserTracker;
use futures_util::future::BoxFuture;
use http_body_util::BodyExt;
use tokio::sync::Semaphore;

pub const NOW: i64 = 1_700_000_000;
pub const HOUR: i64 = 60 * 60;

pub fn tracker(store: Arc<dyn LocationStore>, capacity: usize, batch_size: usize) -> UserTracker {
    UserTracker::new(store, AdmissionController::new(capacity), batch_size)
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("body should be JSON")
}

pub fn json_body(value: serde_json::Value) -> Body {
    Body::from(value.to_string())
}

/// Memory store that counts inserts and remembers the credit of every batch
/// request its cursors receive.
#[derive(Clone, Default)]
pub struct RecordingStore {
    pub inner: MemoryLocationStore,
    pub inserts: Arc<AtomicUsize>,
    pub batch_requests: Arc<Mutex<Vec<usize>>>,
}

impl RecordingStore {
    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn batch_requests(&self) -> Vec<usize> {
        self.batch_requests.lock().unwrap().clone()
    }
}

impl LocationStore for RecordingStore {
    fn upsert_if_newer<'a>(
        &'a self,
        record: &'a LocationRecord,
    ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>> {
        Box::pin(async move {
            let outcome = self.inner.upsert_if_newer(record).await;
            if matches!(outcome, Ok(UpsertOutcome::Inserted)) {
                self.inserts.fetch_add(1, Ordering::SeqCst);
            }
            outcome
        })
    }

    fn find_fresh<'a>(
        &'a self,
        user_id: &'a str,
        fresh_after: i64,
    ) -> BoxFuture<'a, Result<Option<LocationRecord>, StoreError>> {
        self.inner.find_fresh(user_id, fresh_after)
    }

    fn open_venue_cursor(
        &self,
        query: VenueQuery,
    ) -> BoxFuture<'_, Result<Box<dyn VenueCursor>, StoreError>> {
        Box::pin(async move {
            let inner = self.inner.open_venue_cursor(query).await?;
            Ok(Box::new(RecordingCursor {
                inner,
                requests: Arc::clone(&self.batch_requests),
            }) as Box<dyn VenueCursor>)
        })
    }
}

struct RecordingCursor {
    inner: Box<dyn VenueCursor>,
    requests: Arc<Mutex<Vec<usize>>>,
}

impl VenueCursor for RecordingCursor {
    fn next_batch(&mut self, max: usize) -> BoxFuture<'_, Result<Vec<LocationRecord>, StoreError>> {
        self.requests.lock().unwrap().push(max);
        self.inner.next_batch(max)
    }
}

/// Store whose venue cursors fail after serving `healthy_batches` batches and
/// whose writes and point reads always fail.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemoryLocationStore,
    pub healthy_batches: usize,
}

fn connection_reset() -> StoreError {
    StoreError::Corrupt("connection reset by peer".into())
}

impl LocationStore for FlakyStore {
    fn upsert_if_newer<'a>(
        &'a self,
        _record: &'a LocationRecord,
    ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>> {
        Box::pin(async { Err(connection_reset()) })
    }

    fn find_fresh<'a>(
        &'a self,
        _user_id: &'a str,
        _fresh_after: i64,
    ) -> BoxFuture<'a, Result<Option<LocationRecord>, StoreError>> {
        Box::pin(async { Err(connection_reset()) })
    }

    fn open_venue_cursor(
        &self,
        query: VenueQuery,
    ) -> BoxFuture<'_, Result<Box<dyn VenueCursor>, StoreError>> {
        Box::pin(async move {
            let inner = self.inner.open_venue_cursor(query).await?;
            Ok(Box::new(FlakyCursor {
                inner,
                healthy_batches: self.healthy_batches,
            }) as Box<dyn VenueCursor>)
        })
    }
}

struct FlakyCursor {
    inner: Box<dyn VenueCursor>,
    healthy_batches: usize,
}

impl VenueCursor for FlakyCursor {
    fn next_batch(&mut self, max: usize) -> BoxFuture<'_, Result<Vec<LocationRecord>, StoreError>> {
        if self.healthy_batches == 0 {
            return Box::pin(async { Err(connection_reset()) });
        }
        self.healthy_batches -= 1;
        self.inner.next_batch(max)
    }
}

/// Store that always reports the insert race, as if another writer had
/// inserted the user between the update attempt and the insert.
#[derive(Clone, Default)]
pub struct RacingStore {
    pub inner: MemoryLocationStore,
}

impl LocationStore for RacingStore {
    fn upsert_if_newer<'a>(
        &'a self,
        record: &'a LocationRecord,
    ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>> {
        Box::pin(async move {
            Err(StoreError::DuplicateKey {
                user_id: record.user_id.clone(),
            })
        })
    }

    fn find_fresh<'a>(
        &'a self,
        user_id: &'a str,
        fresh_after: i64,
    ) -> BoxFuture<'a, Result<Option<LocationRecord>, StoreError>> {
        self.inner.find_fresh(user_id, fresh_after)
    }

    fn open_venue_cursor(
        &self,
        query: VenueQuery,
    ) -> BoxFuture<'_, Result<Box<dyn VenueCursor>, StoreError>> {
        self.inner.open_venue_cursor(query)
    }
}

/// Memory store whose writes park on a gate until the test opens it.
#[derive(Clone)]
pub struct GatedStore {
    pub inner: MemoryLocationStore,
    pub entered: Arc<AtomicUsize>,
    pub gate: Arc<Semaphore>,
}

impl GatedStore {
    pub fn closed() -> Self {
        Self {
            inner: MemoryLocationStore::new(),
            entered: Arc::new(AtomicUsize::new(0)),
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

impl LocationStore for GatedStore {
    fn upsert_if_newer<'a>(
        &'a self,
        record: &'a LocationRecord,
    ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>> {
        Box::pin(async move {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let _pass = self.gate.acquire().await.expect("gate is never closed");
            self.inner.upsert_if_newer(record).await
        })
    }

    fn find_fresh<'a>(
        &'a self,
        user_id: &'a str,
        fresh_after: i64,
    ) -> BoxFuture<'a, Result<Option<LocationRecord>, StoreError>> {
        self.inner.find_fresh(user_id, fresh_after)
    }

    fn open_venue_cursor(
        &self,
        query: VenueQuery,
    ) -> BoxFuture<'_, Result<Box<dyn VenueCursor>, StoreError>> {
        self.inner.open_venue_cursor(query)
    }
}
