//! Backing-store contract for user locations and its adapters.
//!
//! A store keeps at most one [`LocationRecord`] per user and must offer:
//!
//! - an atomic "update if strictly newer, else insert if absent" write whose
//!   uniqueness rejection is reported as [`StoreError::DuplicateKey`];
//! - a point read that applies the freshness bound in the same read as the
//!   key lookup;
//! - a pull-based venue cursor that hands out results in caller-sized batches.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod postgres;
pub mod redis;

pub use memory::MemoryLocationStore;
pub use postgres::PostgresLocationStore;
pub use redis::RedisLocationStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocationRecord {
    pub user_id: String,
    pub venue_id: String,
    /// Unix seconds.
    pub checkin_ts: i64,
}

impl LocationRecord {
    pub fn new(user_id: impl Into<String>, venue_id: impl Into<String>, checkin_ts: i64) -> Self {
        Self {
            user_id: user_id.into(),
            venue_id: venue_id.into(),
            checkin_ts,
        }
    }
}

/// What an accepted conditional write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// An older record for the user was overwritten.
    Updated,
    /// No record existed; a new one was created.
    Inserted,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The insert half of a conditional write hit the uniqueness constraint:
    /// a record for this user already exists and is not older than the
    /// incoming one.
    #[error("a location record for user {user_id} already exists")]
    DuplicateKey { user_id: String },

    #[error("postgres error: {0}")]
    Postgres(#[source] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("unexpected store response: {0}")]
    Corrupt(String),
}

/// Venue query parameters understood by every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueQuery {
    pub venue_id: String,
    /// Exclusive lower bound on `checkin_ts`.
    pub fresh_after: i64,
}

pub trait LocationStore: Send + Sync {
    /// Overwrites the user's record if its `checkin_ts` is strictly older
    /// than `record.checkin_ts`, otherwise inserts it if no record exists.
    fn upsert_if_newer<'a>(
        &'a self,
        record: &'a LocationRecord,
    ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>>;

    /// The user's record, if it exists and `checkin_ts > fresh_after`.
    fn find_fresh<'a>(
        &'a self,
        user_id: &'a str,
        fresh_after: i64,
    ) -> BoxFuture<'a, Result<Option<LocationRecord>, StoreError>>;

    fn open_venue_cursor(
        &self,
        query: VenueQuery,
    ) -> BoxFuture<'_, Result<Box<dyn VenueCursor>, StoreError>>;
}

/// Pull-based cursor over the records matching a [`VenueQuery`].
///
/// Each user appears at most once per cursor. A batch shorter than `max`
/// means the cursor is exhausted.
pub trait VenueCursor: Send {
    fn next_batch(&mut self, max: usize) -> BoxFuture<'_, Result<Vec<LocationRecord>, StoreError>>;
}
