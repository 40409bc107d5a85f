//! Check-in tracking service: the write protocol and the two read paths,
//! each run under an admission slot.

use std::sync::Arc;

use thiserror::Error;

use crate::admission::{AdmissionController, AdmissionError};
use crate::database::{LocationStore, StoreError};

mod checkin;
mod lookup;
mod venue;

pub use checkin::CheckinOutcome;
pub use lookup::LookupResult;
pub use venue::VenueStream;

/// A check-in older than this, relative to the caller's reference time, is
/// treated as if it did not exist.
pub const FRESHNESS_WINDOW_SECS: i64 = 3 * 60 * 60;

pub const DEFAULT_BATCH_SIZE: usize = 20;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("service unavailable: {0}")]
    Unavailable(#[from] AdmissionError),

    #[error("backend failure: {0}")]
    Backend(#[source] StoreError),

    #[error("venue stream failed upstream: {0}")]
    StreamUpstream(#[source] StoreError),
}

#[derive(Clone)]
pub struct UserTracker {
    store: Arc<dyn LocationStore>,
    admission: AdmissionController,
    batch_size: usize,
}

impl UserTracker {
    pub fn new(store: Arc<dyn LocationStore>, admission: AdmissionController, batch_size: usize) -> Self {
        Self {
            store,
            admission,
            batch_size: batch_size.max(1),
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }
}

/// Lower bound a stored `checkin_ts` must exceed to count as current.
pub fn fresh_after(reference_ts: i64) -> i64 {
    reference_ts.saturating_sub(FRESHNESS_WINDOW_SECS)
}
