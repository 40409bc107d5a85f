//! Server-wide admission control.
//!
//! One counting semaphore caps the number of operations that may touch the
//! backing store at the same time, regardless of operation type. Check-ins
//! and lookups hold a slot for the duration of the request; venue streams
//! hold theirs until the stream completes, fails or is dropped.
//!
//! Waiters are served in arrival order (`tokio::sync::Semaphore` is fair).

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("admission controller is closed")]
    Closed,
}

/// Shared handle to the admission budget. Cloning is cheap and every clone
/// draws from the same pool of slots.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// An admitted operation's slot. Dropping it gives the slot back.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot.
    ///
    /// Fails only once [`close`](Self::close) has been called; callers that
    /// are already waiting at that point are woken with the same error.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AdmissionError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AdmissionError::Closed)?;

        tracing::trace!(
            available = self.semaphore.available_permits(),
            "admission slot acquired"
        );

        Ok(AdmissionPermit { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stops admitting new work. Slots already handed out stay valid until
    /// their permits are dropped.
    pub fn close(&self) {
        if !self.semaphore.is_closed() {
            tracing::info!(
                in_flight = self.capacity - self.available(),
                "closing admission controller"
            );
            self.semaphore.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
