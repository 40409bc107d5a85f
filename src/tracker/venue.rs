//! Streaming venue query.
//!
//! Results are pulled from the store cursor one batch at a time. The stream
//! grants the cursor a credit of `batch_size` records, hands them out one by
//! one, and only asks for the next batch once the current one is used up, so
//! at most one batch is buffered and the store is asked once per batch rather
//! than once per record.
//!
//! The admission slot and the cursor live inside the stream. Both are
//! released as soon as the stream can yield nothing more (completion, limit
//! reached, upstream error) or when the consumer drops it.

use std::collections::VecDeque;

use futures_util::Stream;
use futures_util::stream;
use tracing::{debug, warn};

use super::{TrackerError, UserTracker, fresh_after};
use crate::admission::AdmissionPermit;
use crate::database::{LocationRecord, VenueCursor, VenueQuery};

impl UserTracker {
    /// Opens a stream of users currently checked in at `venue_id`.
    ///
    /// `limit` caps the number of records emitted; `None` or `Some(0)` means
    /// no cap. Records come in no particular order.
    pub async fn stream_venue_users(
        &self,
        venue_id: &str,
        reference_ts: i64,
        limit: Option<u32>,
    ) -> Result<VenueStream, TrackerError> {
        let permit = self.admission.acquire().await?;

        let query = VenueQuery {
            venue_id: venue_id.to_string(),
            fresh_after: fresh_after(reference_ts),
        };
        let cursor = self.store.open_venue_cursor(query).await.map_err(|e| {
            warn!(%venue_id, error = %e, "failed to open venue cursor");
            TrackerError::Backend(e)
        })?;

        debug!(%venue_id, ?limit, batch_size = self.batch_size, "venue stream opened");
        Ok(VenueStream {
            venue_id: venue_id.to_string(),
            batch_size: self.batch_size,
            remaining: limit.filter(|&n| n > 0).map(|n| n as usize),
            buffer: VecDeque::with_capacity(self.batch_size),
            exhausted: false,
            emitted: 0,
            active: Some(Active {
                cursor,
                _permit: permit,
            }),
        })
    }
}

struct Active {
    cursor: Box<dyn VenueCursor>,
    _permit: AdmissionPermit,
}

/// Finite, non-restartable sequence of the records matching a venue query.
pub struct VenueStream {
    venue_id: String,
    batch_size: usize,
    remaining: Option<usize>,
    buffer: VecDeque<LocationRecord>,
    exhausted: bool,
    emitted: usize,
    active: Option<Active>,
}

impl VenueStream {
    /// Next record, `None` once the stream has finished.
    ///
    /// An upstream failure is yielded once as `Err`; the stream is finished
    /// afterwards.
    pub async fn next(&mut self) -> Option<Result<LocationRecord, TrackerError>> {
        if self.buffer.is_empty() {
            if let Err(e) = self.refill().await {
                return Some(Err(e));
            }
        }

        let Some(record) = self.buffer.pop_front() else {
            self.release();
            return None;
        };
        self.emitted += 1;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        if self.is_drained() {
            self.release();
        }
        Some(Ok(record))
    }

    /// Grants the cursor the next batch of credit and buffers what it sends.
    async fn refill(&mut self) -> Result<(), TrackerError> {
        let credit = self.next_credit();
        if credit == 0 || self.exhausted {
            self.release();
            return Ok(());
        }
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        match active.cursor.next_batch(credit).await {
            Ok(mut batch) => {
                if batch.len() < credit {
                    self.exhausted = true;
                }
                batch.truncate(credit);
                self.buffer.extend(batch);
                Ok(())
            }
            Err(e) => {
                warn!(venue_id = %self.venue_id, emitted = self.emitted, error = %e, "venue stream failed");
                self.release();
                Err(TrackerError::StreamUpstream(e))
            }
        }
    }

    fn next_credit(&self) -> usize {
        match self.remaining {
            Some(remaining) => remaining.min(self.batch_size),
            None => self.batch_size,
        }
    }

    fn is_drained(&self) -> bool {
        self.buffer.is_empty() && (self.exhausted || self.remaining == Some(0))
    }

    fn release(&mut self) {
        if self.active.take().is_some() {
            debug!(venue_id = %self.venue_id, emitted = self.emitted, "venue stream finished");
        }
    }

    /// Whether the stream still holds its admission slot and cursor.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Ends the stream early, releasing its slot and cursor.
    pub fn close(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if self.active.take().is_some() {
            debug!(venue_id = %self.venue_id, emitted = self.emitted, "venue stream cancelled");
        }
        self.buffer.clear();
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<LocationRecord, TrackerError>> + Send + 'static {
        stream::unfold(self, |mut venue_stream| async move {
            venue_stream.next().await.map(|item| (item, venue_stream))
        })
    }
}

impl Drop for VenueStream {
    fn drop(&mut self) {
        self.cancel();
    }
}
