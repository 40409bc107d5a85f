use serde::Serialize;
use tracing::{debug, warn};

use super::{TrackerError, UserTracker};
use crate::database::{LocationRecord, StoreError, UpsertOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckinOutcome {
    /// Whether this check-in is now the user's stored location.
    pub updated: bool,
}

impl UserTracker {
    /// Records a check-in if it is newer than what is stored for the user.
    ///
    /// Writers on any number of processes converge on the check-in with the
    /// largest timestamp: an older or equal timestamp, or an insert that loses
    /// to a concurrent writer, resolves to `updated = false` without error.
    /// Resubmitting the same check-in is therefore a no-op.
    pub async fn check_in(&self, record: LocationRecord) -> Result<CheckinOutcome, TrackerError> {
        let _permit = self.admission.acquire().await?;

        match self.store.upsert_if_newer(&record).await {
            Ok(UpsertOutcome::Inserted) => {
                debug!(user_id = %record.user_id, venue_id = %record.venue_id, "first check-in stored");
                Ok(CheckinOutcome { updated: true })
            }
            Ok(UpsertOutcome::Updated) => {
                debug!(
                    user_id = %record.user_id,
                    venue_id = %record.venue_id,
                    checkin_ts = record.checkin_ts,
                    "check-in moved forward"
                );
                Ok(CheckinOutcome { updated: true })
            }
            Err(StoreError::DuplicateKey { user_id }) => {
                debug!(%user_id, checkin_ts = record.checkin_ts, "stored check-in is as new or newer, ignoring");
                Ok(CheckinOutcome { updated: false })
            }
            Err(e) => {
                warn!(user_id = %record.user_id, error = %e, "check-in failed");
                Err(TrackerError::Backend(e))
            }
        }
    }
}
