use serde::Serialize;
use tracing::{debug, warn};

use super::{TrackerError, UserTracker, fresh_after};
use crate::database::LocationRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupResult {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<LocationRecord>,
}

impl UserTracker {
    /// Where the user is checked in as of `reference_ts`. A record outside
    /// the freshness window reads the same as no record.
    pub async fn find_user(&self, user_id: &str, reference_ts: i64) -> Result<LookupResult, TrackerError> {
        let _permit = self.admission.acquire().await?;

        let found = self
            .store
            .find_fresh(user_id, fresh_after(reference_ts))
            .await
            .map_err(|e| {
                warn!(%user_id, error = %e, "user lookup failed");
                TrackerError::Backend(e)
            })?;

        debug!(%user_id, exists = found.is_some(), "user lookup");
        Ok(LookupResult {
            exists: found.is_some(),
            loc: found,
        })
    }
}
