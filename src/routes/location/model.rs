use serde::Deserialize;

use crate::database::LocationRecord;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CheckinRequest {
    pub user_id: String,
    pub venue_id: String,
    pub checkin_ts: i64,
}

#[derive(Debug, Deserialize)]
pub struct FindUserQuery {
    pub user_id: String,
    /// Reference time in Unix seconds; defaults to now.
    pub ts: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VenueUsersQuery {
    pub venue_id: String,
    pub ts: Option<i64>,
    pub limit: Option<u32>,
}

impl CheckinRequest {
    pub fn into_record(self) -> Result<LocationRecord, AppError> {
        require("user_id", &self.user_id)?;
        require("venue_id", &self.venue_id)?;
        Ok(LocationRecord {
            user_id: self.user_id,
            venue_id: self.venue_id,
            checkin_ts: self.checkin_ts,
        })
    }
}

impl FindUserQuery {
    pub fn validate(&self) -> Result<(), AppError> {
        require("user_id", &self.user_id)
    }
}

impl VenueUsersQuery {
    pub fn validate(&self) -> Result<(), AppError> {
        require("venue_id", &self.venue_id)
    }
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}
