use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;

use crate::{
    AppState,
    error::AppError,
    tracker::{CheckinOutcome, LookupResult},
    utils::{ApiResponse, success_to_api_response, unix_now},
};

use super::model::{CheckinRequest, FindUserQuery, VenueUsersQuery};

const NDJSON: &str = "application/x-ndjson";

#[axum::debug_handler]
pub async fn check_in(
    State(state): State<AppState>,
    Json(req): Json<CheckinRequest>,
) -> Result<Json<ApiResponse<CheckinOutcome>>, AppError> {
    let record = req.into_record()?;
    let outcome = state.tracker.check_in(record).await?;
    Ok(success_to_api_response(outcome))
}

#[axum::debug_handler]
pub async fn find_user(
    State(state): State<AppState>,
    Query(query): Query<FindUserQuery>,
) -> Result<Json<ApiResponse<LookupResult>>, AppError> {
    query.validate()?;
    let reference_ts = query.ts.unwrap_or_else(unix_now);
    let result = state.tracker.find_user(&query.user_id, reference_ts).await?;
    Ok(success_to_api_response(result))
}

/// Streams matching records as newline-delimited JSON. An upstream failure
/// after the first byte aborts the body, which the client sees as a
/// truncated stream.
#[axum::debug_handler]
pub async fn find_venue_users(
    State(state): State<AppState>,
    Query(query): Query<VenueUsersQuery>,
) -> Result<Response, AppError> {
    query.validate()?;
    let reference_ts = query.ts.unwrap_or_else(unix_now);
    let venue_users = state
        .tracker
        .stream_venue_users(&query.venue_id, reference_ts, query.limit)
        .await?;

    let lines = venue_users.into_stream().map(|item| -> Result<Vec<u8>, axum::BoxError> {
        let record = item?;
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        Ok(line)
    });

    Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response())
}
