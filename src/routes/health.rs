use axum::{Json, extract::State};
use serde::Serialize;

use crate::{
    AppState,
    utils::{ApiResponse, success_to_api_response},
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub admission_available: usize,
    pub admission_capacity: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let admission = state.tracker.admission();
    let status = if admission.is_closed() { "draining" } else { "ok" };

    success_to_api_response(HealthResponse {
        status,
        store: state.config.store.name(),
        admission_available: admission.available(),
        admission_capacity: admission.capacity(),
    })
}
