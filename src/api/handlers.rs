use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::RequestId;
use crate::models::{CalibrationRequest, CalibrationResponse, ComponentCatalog};
use crate::services::{components, CalibrationData, Calibrator};

use super::AppState;

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Lists every accepted component name
pub async fn list_components() -> Json<ComponentCatalog> {
    Json(components::catalog())
}

/// Re-ranks the candidate lists of every user in the request
pub async fn calibrate(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<CalibrationRequest>,
) -> AppResult<Json<CalibrationResponse>> {
    let config = request
        .config
        .unwrap_or_else(|| state.default_calibration_config());

    tracing::info!(
        request_id = %request_id,
        transactions = request.transactions.len(),
        candidates = request.candidates.len(),
        items = request.items.len(),
        "Processing calibration request"
    );

    if request.items.is_empty() && !request.candidates.is_empty() {
        return Err(AppError::InvalidInput(
            "items must describe the candidate items".to_string(),
        ));
    }

    let data = CalibrationData::new(request.transactions, request.candidates, &request.items)?;
    let mut calibrator =
        Calibrator::new(Arc::new(data), &config)?.with_batch_size(state.config.batch_size);
    if let Some(deadline) = state.run_deadline() {
        calibrator = calibrator.with_deadline(deadline);
    }

    let response = calibrator.run().await;

    if response.lists.is_empty() && response.failures.is_empty() && !response.timed_out.is_empty()
    {
        return Err(AppError::Timeout);
    }

    tracing::info!(
        request_id = %request_id,
        lists = response.lists.len(),
        failures = response.failures.len(),
        timed_out = response.timed_out.len(),
        "Calibration completed"
    );

    Ok(Json(response))
}
