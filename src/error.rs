use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::CalibrationError;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calibration run timed out")]
    Timeout,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Calibration(e) if e.is_config_error() => StatusCode::BAD_REQUEST,
            AppError::Calibration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let config = AppError::from(CalibrationError::UnknownComponent {
            family: "relevance",
            name: "X".to_string(),
        });
        assert_eq!(config.into_response().status(), StatusCode::BAD_REQUEST);

        let data = AppError::from(CalibrationError::UnknownItem {
            item_id: "i1".to_string(),
        });
        assert_eq!(data.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        assert_eq!(
            AppError::Timeout.into_response().status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
