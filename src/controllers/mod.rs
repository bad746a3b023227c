use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::services::rate_aggregator::AggregatorError;

pub mod convert;
pub mod health;
pub mod rates;
pub mod websocket;

/// Map pipeline errors to the user-facing contract: invalid currencies are a
/// 400 with the reason, everything else is a generic 503 with details kept
/// server-side.
pub(crate) fn aggregator_error_response(err: &AggregatorError) -> Response {
    match err {
        AggregatorError::InvalidCurrency(reason) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": reason })),
        )
            .into_response(),
        AggregatorError::NoRateAvailable { base, target } => {
            error!(base, target, "no rate available");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Service temporarily unavailable" })),
            )
                .into_response()
        }
    }
}

/// Uppercase and shape-check a currency code from user input.
pub(crate) fn normalize_code(raw: &str) -> Result<String, Response> {
    let code = raw.trim().to_uppercase();
    if crate::models::is_currency_code(&code) {
        Ok(code)
    } else {
        Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("Invalid currency code: {raw}") })),
        )
            .into_response())
    }
}
