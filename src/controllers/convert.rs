use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use chrono::{DateTime, Utc};
use loco_rs::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{aggregator_error_response, normalize_code};
use crate::services::factory::SharedServices;

pub fn routes() -> Routes {
    Routes::new()
        .prefix("convert")
        .add("/", post(convert))
        .add("/:from/:to/:amount", get(convert_get))
}

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub from_currency: String,
    pub to_currency: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub from_currency: String,
    pub to_currency: String,
    pub amount: Decimal,
    pub converted_amount: Decimal,
    pub exchange_rate: Decimal,
    pub confidence_level: String,
    pub timestamp: DateTime<Utc>,
}

/// Convert an amount between two currencies at the current fused rate.
async fn convert(
    Extension(services): Extension<SharedServices>,
    Json(request): Json<ConvertRequest>,
) -> Result<Response> {
    Ok(perform_conversion(&services, request).await)
}

/// GET variant for simple requests: /convert/USD/EUR/100
async fn convert_get(
    Extension(services): Extension<SharedServices>,
    Path((from_currency, to_currency, amount)): Path<(String, String, Decimal)>,
) -> Result<Response> {
    let request = ConvertRequest {
        from_currency,
        to_currency,
        amount,
    };
    Ok(perform_conversion(&services, request).await)
}

async fn perform_conversion(services: &SharedServices, request: ConvertRequest) -> Response {
    if request.amount <= Decimal::ZERO {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Amount must be greater than zero" })),
        )
            .into_response();
    }
    let from_currency = match normalize_code(&request.from_currency) {
        Ok(code) => code,
        Err(response) => return response,
    };
    let to_currency = match normalize_code(&request.to_currency) {
        Ok(code) => code,
        Err(response) => return response,
    };

    match services.aggregator.get_rate(&from_currency, &to_currency).await {
        Ok(aggregated) => {
            let converted_amount = (request.amount * aggregated.rate).round_dp(2);
            (
                StatusCode::OK,
                Json(ConvertResponse {
                    from_currency,
                    to_currency,
                    amount: request.amount,
                    converted_amount,
                    exchange_rate: aggregated.rate,
                    confidence_level: aggregated.confidence_level.to_string(),
                    timestamp: aggregated.timestamp,
                }),
            )
                .into_response()
        }
        Err(err) => aggregator_error_response(&err),
    }
}
