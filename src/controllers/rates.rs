use std::collections::HashMap;

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
        .prefix("rates")
        .add("/", post(get_rate))
        .add("/:base", get(get_all_rates))
        .add("/:from/:to", get(get_rate_by_path).post(get_rate_by_path))
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub from_currency: String,
    pub to_currency: String,
}

#[derive(Debug, Serialize)]
pub struct RateResponse {
    pub from_currency: String,
    pub to_currency: String,
    pub exchange_rate: Decimal,
    pub confidence_level: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BatchRateEntry {
    pub rate: Decimal,
    pub confidence_level: String,
    pub sources_used: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BatchRatesResponse {
    pub base_currency: String,
    pub pairs: usize,
    pub rates: HashMap<String, BatchRateEntry>,
}

/// Current rate between two currencies, without conversion.
async fn get_rate(
    Extension(services): Extension<SharedServices>,
    Json(request): Json<RateRequest>,
) -> Result<Response> {
    Ok(fetch_rate(&services, &request.from_currency, &request.to_currency).await)
}

/// GET variant: /rates/USD/EUR
async fn get_rate_by_path(
    Extension(services): Extension<SharedServices>,
    Path((from_currency, to_currency)): Path<(String, String)>,
) -> Result<Response> {
    Ok(fetch_rate(&services, &from_currency, &to_currency).await)
}

async fn fetch_rate(services: &SharedServices, from_raw: &str, to_raw: &str) -> Response {
    let from_currency = match normalize_code(from_raw) {
        Ok(code) => code,
        Err(response) => return response,
    };
    let to_currency = match normalize_code(to_raw) {
        Ok(code) => code,
        Err(response) => return response,
    };

    match services.aggregator.get_rate(&from_currency, &to_currency).await {
        Ok(aggregated) => (
            StatusCode::OK,
            Json(RateResponse {
                from_currency,
                to_currency,
                exchange_rate: aggregated.rate,
                confidence_level: aggregated.confidence_level.to_string(),
                timestamp: aggregated.timestamp,
            }),
        )
            .into_response(),
        Err(err) => aggregator_error_response(&err),
    }
}

/// All fused rates for one base currency.
async fn get_all_rates(
    Extension(services): Extension<SharedServices>,
    Path(base): Path<String>,
) -> Result<Response> {
    let base_currency = match normalize_code(&base) {
        Ok(code) => code,
        Err(response) => return Ok(response),
    };

    match services.aggregator.get_all_rates_for_base(&base_currency).await {
        Ok(rates) if rates.is_empty() => Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Service temporarily unavailable" })),
        )
            .into_response()),
        Ok(rates) => {
            let entries: HashMap<String, BatchRateEntry> = rates
                .into_iter()
                .map(|(target, aggregated)| {
                    (
                        target,
                        BatchRateEntry {
                            rate: aggregated.rate,
                            confidence_level: aggregated.confidence_level.to_string(),
                            sources_used: aggregated.sources_used,
                            timestamp: aggregated.timestamp,
                        },
                    )
                })
                .collect();
            Ok((
                StatusCode::OK,
                Json(BatchRatesResponse {
                    base_currency,
                    pairs: entries.len(),
                    rates: entries,
                }),
            )
                .into_response())
        }
        Err(err) => Ok(aggregator_error_response(&err)),
    }
}
