use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::base::{
    apply_parsed_rate, decimal_from_json, timestamp_from_iso, Auth, ParsedPayload, ProviderCallResult,
    ProviderHttp, RateProvider, RateRecord,
};

/// CurrencyAPI adapter.
///
/// Rates nest under `data.<CODE>.value`; the update time is an ISO-8601
/// string in `meta.last_updated_at`; the credential travels in an `apikey`
/// header rather than the query string.
pub struct CurrencyApiProvider {
    http: ProviderHttp,
}

impl CurrencyApiProvider {
    pub const NAME: &'static str = "CurrencyAPI";

    pub fn new(api_key: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = ProviderHttp::new(
            Self::NAME,
            "https://api.currencyapi.com/v3",
            Auth::Header("apikey", api_key),
            timeout,
        )?;
        Ok(Self { http })
    }

    fn last_updated(body: &Value) -> chrono::DateTime<chrono::Utc> {
        timestamp_from_iso(body["meta"]["last_updated_at"].as_str())
    }

    fn parse_rate_payload(&self, body: &Value, base: &str, target: &str) -> RateRecord {
        let Some(data) = body["data"].as_object() else {
            return RateRecord::failed(
                base,
                target,
                self.http.name(),
                "Invalid response format: missing 'data' field",
            );
        };

        let Some(rate_info) = data.get(target) else {
            return RateRecord::failed(
                base,
                target,
                self.http.name(),
                format!("Target currency {target} not found in rates"),
            );
        };
        let Some(rate) = decimal_from_json(&rate_info["value"]) else {
            return RateRecord::failed(
                base,
                target,
                self.http.name(),
                format!("Unparseable rate value for {target}"),
            );
        };

        RateRecord {
            base_currency: base.to_string(),
            target_currency: target.to_string(),
            rate,
            timestamp: Self::last_updated(body),
            provider_name: self.http.name().to_string(),
            is_successful: true,
            error_message: None,
        }
    }
}

#[async_trait]
impl RateProvider for CurrencyApiProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn get_rate(&self, base: &str, target: &str) -> ProviderCallResult {
        let (result, body) = self
            .http
            .get_json("latest", &[("base_currency", base), ("currencies", target)])
            .await;
        match body {
            Some(body) => apply_parsed_rate(result, self.parse_rate_payload(&body, base, target)),
            None => result,
        }
    }

    async fn get_all_rates(&self, base: &str) -> ProviderCallResult {
        let (mut result, body) = self.http.get_json("latest", &[("base_currency", base)]).await;
        let Some(body) = body else { return result };

        let Some(data) = body["data"].as_object().filter(|d| !d.is_empty()) else {
            result.was_successful = false;
            result.error_message = Some("No rate data found in response".to_string());
            return result;
        };

        let timestamp = Self::last_updated(&body);
        let records = data
            .iter()
            .filter_map(|(target, rate_info)| {
                let rate = decimal_from_json(&rate_info["value"])?;
                Some(RateRecord {
                    base_currency: base.to_string(),
                    target_currency: target.clone(),
                    rate,
                    timestamp,
                    provider_name: self.http.name().to_string(),
                    is_successful: true,
                    error_message: None,
                })
            })
            .collect();
        result.data = Some(ParsedPayload::RateTable(records));
        result
    }

    async fn get_supported_currencies(&self) -> ProviderCallResult {
        let (mut result, body) = self.http.get_json("currencies", &[]).await;
        let Some(body) = body else { return result };

        match body["data"].as_object().filter(|d| !d.is_empty()) {
            Some(data) => {
                result.data = Some(ParsedPayload::Currencies(data.keys().cloned().collect()));
            }
            None => {
                result.was_successful = false;
                result.error_message = Some("No currency data found in response".to_string());
            }
        }
        result
    }
}
