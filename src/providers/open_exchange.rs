use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::base::{
    apply_parsed_rate, decimal_from_json, timestamp_from_unix, Auth, ParsedPayload, ProviderCallResult,
    ProviderHttp, RateProvider, RateRecord,
};

/// Open Exchange Rates adapter.
///
/// No success flag; errors are an `{"error": true, "description": ...}`
/// envelope, timestamps are Unix seconds, the credential goes into the
/// `app_id` query parameter and endpoints carry a `.json` suffix.
pub struct OpenExchangeProvider {
    http: ProviderHttp,
}

impl OpenExchangeProvider {
    pub const NAME: &'static str = "OpenExchange";

    pub fn new(app_id: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = ProviderHttp::new(
            Self::NAME,
            "https://openexchangerates.org/api",
            Auth::QueryParam("app_id", app_id),
            timeout,
        )?;
        Ok(Self { http })
    }

    fn envelope_error(body: &Value) -> Option<&str> {
        if body["error"].as_bool().unwrap_or(false) {
            Some(body["description"].as_str().unwrap_or("Unknown API error"))
        } else {
            None
        }
    }

    fn parse_rate_payload(&self, body: &Value, base: &str, target: &str) -> RateRecord {
        if let Some(description) = Self::envelope_error(body) {
            return RateRecord::failed(base, target, self.http.name(), description);
        }

        let Some(raw_rate) = body["rates"].get(target) else {
            return RateRecord::failed(
                base,
                target,
                self.http.name(),
                format!("Target currency {target} not found in rates"),
            );
        };
        let Some(rate) = decimal_from_json(raw_rate) else {
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
            timestamp: timestamp_from_unix(body.get("timestamp")),
            provider_name: self.http.name().to_string(),
            is_successful: true,
            error_message: None,
        }
    }
}

#[async_trait]
impl RateProvider for OpenExchangeProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn get_rate(&self, base: &str, target: &str) -> ProviderCallResult {
        let (result, body) = self
            .http
            .get_json("latest.json", &[("base", base), ("symbols", target)])
            .await;
        match body {
            Some(body) => apply_parsed_rate(result, self.parse_rate_payload(&body, base, target)),
            None => result,
        }
    }

    async fn get_all_rates(&self, base: &str) -> ProviderCallResult {
        let (mut result, body) = self.http.get_json("latest.json", &[("base", base)]).await;
        let Some(body) = body else { return result };

        if let Some(description) = Self::envelope_error(&body) {
            result.was_successful = false;
            result.error_message = Some(description.to_string());
            return result;
        }

        let Some(rates) = body["rates"].as_object().filter(|r| !r.is_empty()) else {
            result.was_successful = false;
            result.error_message = Some("No rates found in response".to_string());
            return result;
        };

        let timestamp = timestamp_from_unix(body.get("timestamp"));
        let records = rates
            .iter()
            .filter_map(|(target, raw_rate)| {
                let rate = decimal_from_json(raw_rate)?;
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
        // currencies.json is a flat {code: name} map with no envelope
        let (mut result, body) = self.http.get_json("currencies.json", &[]).await;
        let Some(body) = body else { return result };

        match body.as_object().filter(|codes| !codes.is_empty()) {
            Some(codes) => {
                result.data = Some(ParsedPayload::Currencies(codes.keys().cloned().collect()));
            }
            None => {
                result.was_successful = false;
                result.error_message = Some("No symbols found in response".to_string());
            }
        }
        result
    }
}
