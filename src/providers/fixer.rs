use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::base::{
    apply_parsed_rate, decimal_from_json, timestamp_from_unix, Auth, ParsedPayload, ProviderCallResult,
    ProviderHttp, RateProvider, RateRecord,
};

/// Fixer.io adapter, the default primary provider.
///
/// Envelope carries an explicit `success` flag; errors arrive as an `error`
/// object with an `info` text; timestamps are Unix seconds; the credential
/// goes into the `access_key` query parameter.
pub struct FixerIoProvider {
    http: ProviderHttp,
}

impl FixerIoProvider {
    pub const NAME: &'static str = "FixerIO";

    pub fn new(api_key: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = ProviderHttp::new(
            Self::NAME,
            "http://data.fixer.io/api",
            Auth::QueryParam("access_key", api_key),
            timeout,
        )?;
        Ok(Self { http })
    }

    fn parse_rate_payload(&self, body: &Value, base: &str, target: &str) -> RateRecord {
        if !body["success"].as_bool().unwrap_or(false) {
            let info = body["error"]["info"].as_str().unwrap_or("Unknown API error");
            return RateRecord::failed(base, target, self.http.name(), info);
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
impl RateProvider for FixerIoProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn get_rate(&self, base: &str, target: &str) -> ProviderCallResult {
        let (result, body) = self
            .http
            .get_json("latest", &[("base", base), ("symbols", target)])
            .await;
        match body {
            Some(body) => apply_parsed_rate(result, self.parse_rate_payload(&body, base, target)),
            None => result,
        }
    }

    async fn get_all_rates(&self, base: &str) -> ProviderCallResult {
        let (mut result, body) = self.http.get_json("latest", &[("base", base)]).await;
        let Some(body) = body else { return result };

        if !body["success"].as_bool().unwrap_or(false) {
            result.was_successful = false;
            result.error_message = Some(
                body["error"]["info"]
                    .as_str()
                    .unwrap_or("Unknown API error")
                    .to_string(),
            );
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
        let (mut result, body) = self.http.get_json("symbols", &[]).await;
        let Some(body) = body else { return result };

        match body["symbols"].as_object().filter(|s| !s.is_empty()) {
            Some(symbols) => {
                result.data = Some(ParsedPayload::Currencies(symbols.keys().cloned().collect()));
            }
            None => {
                result.was_successful = false;
                result.error_message = Some("No symbols found in response".to_string());
            }
        }
        result
    }
}
