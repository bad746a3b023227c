use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

/// Standardized rate record parsed from any provider payload.
///
/// Raw provider responses are discarded after parsing; only this record
/// travels further into the pipeline.
#[derive(Debug, Clone)]
pub struct RateRecord {
    pub base_currency: String,
    pub target_currency: String,
    pub rate: Decimal,
    pub timestamp: DateTime<Utc>,
    pub provider_name: String,
    pub is_successful: bool,
    pub error_message: Option<String>,
}

impl RateRecord {
    pub fn failed(
        base: &str,
        target: &str,
        provider_name: &str,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            base_currency: base.to_string(),
            target_currency: target.to_string(),
            rate: Decimal::ZERO,
            timestamp: Utc::now(),
            provider_name: provider_name.to_string(),
            is_successful: false,
            error_message: Some(error_message.into()),
        }
    }
}

/// Payload variants a provider call can parse into.
#[derive(Debug, Clone)]
pub enum ParsedPayload {
    Rate(RateRecord),
    RateTable(Vec<RateRecord>),
    Currencies(Vec<String>),
}

/// Outcome of one provider HTTP call: timing, transport status and the
/// parsed payload. Providers report every failure through this value and
/// never return errors across the trait boundary.
#[derive(Debug, Clone)]
pub struct ProviderCallResult {
    pub provider_name: String,
    pub endpoint: String,
    pub http_status_code: Option<u16>,
    pub response_time_ms: i64,
    pub was_successful: bool,
    pub error_message: Option<String>,
    pub data: Option<ParsedPayload>,
}

impl ProviderCallResult {
    pub fn rate_record(&self) -> Option<&RateRecord> {
        match self.data.as_ref() {
            Some(ParsedPayload::Rate(record)) => Some(record),
            _ => None,
        }
    }

    pub fn rate_records(&self) -> Option<&[RateRecord]> {
        match self.data.as_ref() {
            Some(ParsedPayload::RateTable(records)) => Some(records),
            _ => None,
        }
    }

    pub fn currencies(&self) -> Option<&[String]> {
        match self.data.as_ref() {
            Some(ParsedPayload::Currencies(codes)) => Some(codes),
            _ => None,
        }
    }
}

/// Uniform interface over the third-party rate APIs.
#[async_trait]
pub trait RateProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch a single pair. Transport failures, provider-side logical errors
    /// and parse failures all come back as a failed [`ProviderCallResult`].
    async fn get_rate(&self, base: &str, target: &str) -> ProviderCallResult;

    /// Fetch every rate the provider lists for a base currency.
    async fn get_all_rates(&self, base: &str) -> ProviderCallResult;

    /// Fetch the provider's supported currency catalog.
    async fn get_supported_currencies(&self) -> ProviderCallResult;
}

/// Where a provider expects its API credential.
#[derive(Debug, Clone)]
pub enum Auth {
    QueryParam(&'static str, String),
    Header(&'static str, String),
}

/// Shared HTTP plumbing for the concrete providers: one reusable client per
/// provider, bounded timeout, small keep-alive pool, timing and uniform
/// transport error reporting.
pub(crate) struct ProviderHttp {
    name: &'static str,
    base_url: &'static str,
    auth: Auth,
    client: reqwest::Client,
    timeout: Duration,
}

impl ProviderHttp {
    pub(crate) fn new(
        name: &'static str,
        base_url: &'static str,
        auth: Auth,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(5)
            .build()?;
        Ok(Self {
            name,
            base_url,
            auth,
            client,
            timeout,
        })
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Issue one GET and return the transport-level result together with the
    /// decoded JSON body (when there is one to parse).
    pub(crate) async fn get_json(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> (ProviderCallResult, Option<Value>) {
        let started = Instant::now();
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(provider = self.name, endpoint, "calling provider API");

        let mut request = self.client.get(&url).query(query);
        match &self.auth {
            Auth::QueryParam(key, value) => request = request.query(&[(*key, value.as_str())]),
            Auth::Header(key, value) => request = request.header(*key, value),
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let elapsed_ms = started.elapsed().as_millis() as i64;
                let error_message = if err.is_timeout() {
                    format!("Timeout after {}s", self.timeout.as_secs())
                } else {
                    format!("Network error: {err}")
                };
                warn!(provider = self.name, endpoint, error = %error_message, "provider call failed");
                return (
                    self.transport_failure(endpoint, None, elapsed_ms, error_message),
                    None,
                );
            }
        };

        let status = response.status();
        if !status.is_success() {
            let elapsed_ms = started.elapsed().as_millis() as i64;
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            let error_message = format!("HTTP {}: {snippet}", status.as_u16());
            warn!(provider = self.name, endpoint, error = %error_message, "provider call failed");
            return (
                self.transport_failure(endpoint, Some(status.as_u16()), elapsed_ms, error_message),
                None,
            );
        }

        match response.json::<Value>().await {
            Ok(body) => {
                let elapsed_ms = started.elapsed().as_millis() as i64;
                (
                    ProviderCallResult {
                        provider_name: self.name.to_string(),
                        endpoint: endpoint.to_string(),
                        http_status_code: Some(status.as_u16()),
                        response_time_ms: elapsed_ms,
                        was_successful: true,
                        error_message: None,
                        data: None,
                    },
                    Some(body),
                )
            }
            Err(err) => {
                let elapsed_ms = started.elapsed().as_millis() as i64;
                let error_message = format!("Invalid JSON body: {err}");
                warn!(provider = self.name, endpoint, error = %error_message, "provider call failed");
                (
                    self.transport_failure(endpoint, Some(status.as_u16()), elapsed_ms, error_message),
                    None,
                )
            }
        }
    }

    fn transport_failure(
        &self,
        endpoint: &str,
        http_status_code: Option<u16>,
        response_time_ms: i64,
        error_message: String,
    ) -> ProviderCallResult {
        ProviderCallResult {
            provider_name: self.name.to_string(),
            endpoint: endpoint.to_string(),
            http_status_code,
            response_time_ms,
            was_successful: false,
            error_message: Some(error_message),
            data: None,
        }
    }
}

/// Fold a parsed rate record back into the call result: a logically failed
/// payload (invalid key, unknown currency) flips the whole call to failed.
pub(crate) fn apply_parsed_rate(mut result: ProviderCallResult, record: RateRecord) -> ProviderCallResult {
    result.was_successful = record.is_successful;
    if !record.is_successful {
        result.error_message = record.error_message.clone();
    }
    result.data = Some(ParsedPayload::Rate(record));
    result
}

/// Decode a rate value that may arrive as a JSON number or as a string.
/// Both paths go through the decimal's textual parser, never through `f64`.
pub(crate) fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Unix-seconds timestamp, substituting the current time when the field is
/// missing or unparseable.
pub(crate) fn timestamp_from_unix(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(Value::as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now)
}

/// ISO-8601 timestamp with the same substitution rule.
pub(crate) fn timestamp_from_iso(value: Option<&str>) -> DateTime<Utc> {
    value
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
