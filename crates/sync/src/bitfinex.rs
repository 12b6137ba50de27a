//! Bitfinex public candles client.
//!
//! Endpoint: `{base}/candles/trade:{resolution}:{symbol}/{last|hist}`.
//! `last` answers with one `[MTS, OPEN, CLOSE, HIGH, LOW, VOLUME]` array,
//! `hist` with an array of them. Errors come back as
//! `["error", code, "message"]`.

use crate::source::{CandleSource, FetchRequest, Selector};
use candlestore_core::config::RemoteConfig;
use candlestore_core::{Candle, Error, Result, COLUMN_COUNT};
use serde_json::Value;
use std::time::Duration;

/// Blocking HTTP client for the Bitfinex public API.
#[derive(Debug, Clone)]
pub struct BitfinexClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl BitfinexClient {
    /// Create a client from the remote configuration.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::remote(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, request: &FetchRequest) -> String {
        let section = match request.selector {
            Selector::Latest => "last",
            Selector::History => "hist",
        };
        format!(
            "{}/candles/trade:{}:{}/{}",
            self.base_url, request.resolution, request.symbol, section
        )
    }
}

impl CandleSource for BitfinexClient {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Candle>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(limit) = request.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(start) = request.start {
            query.push(("start", start.to_string()));
        }
        if let Some(sort) = request.sort {
            query.push(("sort", sort.to_string()));
        }

        let url = self.url(request);
        tracing::trace!(%url, ?query, "Fetching candles");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .map_err(|e| Error::remote(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| Error::remote(format!("failed to read response from {url}: {e}")))?;
        if !status.is_success() {
            return Err(Error::remote(format!("{url} returned {status}: {body}")));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| Error::remote(format!("malformed response from {url}: {e}")))?;
        parse_candles(request.selector, &value)
    }
}

/// Decode a `last` or `hist` response body.
pub fn parse_candles(selector: Selector, value: &Value) -> Result<Vec<Candle>> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::remote(format!("expected a JSON array, got {value}")))?;

    if items.first().and_then(Value::as_str) == Some("error") {
        return Err(Error::remote(format!("remote error: {value}")));
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }

    match selector {
        Selector::Latest => Ok(vec![parse_row(value)?]),
        Selector::History => items.iter().map(parse_row).collect(),
    }
}

fn parse_row(value: &Value) -> Result<Candle> {
    let fields = value
        .as_array()
        .filter(|fields| fields.len() >= COLUMN_COUNT)
        .ok_or_else(|| Error::remote(format!("expected a 6-field candle, got {value}")))?;

    let mut values = [0.0; COLUMN_COUNT];
    for (slot, field) in values.iter_mut().zip(fields) {
        *slot = field
            .as_f64()
            .ok_or_else(|| Error::remote(format!("non-numeric candle field {field}")))?;
    }
    Ok(Candle::from_values(values))
}
