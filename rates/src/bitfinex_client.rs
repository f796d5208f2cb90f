//! Bitfinex public API v1.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::client::{Ticker, TickerClient};
use crate::error::{RatesError, RatesResult};

pub const DEFAULT_BASE_URL: &str = "https://api.bitfinex.com";

#[derive(Clone)]
pub struct BitfinexClient {
    client: Client,
    base_url: String,
}

impl BitfinexClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RatesResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RatesError::Upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> RatesResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Requesting Bitfinex");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RatesError::Upstream(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(RatesError::Upstream(format!("{url}: status {}", response.status())));
        }
        let body = response
            .text()
            .await
            .map_err(|e| RatesError::Upstream(format!("{url}: {e}")))?;
        serde_json::from_str(&body).map_err(|e| RatesError::Parse(format!("{url}: {e}")))
    }
}

#[async_trait]
impl TickerClient for BitfinexClient {
    #[instrument(skip(self))]
    async fn fetch_symbols(&self) -> RatesResult<Vec<String>> {
        self.get_json("/v1/symbols").await
    }

    #[instrument(skip(self))]
    async fn fetch_ticker(&self, symbol: &str) -> RatesResult<Ticker> {
        self.get_json(&format!("/v1/pubticker/{}", symbol)).await
    }
}
