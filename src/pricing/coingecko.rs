use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::{AppResult, PriceError};
use crate::pricing::sources::QuoteApi;

/// CoinGecko `simple/price` client
pub struct CoingeckoClient {
    client: Client,
    base_url: String,
}

impl CoingeckoClient {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl QuoteApi for CoingeckoClient {
    async fn usd_prices(&self, networks: &[String]) -> Result<HashMap<String, Decimal>, PriceError> {
        if networks.is_empty() {
            return Ok(HashMap::new());
        }
        let url = format!("{}/api/v3/simple/price", self.base_url);
        let ids = networks.join(",");
        debug!("Fetching CoinGecko prices for [{}]", ids);

        let response = self
            .client
            .get(&url)
            .query(&[("ids", ids.as_str()), ("vs_currencies", "usd")])
            .send()
            .await?
            .error_for_status()?;
        let body: HashMap<String, HashMap<String, Decimal>> = response
            .json()
            .await
            .map_err(|e| PriceError::Decode(format!("coingecko: {}", e)))?;

        Ok(body
            .into_iter()
            .filter_map(|(network, quotes)| quotes.get("usd").map(|usd| (network, *usd)))
            .collect())
    }
}
