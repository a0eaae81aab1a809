use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{AppResult, PriceError};
use crate::pricing::sources::PairRatioSource;

#[derive(Debug, Deserialize)]
struct AveragePrice {
    /// Price of the token in the pair reference token
    price_ba: Decimal,
}

/// DexHunter average swap price against ADA
pub struct DexhunterClient {
    client: Client,
    base_url: String,
}

impl DexhunterClient {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PairRatioSource for DexhunterClient {
    async fn price_in_reference(&self, token_id: &str) -> Result<Decimal, PriceError> {
        let unit = token_id.replace('.', "");
        let url = format!("{}/swap/averagePrice/ADA/{}", self.base_url, unit);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: AveragePrice = response
            .json()
            .await
            .map_err(|e| PriceError::Decode(format!("dexhunter: {}", e)))?;
        Ok(body.price_ba)
    }
}
