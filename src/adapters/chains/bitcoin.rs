use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::adapters::traits::{FeeRateEstimator, HeightProvider};
use crate::error::{AppResult, ChainError};
use crate::models::Chain;

/// Esplora REST client
pub struct EsploraClient {
    client: Client,
    base_url: String,
}

impl EsploraClient {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ChainError> {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ChainError::Request {
                chain: Chain::Bitcoin,
                message: e.to_string(),
            })
    }
}

fn parse_error(message: impl ToString) -> ChainError {
    ChainError::Parse {
        chain: Chain::Bitcoin,
        message: message.to_string(),
    }
}

/// Esplora keys fee estimates by confirmation target as strings
fn parse_fee_estimates(raw: HashMap<String, Decimal>) -> BTreeMap<u32, Decimal> {
    raw.into_iter()
        .filter_map(|(target, rate)| target.parse::<u32>().ok().map(|target| (target, rate)))
        .collect()
}

#[async_trait]
impl HeightProvider for EsploraClient {
    fn chain(&self) -> Chain {
        Chain::Bitcoin
    }

    async fn current_height(&self) -> Result<u64, ChainError> {
        let body = self
            .get("/api/blocks/tip/height")
            .await?
            .text()
            .await
            .map_err(parse_error)?;
        body.trim().parse::<u64>().map_err(parse_error)
    }
}

#[async_trait]
impl FeeRateEstimator for EsploraClient {
    async fn fee_rates(&self) -> Result<BTreeMap<u32, Decimal>, ChainError> {
        let raw: HashMap<String, Decimal> = self
            .get("/api/fee-estimates")
            .await?
            .json()
            .await
            .map_err(parse_error)?;
        Ok(parse_fee_estimates(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fee_estimates_are_keyed_by_target() {
        let raw: HashMap<String, Decimal> =
            serde_json::from_str(r#"{"1": 25.5, "6": 12.1, "144": 1.0}"#).unwrap();
        let rates = parse_fee_estimates(raw);
        assert_eq!(rates.get(&6), Some(&dec!(12.1)));
        assert_eq!(rates.len(), 3);
    }
}
