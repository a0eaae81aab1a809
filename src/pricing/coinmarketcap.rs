use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{AppResult, PriceError};
use crate::pricing::sources::{MarketPair, MarketPairSource};

#[derive(Debug, Deserialize)]
struct MarketPairsResponse {
    data: MarketPairsData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketPairsData {
    #[serde(default)]
    market_pairs: Vec<MarketPairEntry>,
}

#[derive(Debug, Deserialize)]
struct MarketPairEntry {
    #[serde(default)]
    quotes: Vec<PairQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairQuote {
    price: Decimal,
    #[serde(default)]
    volume24h: Option<Decimal>,
}

/// CoinMarketCap ranked market pairs
pub struct CoinmarketcapClient {
    client: Client,
    url: String,
    limit: u32,
}

impl CoinmarketcapClient {
    pub fn new(url: &str, limit: u32, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.to_string(),
            limit,
        })
    }
}

#[async_trait]
impl MarketPairSource for CoinmarketcapClient {
    async fn market_pairs(&self, slug: &str) -> Result<Vec<MarketPair>, PriceError> {
        let limit = self.limit.to_string();
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("slug", slug),
                ("start", "1"),
                ("limit", limit.as_str()),
                ("category", "spot"),
                ("centerType", "all"),
                ("sort", "cmc_rank_advanced"),
                ("direction", "desc"),
                ("spotUntracked", "true"),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body: MarketPairsResponse = response
            .json()
            .await
            .map_err(|e| PriceError::Decode(format!("coinmarketcap: {}", e)))?;

        Ok(body
            .data
            .market_pairs
            .into_iter()
            .filter_map(|pair| pair.quotes.into_iter().next())
            .map(|quote| MarketPair {
                price: quote.price,
                volume_24h: quote.volume24h,
            })
            .collect())
    }
}
