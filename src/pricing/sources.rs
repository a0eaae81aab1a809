use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PriceError;

/// Price observed on one market together with its traded volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeQuote {
    pub price: Decimal,
    pub volume: Decimal,
}

/// One ranked market pair; volume may be missing for untracked markets
#[derive(Debug, Clone, PartialEq)]
pub struct MarketPair {
    pub price: Decimal,
    pub volume_24h: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LockedAsset {
    pub id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub decimals: u32,
}

/// AMM pool state over the lookback window
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSnapshot {
    pub id: String,
    pub locked_x: LockedAsset,
    pub locked_y: LockedAsset,
    /// Trade volume in the window, zero when unknown
    pub volume: Decimal,
}

/// Batched USD lookup keyed by network identifier
#[async_trait]
pub trait QuoteApi: Send + Sync {
    async fn usd_prices(&self, networks: &[String]) -> Result<HashMap<String, Decimal>, PriceError>;
}

#[async_trait]
pub trait MarketPairSource: Send + Sync {
    async fn market_pairs(&self, slug: &str) -> Result<Vec<MarketPair>, PriceError>;
}

#[async_trait]
pub trait PoolSource: Send + Sync {
    async fn pool_snapshots(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PoolSnapshot>, PriceError>;
}

/// Price of a token in units of the pair reference token
#[async_trait]
pub trait PairRatioSource: Send + Sync {
    async fn price_in_reference(&self, token_id: &str) -> Result<Decimal, PriceError>;
}

/// Every remote backend the resolver may call
#[derive(Clone)]
pub struct PriceSources {
    pub quote_api: Arc<dyn QuoteApi>,
    pub markets: Arc<dyn MarketPairSource>,
    pub pools: Arc<dyn PoolSource>,
    pub pair_ratio: Arc<dyn PairRatioSource>,
}
