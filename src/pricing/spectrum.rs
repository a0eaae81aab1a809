use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{AppResult, PriceError};
use crate::pricing::sources::{LockedAsset, PoolSnapshot, PoolSource};

#[derive(Debug, Deserialize)]
struct PoolVolume {
    value: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolStats {
    id: String,
    locked_x: LockedAsset,
    locked_y: LockedAsset,
    #[serde(default)]
    volume: Option<PoolVolume>,
}

/// Spectrum AMM pool statistics
pub struct SpectrumClient {
    client: Client,
    base_url: String,
}

impl SpectrumClient {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PoolSource for SpectrumClient {
    async fn pool_snapshots(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PoolSnapshot>, PriceError> {
        let url = format!("{}/v1/amm/pools/stats", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("from", from.timestamp_millis()), ("to", to.timestamp_millis())])
            .send()
            .await?
            .error_for_status()?;
        let pools: Vec<PoolStats> = response
            .json()
            .await
            .map_err(|e| PriceError::Decode(format!("spectrum: {}", e)))?;
        debug!("Fetched {} Spectrum pools", pools.len());

        Ok(pools
            .into_iter()
            .map(|pool| PoolSnapshot {
                id: pool.id,
                locked_x: pool.locked_x,
                locked_y: pool.locked_y,
                volume: pool.volume.map(|v| v.value).unwrap_or_default(),
            })
            .collect())
    }
}
