use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

use crate::adapters::traits::{FeeRateEstimator, HeightProvider};
use crate::error::ChainError;
use crate::models::Chain;

/// Height providers by chain plus the optional fee-rate estimator
pub struct ChainRegistry {
    heights: HashMap<Chain, Arc<dyn HeightProvider>>,
    fee_rates: Option<Arc<dyn FeeRateEstimator>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self {
            heights: HashMap::new(),
            fee_rates: None,
        }
    }

    pub fn register_height_provider(&mut self, provider: Arc<dyn HeightProvider>) {
        info!("Registering height provider: {}", provider.chain());
        self.heights.insert(provider.chain(), provider);
    }

    pub fn register_fee_rate_estimator(&mut self, estimator: Arc<dyn FeeRateEstimator>) {
        self.fee_rates = Some(estimator);
    }

    pub fn height_provider(&self, chain: Chain) -> Result<Arc<dyn HeightProvider>, ChainError> {
        self.heights
            .get(&chain)
            .cloned()
            .ok_or(ChainError::NotRegistered(chain))
    }

    /// Current heights of `chains`, fetched concurrently; any failure fails the batch
    pub async fn current_heights(&self, chains: &[Chain]) -> Result<BTreeMap<Chain, u64>, ChainError> {
        let providers = chains
            .iter()
            .map(|chain| self.height_provider(*chain))
            .collect::<Result<Vec<_>, ChainError>>()?;

        let results = join_all(providers.iter().map(|provider| async move {
            provider
                .current_height()
                .await
                .map(|height| (provider.chain(), height))
        }))
        .await;

        results.into_iter().collect()
    }

    /// Fee rates by confirmation target, empty when no estimator is registered
    pub async fn fee_rates(&self) -> Result<BTreeMap<u32, Decimal>, ChainError> {
        match &self.fee_rates {
            Some(estimator) => estimator.fee_rates().await,
            None => Ok(BTreeMap::new()),
        }
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}
