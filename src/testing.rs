// In-memory doubles for the remote services the job talks to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::adapters::traits::{ConfigBoxReader, HeightProvider, UtxoProvider};
use crate::error::{AppResult, ChainError, PriceError, ScheduleError};
use crate::ledger::models::UtxoBox;
use crate::models::Chain;
use crate::notification::NotificationSink;
use crate::pricing::sources::{
    MarketPair, MarketPairSource, PairRatioSource, PoolSnapshot, PoolSource, PriceSources, QuoteApi,
};
use crate::schedule::models::CommittedSchedule;
use crate::store::KvStore;

pub struct FixedHeight {
    chain: Chain,
    height: u64,
}

impl FixedHeight {
    pub fn new(chain: Chain, height: u64) -> Self {
        Self { chain, height }
    }
}

#[async_trait]
impl HeightProvider for FixedHeight {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn current_height(&self) -> Result<u64, ChainError> {
        Ok(self.height)
    }
}

pub struct StaticUtxos {
    boxes: Vec<UtxoBox>,
}

impl StaticUtxos {
    pub fn new(boxes: Vec<UtxoBox>) -> Self {
        Self { boxes }
    }
}

#[async_trait]
impl UtxoProvider for StaticUtxos {
    async fn unspent_boxes(&self, address: &str) -> Result<Vec<UtxoBox>, ChainError> {
        Ok(self
            .boxes
            .iter()
            .filter(|b| b.address == address)
            .cloned()
            .collect())
    }
}

/// Config box reader serving fixed schedules, or failing every fetch
#[derive(Default)]
pub struct StaticConfigReader {
    schedules: HashMap<String, CommittedSchedule>,
    fail: bool,
    calls: AtomicUsize,
}

impl StaticConfigReader {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_schedule(mut self, config_token_id: &str, committed: CommittedSchedule) -> Self {
        self.schedules.insert(config_token_id.to_string(), committed);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigBoxReader for StaticConfigReader {
    async fn fetch_schedule(
        &self,
        config_token_id: &str,
    ) -> Result<Option<CommittedSchedule>, ScheduleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ScheduleError::ScheduleFetchFailed {
                token: config_token_id.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(self.schedules.get(config_token_id).cloned())
    }
}

/// Canned answers for every price backend
#[derive(Debug, Clone, Default)]
pub struct FakePriceSources {
    /// USD quotes keyed by network identifier
    pub quotes: HashMap<String, Decimal>,
    pub market_pairs: Vec<MarketPair>,
    pub markets_fail: bool,
    pub pools: Vec<PoolSnapshot>,
    /// Price against the pair reference token; `None` fails the lookup
    pub pair_ratio: Option<Decimal>,
}

#[async_trait]
impl QuoteApi for FakePriceSources {
    async fn usd_prices(&self, networks: &[String]) -> Result<HashMap<String, Decimal>, PriceError> {
        Ok(networks
            .iter()
            .filter_map(|network| self.quotes.get(network).map(|price| (network.clone(), *price)))
            .collect())
    }
}

#[async_trait]
impl MarketPairSource for FakePriceSources {
    async fn market_pairs(&self, _slug: &str) -> Result<Vec<MarketPair>, PriceError> {
        if self.markets_fail {
            return Err(PriceError::Http("503 Service Unavailable".to_string()));
        }
        Ok(self.market_pairs.clone())
    }
}

#[async_trait]
impl PoolSource for FakePriceSources {
    async fn pool_snapshots(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<PoolSnapshot>, PriceError> {
        Ok(self.pools.clone())
    }
}

#[async_trait]
impl PairRatioSource for FakePriceSources {
    async fn price_in_reference(&self, token_id: &str) -> Result<Decimal, PriceError> {
        self.pair_ratio
            .ok_or_else(|| PriceError::Decode(format!("no average price for [{}]", token_id)))
    }
}

pub fn fake_sources(fakes: FakePriceSources) -> PriceSources {
    let fakes = Arc::new(fakes);
    PriceSources {
        quote_api: fakes.clone(),
        markets: fakes.clone(),
        pools: fakes.clone(),
        pair_ratio: fakes,
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn send(&self, message: &str) {
        self.messages.lock().await.push(message.to_string());
    }
}

#[derive(Default)]
pub struct MemoryKvStore {
    values: Mutex<HashMap<String, String>>,
    hashes: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryKvStore {
    pub async fn value(&self, key: &str) -> Option<String> {
        self.values.lock().await.get(key).cloned()
    }

    pub async fn hash(&self, key: &str) -> BTreeMap<String, String> {
        self.hashes.lock().await.get(key).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set(&self, key: &str, value: String) -> AppResult<()> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn hset(&self, key: &str, fields: BTreeMap<String, String>) -> AppResult<()> {
        self.hashes
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .extend(fields);
        Ok(())
    }

    async fn flush(&self) -> AppResult<()> {
        self.values.lock().await.clear();
        self.hashes.lock().await.clear();
        Ok(())
    }
}
