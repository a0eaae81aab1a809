use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::error::{ChainError, ScheduleError};
use crate::ledger::models::UtxoBox;
use crate::models::Chain;
use crate::schedule::models::CommittedSchedule;

#[async_trait]
pub trait HeightProvider: Send + Sync {
    fn chain(&self) -> Chain;

    async fn current_height(&self) -> Result<u64, ChainError>;
}

#[async_trait]
pub trait FeeRateEstimator: Send + Sync {
    /// Fee rate per virtual byte keyed by confirmation target in blocks
    async fn fee_rates(&self) -> Result<BTreeMap<u32, Decimal>, ChainError>;
}

#[async_trait]
pub trait UtxoProvider: Send + Sync {
    async fn unspent_boxes(&self, address: &str) -> Result<Vec<UtxoBox>, ChainError>;
}

#[async_trait]
pub trait ConfigBoxReader: Send + Sync {
    /// Current config box of a token and its decoded schedule. Transport
    /// problems are `ScheduleFetchFailed`, an absent box is `Ok(None)`.
    async fn fetch_schedule(
        &self,
        config_token_id: &str,
    ) -> Result<Option<CommittedSchedule>, ScheduleError>;
}
