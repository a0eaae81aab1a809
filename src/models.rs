use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::error::ScheduleError;

/// Chains the bridge fee schedule covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ergo,
    Cardano,
    Bitcoin,
    Ethereum,
    Binance,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ergo => "ergo",
            Chain::Cardano => "cardano",
            Chain::Bitcoin => "bitcoin",
            Chain::Ethereum => "ethereum",
            Chain::Binance => "binance",
        }
    }

    /// Return all known chains
    pub fn all() -> Vec<Chain> {
        vec![
            Chain::Ergo,
            Chain::Cardano,
            Chain::Bitcoin,
            Chain::Ethereum,
            Chain::Binance,
        ]
    }
}

impl FromStr for Chain {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Chain::all()
            .into_iter()
            .find(|chain| chain.as_str() == s)
            .ok_or_else(|| ScheduleError::UnknownChain(s.to_string()))
    }
}

/// Where the USD price of a token comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum PriceBackend {
    /// Batched quote API lookup by network identifier
    Coingecko { network: String },
    /// Volume weighted average of ranked market pairs
    Coinmarketcap { slug: String },
    /// Volume weighted AMM pools against the pool reference asset
    Spectrum,
    /// Aggregator average price against the pair reference token
    Dexhunter,
    Manual { price: Decimal },
    /// Copies the resolved price of another configured token
    DuplicateToken { token_id: String },
}

impl PriceBackend {
    pub fn name(&self) -> &'static str {
        match self {
            PriceBackend::Coingecko { .. } => "coingecko",
            PriceBackend::Coinmarketcap { .. } => "coinmarketcap",
            PriceBackend::Spectrum => "spectrum",
            PriceBackend::Dexhunter => "dexhunter",
            PriceBackend::Manual { .. } => "manual",
            PriceBackend::DuplicateToken { .. } => "duplicate-token",
        }
    }
}

fn default_fee_rate_confirmation() -> u32 {
    6
}

/// Per-token inputs of the fee derivation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeParameters {
    pub bridge_fee_usd: Decimal,
    /// Fixed network fee estimates in whole native units, overriding the chain default
    #[serde(default)]
    pub network_fees: BTreeMap<Chain, Decimal>,
    #[serde(default = "default_fee_rate_confirmation")]
    pub fee_rate_confirmation: u32,
    pub fee_ratio_float: Decimal,
    /// Blocks between the current height and the activation height, per chain
    pub delays: BTreeMap<Chain, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SupportedToken {
    #[validate(length(min = 1, message = "token id cannot be empty"))]
    pub token_id: String,
    #[validate(length(min = 1, message = "token name cannot be empty"))]
    pub name: String,
    #[validate(range(max = 18, message = "at most 18 decimals are supported"))]
    pub decimals: u32,
    /// Identity of the token on the chain holding the config record
    #[validate(length(min = 1, message = "config token id cannot be empty"))]
    pub config_token_id: String,
    /// Token identity on every chain it trades on
    pub chains: BTreeMap<Chain, String>,
    pub price: PriceBackend,
    pub fee: FeeParameters,
}

impl SupportedToken {
    pub fn trades_on(&self, chain: Chain) -> bool {
        self.chains.contains_key(&chain)
    }
}
