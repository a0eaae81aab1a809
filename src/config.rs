use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{Chain, PriceBackend, SupportedToken};

const DEFAULT_CONFIG_PATH: &str = "config/default";

fn default_min_box_value() -> u64 {
    200_000
}

fn default_tx_fee() -> u64 {
    1_100_000
}

fn default_fetch_box_retry() -> u32 {
    3
}

fn default_rsn_ratio_precision() -> u32 {
    6
}

fn default_native_token_id() -> String {
    "erg".to_string()
}

fn default_config_chain() -> Chain {
    Chain::Ergo
}

/// Complete, immutable configuration of the fee job
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Seconds between the end of one run and the start of the next
    #[validate(range(min = 1, message = "interval must be at least one second"))]
    pub interval_secs: u64,
    #[validate]
    pub minimum_fee: MinimumFeeSettings,
    pub trigger_percent: TriggerPercent,
    pub chains: BTreeMap<Chain, ChainSettings>,
    #[validate]
    pub price_sources: PriceSourceSettings,
    #[validate]
    pub supported_tokens: Vec<SupportedToken>,
    #[serde(default)]
    pub notification: NotificationSettings,
    #[serde(default)]
    pub store: Option<StoreSettings>,
}

/// Settings of the on-chain config record and the funding wallet
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MinimumFeeSettings {
    #[validate(length(min = 1, message = "config NFT id cannot be empty"))]
    pub nft: String,
    #[validate(length(min = 1, message = "config address cannot be empty"))]
    pub config_address: String,
    #[validate(length(min = 1, message = "fee address cannot be empty"))]
    pub fee_address: String,
    #[serde(default = "default_min_box_value")]
    pub min_box_value: u64,
    #[serde(default = "default_tx_fee")]
    pub tx_fee: u64,
    #[serde(default = "default_fetch_box_retry")]
    #[validate(range(min = 1, message = "at least one fetch attempt is required"))]
    pub fetch_box_retry: u32,
    #[serde(default = "default_rsn_ratio_precision")]
    #[validate(range(min = 1, max = 18, message = "precision must be between 1 and 18 digits"))]
    pub rsn_ratio_precision: u32,
    /// Token id used for the native currency of the config chain
    #[serde(default = "default_native_token_id")]
    pub native_token_id: String,
    /// Ratio-basis token of the rsn ratio
    #[validate(length(min = 1, message = "rsn token id cannot be empty"))]
    pub rsn_token_id: String,
    /// Chain holding the config record and the funding wallet
    #[serde(default = "default_config_chain")]
    pub config_chain: Chain,
}

/// Change thresholds (in percent) above which a schedule is republished
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerPercent {
    pub bridge_fee: u64,
    pub rsn_ratio: u64,
    #[serde(default)]
    pub network_fee: BTreeMap<Chain, u64>,
}

impl TriggerPercent {
    pub fn network_fee_for(&self, chain: Chain) -> u64 {
        self.network_fee.get(&chain).copied().unwrap_or(0)
    }
}

/// How the network fee of a chain is estimated
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NetworkFeeEstimate {
    /// Constant fee in whole native units; tokens may override it
    Fixed {
        #[serde(default)]
        amount: Option<Decimal>,
    },
    /// Fee rate per virtual byte times a standard transaction size
    FeeRate { tx_vsize: u64 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainSettings {
    /// Base URL of the height provider
    pub url: String,
    /// Token id whose price is the price of this chain's gas token
    pub reference_token: String,
    pub native_decimals: u32,
    /// Blocks an epoch must stay queryable after activation
    pub fee_guarantee_window: u64,
    pub network_fee: NetworkFeeEstimate,
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com".to_string()
}

fn default_coinmarketcap_url() -> String {
    "https://api.coinmarketcap.com/data-api/v3/cryptocurrency/market-pairs/latest".to_string()
}

fn default_spectrum_url() -> String {
    "https://api.spectrum.fi".to_string()
}

fn default_dexhunter_url() -> String {
    "https://api-us.dexhunterv3.app".to_string()
}

fn default_pool_reference_asset() -> String {
    "0".repeat(64)
}

fn default_pool_reference_token() -> String {
    "erg".to_string()
}

fn default_pair_reference_token() -> String {
    "ada".to_string()
}

fn default_pool_lookback_days() -> i64 {
    7
}

fn default_market_pair_limit() -> u32 {
    5
}

fn default_request_timeout_secs() -> u64 {
    8
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PriceSourceSettings {
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,
    #[serde(default = "default_coinmarketcap_url")]
    pub coinmarketcap_url: String,
    #[serde(default = "default_spectrum_url")]
    pub spectrum_url: String,
    #[serde(default = "default_dexhunter_url")]
    pub dexhunter_url: String,
    /// Asset id the AMM pools must pair the token against
    #[serde(default = "default_pool_reference_asset")]
    pub pool_reference_asset: String,
    /// Configured token carrying the USD price of the pool reference asset
    #[serde(default = "default_pool_reference_token")]
    pub pool_reference_token: String,
    #[serde(default = "default_pair_reference_token")]
    pub pair_reference_token: String,
    #[serde(default = "default_pool_lookback_days")]
    #[validate(range(min = 1, max = 30, message = "lookback must be between 1 and 30 days"))]
    pub pool_lookback_days: i64,
    #[serde(default = "default_market_pair_limit")]
    #[validate(range(min = 1, max = 100, message = "market pair limit must be between 1 and 100"))]
    pub market_pair_limit: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PriceSourceSettings {
    fn default() -> Self {
        Self {
            coingecko_url: default_coingecko_url(),
            coinmarketcap_url: default_coinmarketcap_url(),
            spectrum_url: default_spectrum_url(),
            dexhunter_url: default_dexhunter_url(),
            pool_reference_asset: default_pool_reference_asset(),
            pool_reference_token: default_pool_reference_token(),
            pair_reference_token: default_pair_reference_token(),
            pool_lookback_days: default_pool_lookback_days(),
            market_pair_limit: default_market_pair_limit(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl PriceSourceSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationSettings {
    pub discord_webhook_url: Option<String>,
}

/// REST key-value store used to publish run results
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub url: String,
    pub token: String,
}

impl AppConfig {
    /// Load configuration from the config file and `MINFEE__` environment variables
    pub fn load() -> AppResult<Self> {
        let path =
            std::env::var("MINFEE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path))
            .add_source(config::Environment::with_prefix("MINFEE").separator("__"))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Field validation plus the cross-field rules the job relies on
    pub fn check(&self) -> AppResult<()> {
        self.validate()?;

        if self.minimum_fee.fee_address == self.minimum_fee.config_address {
            return Err(AppError::Config(
                "Fee address and Minimum-fee config address cannot be equal".to_string(),
            ));
        }

        if !self.chains.contains_key(&self.minimum_fee.config_chain) {
            return Err(AppError::Config(format!(
                "config chain [{}] has no chain settings",
                self.minimum_fee.config_chain
            )));
        }

        let mut seen = HashSet::new();
        for token in &self.supported_tokens {
            if !seen.insert(token.token_id.as_str()) {
                return Err(AppError::Config(format!(
                    "token [{}] is configured more than once",
                    token.token_id
                )));
            }
        }

        for required in [
            &self.minimum_fee.native_token_id,
            &self.minimum_fee.rsn_token_id,
        ] {
            if self.token(required).is_none() {
                return Err(AppError::Config(format!(
                    "token [{}] is required but not found in supported tokens",
                    required
                )));
            }
        }

        for (chain, settings) in &self.chains {
            if self.token(&settings.reference_token).is_none() {
                return Err(AppError::Config(format!(
                    "reference token [{}] of chain [{}] is not a supported token",
                    settings.reference_token, chain
                )));
            }
        }

        for token in &self.supported_tokens {
            for chain in self.chains.keys() {
                if !token.fee.delays.contains_key(chain) {
                    return Err(AppError::Config(format!(
                        "token [{}] has no height delay for chain [{}]",
                        token.name, chain
                    )));
                }
            }
            if let Some(chain) = token.chains.keys().find(|c| !self.chains.contains_key(c)) {
                return Err(AppError::Config(format!(
                    "token [{}] trades on unconfigured chain [{}]",
                    token.name, chain
                )));
            }
            if let PriceBackend::DuplicateToken { token_id } = &token.price {
                if self.token(token_id).is_none() {
                    return Err(AppError::Config(format!(
                        "token [{}] duplicates the price of unknown token [{}]",
                        token.name, token_id
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn token(&self, token_id: &str) -> Option<&SupportedToken> {
        self.supported_tokens
            .iter()
            .find(|token| token.token_id == token_id)
    }

    pub fn configured_chains(&self) -> Vec<Chain> {
        self.chains.keys().copied().collect()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
