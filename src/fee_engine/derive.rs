use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::{AppConfig, ChainSettings, NetworkFeeEstimate};
use crate::error::FeeError;
use crate::fee_engine::ratio::{pow10, rsn_ratio};
use crate::models::{Chain, SupportedToken};
use crate::schedule::models::{ChainFeeParams, Epoch};

/// Scale of the integer fee ratio
pub const FEE_RATIO_DIVISOR: u64 = 10_000;

/// Per-run inputs shared by every token
#[derive(Debug, Clone, Default)]
pub struct DerivationInputs {
    pub prices: BTreeMap<String, Decimal>,
    pub heights: BTreeMap<Chain, u64>,
    /// Fee rate per virtual byte, by confirmation target
    pub fee_rates: BTreeMap<u32, Decimal>,
}

impl DerivationInputs {
    fn price(&self, token_id: &str) -> Result<Decimal, FeeError> {
        self.prices
            .get(token_id)
            .copied()
            .ok_or_else(|| FeeError::MissingPrice(token_id.to_string()))
    }
}

fn ceil_to_u128(value: Decimal, what: &str) -> Result<u128, FeeError> {
    value
        .ceil()
        .to_u128()
        .ok_or_else(|| FeeError::Arithmetic(format!("{} [{}] is not a valid amount", what, value)))
}

fn checked(value: Option<Decimal>, what: &str) -> Result<Decimal, FeeError> {
    value.ok_or_else(|| FeeError::Arithmetic(format!("{} overflow", what)))
}

/// `ceil(bridgeFeeUsd / price * 10^decimals)`
pub fn bridge_fee(bridge_fee_usd: Decimal, price: Decimal, decimals: u32) -> Result<u128, FeeError> {
    let units = checked(bridge_fee_usd.checked_div(price), "bridge fee")?;
    ceil_to_u128(checked(units.checked_mul(pow10(decimals)?), "bridge fee")?, "bridge fee")
}

/// `ceil(estimate * referencePrice * 10^decimals / price)`
pub fn network_fee(
    estimate: Decimal,
    reference_price: Decimal,
    price: Decimal,
    decimals: u32,
) -> Result<u128, FeeError> {
    let usd = checked(estimate.checked_mul(reference_price), "network fee")?;
    let scaled = checked(usd.checked_mul(pow10(decimals)?), "network fee")?;
    ceil_to_u128(checked(scaled.checked_div(price), "network fee")?, "network fee")
}

/// `floor(ratio * FEE_RATIO_DIVISOR)`
pub fn fee_ratio(ratio_float: Decimal) -> Result<u128, FeeError> {
    let scaled = checked(
        ratio_float.checked_mul(Decimal::from(FEE_RATIO_DIVISOR)),
        "fee ratio",
    )?;
    scaled
        .floor()
        .to_u128()
        .ok_or_else(|| FeeError::Arithmetic(format!("fee ratio [{}] is negative", ratio_float)))
}

/// Derives the epoch a token would need at current prices
pub struct FeeEngine {
    config: Arc<AppConfig>,
}

impl FeeEngine {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    /// Network fee of one transaction on `chain`, in whole native units
    fn chain_fee_estimate(
        &self,
        chain: Chain,
        settings: &ChainSettings,
        token: &SupportedToken,
        inputs: &DerivationInputs,
    ) -> Result<Decimal, FeeError> {
        match &settings.network_fee {
            NetworkFeeEstimate::Fixed { amount } => token
                .fee
                .network_fees
                .get(&chain)
                .copied()
                .or(*amount)
                .ok_or_else(|| FeeError::MissingNetworkFee {
                    chain,
                    token: token.token_id.clone(),
                }),
            NetworkFeeEstimate::FeeRate { tx_vsize } => {
                let target = token.fee.fee_rate_confirmation;
                let rate = inputs
                    .fee_rates
                    .get(&target)
                    .copied()
                    .ok_or(FeeError::MissingFeeRate(target))?;
                let total = checked(rate.checked_mul(Decimal::from(*tx_vsize)), "fee rate")?;
                checked(
                    total.checked_div(pow10(settings.native_decimals)?),
                    "fee rate",
                )
            }
        }
    }

    /// Build a new epoch for `token`. Every configured chain gets an activation
    /// height; only chains the token trades on get fee parameters.
    pub fn derive(&self, token: &SupportedToken, inputs: &DerivationInputs) -> Result<Epoch, FeeError> {
        let price = inputs.price(&token.token_id)?;
        if price <= Decimal::ZERO {
            return Err(FeeError::Arithmetic(format!(
                "price of [{}] is not positive",
                token.token_id
            )));
        }

        let settings = &self.config.minimum_fee;
        let rsn = self
            .config
            .token(&settings.rsn_token_id)
            .ok_or_else(|| FeeError::MissingPrice(settings.rsn_token_id.clone()))?;
        let rsn_price = inputs.price(&rsn.token_id)?;

        let bridge_fee = bridge_fee(token.fee.bridge_fee_usd, price, token.decimals)?;
        let ratio = rsn_ratio(
            &token.token_id,
            price,
            token.decimals,
            rsn_price,
            rsn.decimals,
            settings.rsn_ratio_precision,
        )?;
        let fee_ratio = fee_ratio(token.fee.fee_ratio_float)?;

        let mut epoch = Epoch::new();
        for (chain, chain_settings) in &self.config.chains {
            let current = inputs
                .heights
                .get(chain)
                .copied()
                .ok_or(FeeError::MissingHeight(*chain))?;
            let delay = token.fee.delays.get(chain).copied().unwrap_or_default();
            let height = current.saturating_add(delay);

            if !token.trades_on(*chain) {
                epoch.set_chain(*chain, height, None);
                continue;
            }

            let estimate = self.chain_fee_estimate(*chain, chain_settings, token, inputs)?;
            let reference_price = inputs.price(&chain_settings.reference_token)?;
            let params = ChainFeeParams {
                bridge_fee,
                network_fee: network_fee(estimate, reference_price, price, token.decimals)?,
                rsn_ratio: ratio.ratio,
                rsn_ratio_divisor: ratio.divisor,
                fee_ratio,
            };
            debug!(
                "[{}] on {} from height {}: {:?}",
                token.name, chain, height, params
            );
            epoch.set_chain(*chain, height, Some(params));
        }

        Ok(epoch)
    }
}
