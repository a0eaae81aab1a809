use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::ScheduleError;
use crate::models::Chain;
use crate::schedule::models::{ChainFeeParams, Epoch, FeeSchedule};

/// Marker for a value that is not defined for a chain in an epoch
pub const ABSENT: i64 = -1;

/// Columnar layout of a fee schedule as stored in config box registers.
/// Rows are epochs (oldest first), columns follow `chains`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRegisters {
    /// R4
    pub chains: Vec<String>,
    /// R5
    pub heights: Vec<Vec<i64>>,
    /// R6
    pub bridge_fees: Vec<Vec<i64>>,
    /// R7
    pub network_fees: Vec<Vec<i64>>,
    /// R8, `[ratio, divisor]` pairs
    pub rsn_ratios: Vec<Vec<[i64; 2]>>,
    /// R9
    pub fee_ratios: Vec<Vec<i64>>,
}

fn to_register(value: u128, field: &str) -> Result<i64, ScheduleError> {
    i64::try_from(value)
        .map_err(|_| ScheduleError::Encode(format!("{} [{}] exceeds a register long", field, value)))
}

fn from_register(value: i64, field: &str) -> Result<u128, ScheduleError> {
    u128::try_from(value)
        .map_err(|_| ScheduleError::Decode(format!("negative {} [{}]", field, value)))
}

impl ScheduleRegisters {
    pub fn encode(schedule: &FeeSchedule) -> Result<Self, ScheduleError> {
        let chains = schedule.chains();
        let mut registers = ScheduleRegisters {
            chains: chains.iter().map(|chain| chain.as_str().to_string()).collect(),
            heights: Vec::with_capacity(schedule.len()),
            bridge_fees: Vec::with_capacity(schedule.len()),
            network_fees: Vec::with_capacity(schedule.len()),
            rsn_ratios: Vec::with_capacity(schedule.len()),
            fee_ratios: Vec::with_capacity(schedule.len()),
        };

        for epoch in schedule.epochs() {
            let mut heights = Vec::with_capacity(chains.len());
            let mut bridge_fees = Vec::with_capacity(chains.len());
            let mut network_fees = Vec::with_capacity(chains.len());
            let mut rsn_ratios = Vec::with_capacity(chains.len());
            let mut fee_ratios = Vec::with_capacity(chains.len());

            for chain in &chains {
                let height = match epoch.height(*chain) {
                    Some(height) => to_register(height as u128, "height")?,
                    None => ABSENT,
                };
                heights.push(height);

                match epoch.params(*chain) {
                    Some(params) => {
                        bridge_fees.push(to_register(params.bridge_fee, "bridge fee")?);
                        network_fees.push(to_register(params.network_fee, "network fee")?);
                        rsn_ratios.push([
                            to_register(params.rsn_ratio, "rsn ratio")?,
                            to_register(params.rsn_ratio_divisor, "rsn ratio divisor")?,
                        ]);
                        fee_ratios.push(to_register(params.fee_ratio, "fee ratio")?);
                    }
                    None => {
                        bridge_fees.push(ABSENT);
                        network_fees.push(ABSENT);
                        rsn_ratios.push([ABSENT, ABSENT]);
                        fee_ratios.push(ABSENT);
                    }
                }
            }

            registers.heights.push(heights);
            registers.bridge_fees.push(bridge_fees);
            registers.network_fees.push(network_fees);
            registers.rsn_ratios.push(rsn_ratios);
            registers.fee_ratios.push(fee_ratios);
        }

        Ok(registers)
    }

    pub fn decode(&self) -> Result<FeeSchedule, ScheduleError> {
        let chains = self
            .chains
            .iter()
            .map(|id| Chain::from_str(id))
            .collect::<Result<Vec<Chain>, ScheduleError>>()?;
        if chains.iter().collect::<BTreeSet<_>>().len() != chains.len() {
            return Err(ScheduleError::Decode("duplicate chain identifier".to_string()));
        }

        let epochs = self.heights.len();
        if [
            self.bridge_fees.len(),
            self.network_fees.len(),
            self.rsn_ratios.len(),
            self.fee_ratios.len(),
        ]
        .iter()
        .any(|len| *len != epochs)
        {
            return Err(ScheduleError::Decode(
                "registers disagree on the number of epochs".to_string(),
            ));
        }

        let mut decoded = Vec::with_capacity(epochs);
        for row in 0..epochs {
            let widths = [
                self.heights[row].len(),
                self.bridge_fees[row].len(),
                self.network_fees[row].len(),
                self.rsn_ratios[row].len(),
                self.fee_ratios[row].len(),
            ];
            if widths.iter().any(|width| *width != chains.len()) {
                return Err(ScheduleError::Decode(format!(
                    "epoch {} does not have a value for every chain",
                    row
                )));
            }

            let mut epoch = Epoch::new();
            for (column, chain) in chains.iter().enumerate() {
                let height = self.heights[row][column];
                if height == ABSENT {
                    continue;
                }
                let height = u64::try_from(height)
                    .map_err(|_| ScheduleError::Decode(format!("negative height [{}]", height)))?;

                let bridge_fee = self.bridge_fees[row][column];
                if bridge_fee == ABSENT {
                    epoch.set_chain(*chain, height, None);
                    continue;
                }
                let [rsn_ratio, rsn_ratio_divisor] = self.rsn_ratios[row][column];
                epoch.set_chain(
                    *chain,
                    height,
                    Some(ChainFeeParams {
                        bridge_fee: from_register(bridge_fee, "bridge fee")?,
                        network_fee: from_register(self.network_fees[row][column], "network fee")?,
                        rsn_ratio: from_register(rsn_ratio, "rsn ratio")?,
                        rsn_ratio_divisor: from_register(rsn_ratio_divisor, "rsn ratio divisor")?,
                        fee_ratio: from_register(self.fee_ratios[row][column], "fee ratio")?,
                    }),
                );
            }
            decoded.push(epoch);
        }

        Ok(FeeSchedule::from_epochs(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::models::fixtures::{epoch, params};

    #[test]
    fn test_encode_uses_sentinel_for_inactive_and_missing_chains() {
        let schedule = FeeSchedule::from_epochs(vec![
            Epoch::new().with_chain(Chain::Ergo, 100, Some(params(10))),
            Epoch::new()
                .with_chain(Chain::Ergo, 200, Some(params(20)))
                .with_chain(Chain::Cardano, 3000, None),
        ]);

        let registers = ScheduleRegisters::encode(&schedule).unwrap();

        assert_eq!(registers.chains, vec!["cardano", "ergo"]);
        assert_eq!(registers.heights, vec![vec![ABSENT, 100], vec![3000, 200]]);
        assert_eq!(registers.bridge_fees, vec![vec![ABSENT, 10], vec![ABSENT, 20]]);
        assert_eq!(registers.rsn_ratios[1], vec![[ABSENT, ABSENT], [150_000, 1_000_000]]);
    }

    #[test]
    fn test_decode_restores_schedule() {
        let schedule = FeeSchedule::from_epochs(vec![
            epoch(100, 1000, 5),
            Epoch::new()
                .with_chain(Chain::Ergo, 200, Some(params(6)))
                .with_chain(Chain::Cardano, 2000, None),
        ]);

        let decoded = ScheduleRegisters::encode(&schedule).unwrap().decode().unwrap();
        assert_eq!(decoded, schedule);
    }

    #[test]
    fn test_decode_rejects_ragged_rows() {
        let registers = ScheduleRegisters {
            chains: vec!["ergo".to_string(), "cardano".to_string()],
            heights: vec![vec![1]],
            bridge_fees: vec![vec![1, 1]],
            network_fees: vec![vec![1, 1]],
            rsn_ratios: vec![vec![[1, 1], [1, 1]]],
            fee_ratios: vec![vec![1, 1]],
        };
        assert!(matches!(registers.decode(), Err(ScheduleError::Decode(_))));
    }

    #[test]
    fn test_encode_rejects_values_over_long_range() {
        let schedule = FeeSchedule::from_epochs(vec![
            Epoch::new().with_chain(Chain::Ergo, 1, Some(params(u128::from(u64::MAX)))),
        ]);
        assert!(matches!(
            ScheduleRegisters::encode(&schedule),
            Err(ScheduleError::Encode(_))
        ));
    }
}
