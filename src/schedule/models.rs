use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::ledger::models::UtxoBox;
use crate::models::Chain;

/// Fee parameters of one chain within an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainFeeParams {
    /// In token base units
    pub bridge_fee: u128,
    /// In token base units
    pub network_fee: u128,
    pub rsn_ratio: u128,
    pub rsn_ratio_divisor: u128,
    /// Scaled by `FEE_RATIO_DIVISOR`
    pub fee_ratio: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainFee {
    Active(ChainFeeParams),
    /// Token is not bridged on this chain as of the epoch
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Height after which the entry takes effect on its chain
    pub height: u64,
    pub fee: ChainFee,
}

impl ChainEntry {
    pub fn params(&self) -> Option<&ChainFeeParams> {
        match &self.fee {
            ChainFee::Active(params) => Some(params),
            ChainFee::Inactive => None,
        }
    }
}

/// One schedule entry, keyed by chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    entries: BTreeMap<Chain, ChainEntry>,
}

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_chain(&mut self, chain: Chain, height: u64, params: Option<ChainFeeParams>) {
        let fee = match params {
            Some(params) => ChainFee::Active(params),
            None => ChainFee::Inactive,
        };
        self.entries.insert(chain, ChainEntry { height, fee });
    }

    #[cfg(test)]
    pub fn with_chain(mut self, chain: Chain, height: u64, params: Option<ChainFeeParams>) -> Self {
        self.set_chain(chain, height, params);
        self
    }

    pub fn entries(&self) -> &BTreeMap<Chain, ChainEntry> {
        &self.entries
    }

    pub fn height(&self, chain: Chain) -> Option<u64> {
        self.entries.get(&chain).map(|entry| entry.height)
    }

    pub fn params(&self, chain: Chain) -> Option<&ChainFeeParams> {
        self.entries.get(&chain).and_then(|entry| entry.params())
    }

    /// Chains this epoch defines fee parameters for
    pub fn active_chains(&self) -> BTreeSet<Chain> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.params().is_some())
            .map(|(chain, _)| *chain)
            .collect()
    }

    pub fn same_heights(&self, other: &Epoch) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(chain, entry)| other.height(*chain) == Some(entry.height))
    }
}

/// Epochs of one token, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    epochs: Vec<Epoch>,
}

impl FeeSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_epochs(epochs: Vec<Epoch>) -> Self {
        Self { epochs }
    }

    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&Epoch> {
        self.epochs.last()
    }

    /// Append a new newest epoch. A retained epoch with exactly the same
    /// heights is superseded so no two epochs share all heights.
    pub fn append(&mut self, epoch: Epoch) {
        self.epochs.retain(|existing| !existing.same_heights(&epoch));
        self.epochs.push(epoch);
    }

    /// Chains referenced by any epoch, in register order
    pub fn chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self
            .epochs
            .iter()
            .flat_map(|epoch| epoch.entries.keys().copied())
            .collect::<BTreeSet<Chain>>()
            .into_iter()
            .collect();
        chains.sort_by_key(|chain| chain.as_str());
        chains
    }
}

/// Schedule currently committed on chain, together with the box holding it
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedSchedule {
    pub config_box: UtxoBox,
    pub schedule: FeeSchedule,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn params(bridge_fee: u128) -> ChainFeeParams {
        ChainFeeParams {
            bridge_fee,
            network_fee: 1_000,
            rsn_ratio: 150_000,
            rsn_ratio_divisor: 1_000_000,
            fee_ratio: 50,
        }
    }

    /// Epoch active on ergo and cardano at the given heights
    pub fn epoch(ergo: u64, cardano: u64, bridge_fee: u128) -> Epoch {
        Epoch::new()
            .with_chain(Chain::Ergo, ergo, Some(params(bridge_fee)))
            .with_chain(Chain::Cardano, cardano, Some(params(bridge_fee)))
    }
}
