use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Add;

use crate::error::TransactionError;
use crate::schedule::models::FeeSchedule;
use crate::schedule::registers::ScheduleRegisters;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub token_id: String,
    pub amount: u64,
}

/// Native amount plus a multiset of tokens
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub native: u64,
    pub tokens: BTreeMap<String, u64>,
}

/// How `AssetBalance::subtract` treats a shortfall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtraction {
    /// Fail unless `minimum_native` is left over and every token covers the amount
    Strict { minimum_native: u64 },
    /// Clamp every shortfall to zero
    Floor,
}

impl AssetBalance {
    pub fn native(amount: u64) -> Self {
        Self {
            native: amount,
            tokens: BTreeMap::new(),
        }
    }

    pub fn with_token(mut self, token_id: &str, amount: u64) -> Self {
        if amount > 0 {
            *self.tokens.entry(token_id.to_string()).or_default() += amount;
        }
        self
    }

    pub fn is_zero(&self) -> bool {
        self.native == 0 && self.tokens.values().all(|amount| *amount == 0)
    }

    pub fn token(&self, token_id: &str) -> u64 {
        self.tokens.get(token_id).copied().unwrap_or(0)
    }

    pub fn token_amounts(&self) -> Vec<TokenAmount> {
        self.tokens
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|(token_id, amount)| TokenAmount {
                token_id: token_id.clone(),
                amount: *amount,
            })
            .collect()
    }

    pub fn sum(&self, other: &AssetBalance) -> AssetBalance {
        let mut result = self.clone();
        result.native = result.native.saturating_add(other.native);
        for (token_id, amount) in &other.tokens {
            let entry = result.tokens.entry(token_id.clone()).or_default();
            *entry = entry.saturating_add(*amount);
        }
        result
    }

    pub fn subtract(
        &self,
        other: &AssetBalance,
        mode: Subtraction,
    ) -> Result<AssetBalance, TransactionError> {
        let native = match mode {
            Subtraction::Floor => self.native.saturating_sub(other.native),
            Subtraction::Strict { minimum_native } => {
                let required = other.native.saturating_add(minimum_native);
                if self.native < required {
                    return Err(TransactionError::BalanceUnderflow {
                        asset: "native".to_string(),
                        available: self.native,
                        required,
                    });
                }
                self.native - other.native
            }
        };

        let mut tokens = self.tokens.clone();
        for (token_id, amount) in &other.tokens {
            let available = self.token(token_id);
            if available < *amount && matches!(mode, Subtraction::Strict { .. }) {
                return Err(TransactionError::BalanceUnderflow {
                    asset: token_id.clone(),
                    available,
                    required: *amount,
                });
            }
            let remaining = available.saturating_sub(*amount);
            if remaining == 0 {
                tokens.remove(token_id);
            } else {
                tokens.insert(token_id.clone(), remaining);
            }
        }
        tokens.retain(|_, amount| *amount > 0);

        Ok(AssetBalance { native, tokens })
    }
}

impl Add for AssetBalance {
    type Output = AssetBalance;

    fn add(self, other: AssetBalance) -> AssetBalance {
        self.sum(&other)
    }
}

impl std::iter::Sum for AssetBalance {
    fn sum<I: Iterator<Item = AssetBalance>>(iter: I) -> AssetBalance {
        iter.fold(AssetBalance::default(), |acc, balance| acc + balance)
    }
}

/// Unspent output on the config chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoBox {
    pub box_id: String,
    pub address: String,
    pub value: u64,
    pub assets: Vec<TokenAmount>,
    pub creation_height: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registers: Option<ScheduleRegisters>,
}

impl UtxoBox {
    pub fn balance(&self) -> AssetBalance {
        self.assets
            .iter()
            .fold(AssetBalance::native(self.value), |balance, asset| {
                balance.with_token(&asset.token_id, asset.amount)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCandidate {
    pub address: String,
    pub value: u64,
    pub assets: Vec<TokenAmount>,
    pub creation_height: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registers: Option<ScheduleRegisters>,
}

impl OutputCandidate {
    pub fn balance(&self) -> AssetBalance {
        self.assets
            .iter()
            .fold(AssetBalance::native(self.value), |balance, asset| {
                balance.with_token(&asset.token_id, asset.amount)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub inputs: Vec<UtxoBox>,
    pub outputs: Vec<OutputCandidate>,
    pub fee: u64,
}

impl UnsignedTransaction {
    pub fn input_balance(&self) -> AssetBalance {
        self.inputs.iter().map(UtxoBox::balance).sum()
    }

    pub fn output_balance(&self) -> AssetBalance {
        self.outputs.iter().map(OutputCandidate::balance).sum()
    }

    /// Inputs equal outputs plus fee for the native asset and every token
    pub fn check_balanced(&self) -> Result<(), TransactionError> {
        let inputs = self.input_balance();
        let spent = self.output_balance().sum(&AssetBalance::native(self.fee));
        if inputs != spent {
            return Err(TransactionError::Imbalanced(format!(
                "inputs {:?} != outputs plus fee {:?}",
                inputs, spent
            )));
        }
        Ok(())
    }
}

/// Config output a token needs; no schedule means nothing to write
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOutput {
    pub token_id: String,
    pub address: String,
    pub required: AssetBalance,
    pub schedule: Option<FeeSchedule>,
}
