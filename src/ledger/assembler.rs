use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::adapters::traits::UtxoProvider;
use crate::config::MinimumFeeSettings;
use crate::error::{AppResult, TransactionError};
use crate::ledger::models::{
    AssetBalance, OutputCandidate, PendingOutput, Subtraction, UnsignedTransaction, UtxoBox,
};
use crate::ledger::selection::BoxSelector;
use crate::schedule::registers::ScheduleRegisters;

/// Builds the transaction replacing config boxes and paying their funding
pub struct TransactionAssembler {
    utxos: Arc<dyn UtxoProvider>,
    selector: Arc<dyn BoxSelector>,
    min_box_value: u64,
    tx_fee: u64,
}

impl TransactionAssembler {
    pub fn new(
        utxos: Arc<dyn UtxoProvider>,
        selector: Arc<dyn BoxSelector>,
        settings: &MinimumFeeSettings,
    ) -> Self {
        Self {
            utxos,
            selector,
            min_box_value: settings.min_box_value,
            tx_fee: settings.tx_fee,
        }
    }

    /// Assemble a balanced transaction writing every pending schedule.
    /// `preselected` boxes are always spent; the rest comes from `funding_address`.
    pub async fn assemble(
        &self,
        pending: &[PendingOutput],
        preselected: Vec<UtxoBox>,
        funding_address: &str,
        creation_height: u64,
    ) -> AppResult<UnsignedTransaction> {
        let mut outputs = Vec::new();
        for order in pending {
            let Some(schedule) = &order.schedule else {
                continue;
            };
            outputs.push(OutputCandidate {
                address: order.address.clone(),
                value: order.required.native,
                assets: order.required.token_amounts(),
                creation_height,
                registers: Some(ScheduleRegisters::encode(schedule)?),
            });
        }

        let order_total: AssetBalance = outputs.iter().map(OutputCandidate::balance).sum();
        let preselected_total: AssetBalance = preselected.iter().map(UtxoBox::balance).sum();
        let shortfall = order_total
            .subtract(&preselected_total, Subtraction::Floor)?
            .sum(&AssetBalance::native(self.min_box_value + self.tx_fee));
        debug!("Assets to cover from {}: {:?}", funding_address, shortfall);

        let spent: HashSet<String> = preselected.iter().map(|b| b.box_id.clone()).collect();
        let available: Vec<UtxoBox> = self
            .utxos
            .unspent_boxes(funding_address)
            .await?
            .into_iter()
            .filter(|b| !spent.contains(&b.box_id))
            .collect();

        let selection = self.selector.select(&shortfall, available);
        if !selection.covered {
            return Err(TransactionError::InsufficientFunds {
                native: shortfall.native,
                tokens: serde_json::to_string(&shortfall.tokens).unwrap_or_default(),
            }
            .into());
        }

        let mut inputs = preselected;
        inputs.extend(selection.boxes);

        let input_total: AssetBalance = inputs.iter().map(UtxoBox::balance).sum();
        let remaining = input_total
            .subtract(&order_total, Subtraction::Strict { minimum_native: self.tx_fee })
            .map_err(|e| TransactionError::InsufficientFunds {
                native: shortfall.native,
                tokens: e.to_string(),
            })?;
        let change = remaining.subtract(&AssetBalance::native(self.tx_fee), Subtraction::Floor)?;

        if !change.is_zero() {
            if change.native < self.min_box_value {
                return Err(TransactionError::InsufficientFunds {
                    native: self.min_box_value - change.native,
                    tokens: "change box is below the minimum box value".to_string(),
                }
                .into());
            }
            outputs.push(OutputCandidate {
                address: funding_address.to_string(),
                value: change.native,
                assets: change.token_amounts(),
                creation_height,
                registers: None,
            });
        }

        let tx = UnsignedTransaction {
            inputs,
            outputs,
            fee: self.tx_fee,
        };
        tx.check_balanced()?;

        info!(
            "🧾 Assembled transaction with {} inputs and {} outputs",
            tx.inputs.len(),
            tx.outputs.len()
        );
        Ok(tx)
    }
}
