use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::TransactionError;
use crate::ledger::models::UnsignedTransaction;

/// Transaction payload handed to the signer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedTransaction {
    pub reduced_tx: String,
    pub sender: String,
    /// Input box ids in spending order
    pub inputs: Vec<String>,
}

pub trait TransactionEncoder: Send + Sync {
    fn encode(
        &self,
        tx: &UnsignedTransaction,
        sender: &str,
    ) -> Result<EncodedTransaction, TransactionError>;
}

/// Base64 of the JSON transaction
pub struct JsonTransactionEncoder;

impl TransactionEncoder for JsonTransactionEncoder {
    fn encode(
        &self,
        tx: &UnsignedTransaction,
        sender: &str,
    ) -> Result<EncodedTransaction, TransactionError> {
        let bytes = serde_json::to_vec(tx).map_err(|e| TransactionError::Encoding(e.to_string()))?;
        Ok(EncodedTransaction {
            reduced_tx: STANDARD.encode(bytes),
            sender: sender.to_string(),
            inputs: tx.inputs.iter().map(|input| input.box_id.clone()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::UtxoBox;

    #[test]
    fn test_encoded_payload_decodes_to_transaction() {
        let tx = UnsignedTransaction {
            inputs: vec![UtxoBox {
                box_id: "box-1".to_string(),
                address: "fee-address".to_string(),
                value: 2_000,
                assets: vec![],
                creation_height: 5,
                registers: None,
            }],
            outputs: vec![],
            fee: 2_000,
        };

        let encoded = JsonTransactionEncoder.encode(&tx, "fee-address").unwrap();
        assert_eq!(encoded.inputs, vec!["box-1"]);
        assert_eq!(encoded.sender, "fee-address");

        let decoded: UnsignedTransaction =
            serde_json::from_slice(&STANDARD.decode(encoded.reduced_tx).unwrap()).unwrap();
        assert_eq!(decoded, tx);
    }
}
