use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapters::traits::{ConfigBoxReader, HeightProvider, UtxoProvider};
use crate::error::{AppResult, ChainError, ScheduleError};
use crate::ledger::models::{TokenAmount, UtxoBox};
use crate::models::Chain;
use crate::schedule::models::CommittedSchedule;
use crate::schedule::registers::ScheduleRegisters;

const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct NetworkState {
    height: u64,
}

#[derive(Debug, Deserialize)]
struct BoxPage {
    #[serde(default)]
    items: Vec<ExplorerBox>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerAsset {
    token_id: String,
    amount: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerRegister {
    rendered_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerBox {
    box_id: String,
    address: String,
    value: u64,
    creation_height: u64,
    #[serde(default)]
    assets: Vec<ExplorerAsset>,
    #[serde(default)]
    additional_registers: HashMap<String, ExplorerRegister>,
}

impl ExplorerBox {
    fn register(&self, id: &str) -> Result<&str, ScheduleError> {
        self.additional_registers
            .get(id)
            .map(|r| r.rendered_value.as_str())
            .ok_or_else(|| ScheduleError::Decode(format!("box {} has no {}", self.box_id, id)))
    }

    fn schedule_registers(&self) -> Result<ScheduleRegisters, ScheduleError> {
        Ok(ScheduleRegisters {
            chains: parse_chain_ids(self.register("R4")?)?,
            heights: parse_rendered(self.register("R5")?, "R5")?,
            bridge_fees: parse_rendered(self.register("R6")?, "R6")?,
            network_fees: parse_rendered(self.register("R7")?, "R7")?,
            rsn_ratios: parse_rendered(self.register("R8")?, "R8")?,
            fee_ratios: parse_rendered(self.register("R9")?, "R9")?,
        })
    }

    fn into_utxo(self, registers: Option<ScheduleRegisters>) -> UtxoBox {
        UtxoBox {
            box_id: self.box_id,
            address: self.address,
            value: self.value,
            assets: self
                .assets
                .into_iter()
                .map(|asset| TokenAmount {
                    token_id: asset.token_id,
                    amount: asset.amount,
                })
                .collect(),
            creation_height: self.creation_height,
            registers,
        }
    }
}

/// `[6572676f,63617264616e6f]` into chain identifiers
fn parse_chain_ids(rendered: &str) -> Result<Vec<String>, ScheduleError> {
    let inner = rendered.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|item| {
            let bytes = hex::decode(item.trim())
                .map_err(|e| ScheduleError::Decode(format!("R4 item [{}]: {}", item, e)))?;
            String::from_utf8(bytes).map_err(|e| ScheduleError::Decode(format!("R4: {}", e)))
        })
        .collect()
}

fn parse_rendered<T: serde::de::DeserializeOwned>(rendered: &str, id: &str) -> Result<T, ScheduleError> {
    serde_json::from_str(rendered).map_err(|e| ScheduleError::Decode(format!("{}: {}", id, e)))
}

/// Ergo explorer API client
pub struct ErgoExplorerClient {
    client: Client,
    base_url: String,
    nft: String,
    config_address: String,
    native_token_id: String,
}

impl ErgoExplorerClient {
    pub fn new(
        base_url: &str,
        nft: &str,
        config_address: &str,
        native_token_id: &str,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            nft: nft.to_string(),
            config_address: config_address.to_string(),
            native_token_id: native_token_id.to_string(),
        })
    }

    fn request_error(e: impl ToString) -> ChainError {
        ChainError::Request {
            chain: Chain::Ergo,
            message: e.to_string(),
        }
    }

    async fn box_page(&self, path: &str, offset: usize) -> Result<Vec<ExplorerBox>, ChainError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(&[("offset", offset), ("limit", PAGE_SIZE)])
            .send()
            .await
            .map_err(Self::request_error)?
            .error_for_status()
            .map_err(Self::request_error)?;
        let page: BoxPage = response.json().await.map_err(|e| ChainError::Parse {
            chain: Chain::Ergo,
            message: e.to_string(),
        })?;
        Ok(page.items)
    }

    async fn all_boxes(&self, path: &str) -> Result<Vec<ExplorerBox>, ChainError> {
        let mut boxes = Vec::new();
        loop {
            let page = self.box_page(path, boxes.len()).await?;
            let done = page.len() < PAGE_SIZE;
            boxes.extend(page);
            if done {
                return Ok(boxes);
            }
        }
    }

    /// Config box of a token sits at the config address and holds exactly
    /// one NFT unit plus, for non-native tokens, the token as its second asset
    fn is_config_box(&self, candidate: &ExplorerBox, config_token_id: &str) -> bool {
        if candidate.address != self.config_address {
            return false;
        }
        let holds_token = match candidate.assets.len() {
            1 => config_token_id == self.native_token_id,
            2 => candidate.assets[1].token_id == config_token_id,
            _ => false,
        };
        holds_token && candidate.assets[0].token_id == self.nft && candidate.assets[0].amount == 1
    }

    fn select_config_box(&self, boxes: Vec<ExplorerBox>, config_token_id: &str) -> Option<ExplorerBox> {
        boxes
            .into_iter()
            .find(|candidate| self.is_config_box(candidate, config_token_id))
    }
}

#[async_trait]
impl HeightProvider for ErgoExplorerClient {
    fn chain(&self) -> Chain {
        Chain::Ergo
    }

    async fn current_height(&self) -> Result<u64, ChainError> {
        let url = format!("{}/api/v1/networkState", self.base_url);
        let state: NetworkState = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::request_error)?
            .error_for_status()
            .map_err(Self::request_error)?
            .json()
            .await
            .map_err(|e| ChainError::Parse {
                chain: Chain::Ergo,
                message: e.to_string(),
            })?;
        Ok(state.height)
    }
}

#[async_trait]
impl UtxoProvider for ErgoExplorerClient {
    async fn unspent_boxes(&self, address: &str) -> Result<Vec<UtxoBox>, ChainError> {
        let boxes = self
            .all_boxes(&format!("/api/v1/boxes/unspent/byAddress/{}", address))
            .await?;
        debug!("Fetched {} unspent boxes of {}", boxes.len(), address);
        Ok(boxes.into_iter().map(|b| b.into_utxo(None)).collect())
    }
}

#[async_trait]
impl ConfigBoxReader for ErgoExplorerClient {
    async fn fetch_schedule(
        &self,
        config_token_id: &str,
    ) -> Result<Option<CommittedSchedule>, ScheduleError> {
        let boxes = self
            .all_boxes(&format!("/api/v1/boxes/unspent/byTokenId/{}", self.nft))
            .await
            .map_err(|e| ScheduleError::ScheduleFetchFailed {
                token: config_token_id.to_string(),
                reason: e.to_string(),
            })?;

        let Some(config_box) = self.select_config_box(boxes, config_token_id) else {
            warn!("⚠️  Found no config box for token [{}]", config_token_id);
            return Ok(None);
        };

        let registers = config_box.schedule_registers()?;
        let schedule = registers.decode()?;
        Ok(Some(CommittedSchedule {
            config_box: config_box.into_utxo(Some(registers)),
            schedule,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ErgoExplorerClient {
        ErgoExplorerClient::new(
            "http://localhost",
            "nft",
            "config-address",
            "erg",
            Duration::from_secs(1),
        )
        .unwrap()
    }

    fn explorer_box(assets: &[(&str, u64)]) -> ExplorerBox {
        let body = serde_json::json!({
            "boxId": "b1",
            "address": "config-address",
            "value": 200000,
            "creationHeight": 1000,
            "assets": assets.iter().map(|(id, amount)| serde_json::json!({"tokenId": id, "amount": amount})).collect::<Vec<_>>(),
            "additionalRegisters": {
                "R4": {"serializedValue": "", "sigmaType": "Coll[Coll[SByte]]", "renderedValue": "[63617264616e6f,6572676f]"},
                "R5": {"renderedValue": "[[-1,100],[3000,200]]"},
                "R6": {"renderedValue": "[[-1,10],[-1,20]]"},
                "R7": {"renderedValue": "[[-1,1],[-1,2]]"},
                "R8": {"renderedValue": "[[[-1,-1],[15,100]],[[-1,-1],[16,100]]]"},
                "R9": {"renderedValue": "[[-1,50],[-1,50]]"}
            }
        });
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_rendered_registers_decode_into_schedule() {
        let registers = explorer_box(&[("nft", 1)]).schedule_registers().unwrap();
        assert_eq!(registers.chains, vec!["cardano", "ergo"]);

        let schedule = registers.decode().unwrap();
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.epochs()[0].height(Chain::Cardano), None);
        assert_eq!(schedule.epochs()[1].height(Chain::Cardano), Some(3000));
        assert!(schedule.epochs()[1].params(Chain::Cardano).is_none());
        assert_eq!(schedule.epochs()[1].params(Chain::Ergo).unwrap().rsn_ratio, 16);
    }

    #[test]
    fn test_config_box_matching() {
        let client = client();
        assert!(client.is_config_box(&explorer_box(&[("nft", 1)]), "erg"));
        assert!(!client.is_config_box(&explorer_box(&[("nft", 1)]), "tkn"));
        assert!(client.is_config_box(&explorer_box(&[("nft", 1), ("tkn", 1)]), "tkn"));
        assert!(!client.is_config_box(&explorer_box(&[("nft", 2), ("tkn", 1)]), "tkn"));
        assert!(!client.is_config_box(&explorer_box(&[("other", 1), ("tkn", 1)]), "tkn"));
    }

    #[test]
    fn test_nft_box_outside_config_address_is_skipped() {
        let client = client();
        let mut stray = explorer_box(&[("nft", 1), ("tkn", 1)]);
        stray.box_id = "stray".to_string();
        stray.address = "someone-else".to_string();
        let mut config_box = explorer_box(&[("nft", 1), ("tkn", 1)]);
        config_box.box_id = "config".to_string();

        let selected = client
            .select_config_box(vec![stray, config_box], "tkn")
            .unwrap();
        assert_eq!(selected.box_id, "config");
        assert_eq!(selected.address, "config-address");

        let mut stray = explorer_box(&[("nft", 1), ("tkn", 1)]);
        stray.address = "someone-else".to_string();
        assert!(client.select_config_box(vec![stray], "tkn").is_none());
    }

    #[test]
    fn test_missing_register_is_a_decode_error() {
        let mut candidate = explorer_box(&[("nft", 1)]);
        candidate.additional_registers.remove("R7");
        assert!(matches!(
            candidate.schedule_registers(),
            Err(ScheduleError::Decode(_))
        ));
    }
}
