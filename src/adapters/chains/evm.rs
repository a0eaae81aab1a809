use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::adapters::traits::HeightProvider;
use crate::error::{AppResult, ChainError};
use crate::models::Chain;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<serde_json::Value>,
}

/// JSON-RPC height provider for EVM chains
pub struct EvmRpcClient {
    client: Client,
    url: String,
    chain: Chain,
}

impl EvmRpcClient {
    pub fn new(chain: Chain, url: &str, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.to_string(),
            chain,
        })
    }
}

fn parse_quantity(chain: Chain, value: &str) -> Result<u64, ChainError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16).map_err(|e| ChainError::Parse {
        chain,
        message: format!("block number [{}]: {}", value, e),
    })
}

#[async_trait]
impl HeightProvider for EvmRpcClient {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn current_height(&self) -> Result<u64, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "eth_blockNumber",
            "params": [],
            "id": 1
        });
        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ChainError::Request {
                chain: self.chain,
                message: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| ChainError::Parse {
                chain: self.chain,
                message: e.to_string(),
            })?;

        match (response.result, response.error) {
            (Some(result), _) => parse_quantity(self.chain, &result),
            (None, error) => Err(ChainError::Request {
                chain: self.chain,
                message: format!("rpc error: {:?}", error),
            }),
        }
    }
}
