use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::adapters::traits::HeightProvider;
use crate::error::{AppResult, ChainError};
use crate::models::Chain;

#[derive(Debug, Deserialize)]
struct Tip {
    block_no: Option<u64>,
}

/// Koios REST client
pub struct KoiosClient {
    client: Client,
    base_url: String,
}

impl KoiosClient {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl HeightProvider for KoiosClient {
    fn chain(&self) -> Chain {
        Chain::Cardano
    }

    async fn current_height(&self) -> Result<u64, ChainError> {
        let url = format!("{}/tip", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ChainError::Request {
                chain: Chain::Cardano,
                message: e.to_string(),
            })?;
        let tips: Vec<Tip> = response.json().await.map_err(|e| ChainError::Parse {
            chain: Chain::Cardano,
            message: e.to_string(),
        })?;

        tips.first()
            .and_then(|tip| tip.block_no)
            .ok_or_else(|| ChainError::Parse {
                chain: Chain::Cardano,
                message: "tip has no block number".to_string(),
            })
    }
}
