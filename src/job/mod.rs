pub mod scheduler;

pub use scheduler::JobScheduler;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::ChainRegistry;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult, FeeError, TransactionError};
use crate::fee_engine::{DerivationInputs, FeeEngine};
use crate::ledger::{AssetBalance, EncodedTransaction, PendingOutput, TransactionAssembler, TransactionEncoder};
use crate::models::SupportedToken;
use crate::notification::NotificationSink;
use crate::pricing::PriceResolver;
use crate::schedule::{FeeSchedule, ReconcileOutcome, ScheduleReconciler};
use crate::store::ResultStore;

/// Outcome of one run of the job
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub prices: BTreeMap<String, Decimal>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    /// Tokens skipped this run, with the reason
    pub failed: Vec<(String, String)>,
    pub transaction: Option<EncodedTransaction>,
}

/// Everything one run needs, wired once at startup
pub struct FeeJob {
    pub config: Arc<AppConfig>,
    pub resolver: PriceResolver,
    pub chains: Arc<ChainRegistry>,
    pub engine: FeeEngine,
    pub reconciler: ScheduleReconciler,
    pub assembler: TransactionAssembler,
    pub encoder: Arc<dyn TransactionEncoder>,
    pub notifier: Arc<dyn NotificationSink>,
    pub store: ResultStore,
}

impl FeeJob {
    /// Run one tick: price, derive, reconcile and build the update transaction
    pub async fn run(&self) -> AppResult<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("🚀 Starting Job [{}]", run_id);

        let settings = &self.config.minimum_fee;
        if settings.fee_address == settings.config_address {
            return Err(AppError::Config(
                "Fee address and Minimum-fee config address cannot be equal".to_string(),
            ));
        }

        let tokens = &self.config.supported_tokens;
        let prices = self.resolver.resolve(tokens).await?;
        prices.require(&settings.native_token_id)?;
        prices.require(&settings.rsn_token_id)?;

        let configured = self.config.configured_chains();
        let (heights, fee_rates) = tokio::join!(
            self.chains.current_heights(&configured),
            self.chains.fee_rates()
        );
        let heights = heights?;
        let fee_rates = fee_rates.unwrap_or_else(|e| {
            warn!("⚠️  Fee rates are not available: {}", e);
            BTreeMap::new()
        });
        debug!("Current heights: {:?}", heights);

        let inputs = DerivationInputs {
            prices: prices.prices.clone(),
            heights,
            fee_rates,
        };

        info!("Generating new config for {} tokens", tokens.len());
        let outcomes = join_all(tokens.iter().map(|token| self.process_token(token, &inputs))).await;

        let mut report = RunReport {
            run_id,
            started_at,
            prices: prices.prices.clone(),
            updated: Vec::new(),
            unchanged: Vec::new(),
            failed: Vec::new(),
            transaction: None,
        };
        let mut bridge_fee_differences = BTreeMap::new();
        let mut pending = Vec::new();
        let mut preselected = Vec::new();

        for (token, outcome) in tokens.iter().zip(outcomes) {
            match outcome {
                Ok(ReconcileOutcome::NoUpdate { differences }) => {
                    bridge_fee_differences.insert(token.token_id.clone(), differences.bridge_fee);
                    report.unchanged.push(token.token_id.clone());
                }
                Ok(ReconcileOutcome::UpdatedSchedule {
                    schedule,
                    differences,
                    current_box,
                    ..
                }) => {
                    if let Some(differences) = differences {
                        bridge_fee_differences.insert(token.token_id.clone(), differences.bridge_fee);
                    }
                    match current_box {
                        Some(current) => preselected.push(current),
                        None => warn!("found no current config box for token [{}]", token.token_id),
                    }
                    pending.push(self.pending_output(token, schedule));
                    report.updated.push(token.token_id.clone());
                }
                Err(e) => {
                    warn!("⚠️  Token [{}] is skipped in this run: {}", token.name, e);
                    report.failed.push((token.token_id.clone(), e.to_string()));
                }
            }
        }

        if report.updated.is_empty() {
            info!("No config need update");
            self.store.flush().await;
            info!("Flushed store");
            return Ok(report);
        }

        info!("updating config for tokens [{}]", report.updated.join(", "));
        let creation_height = inputs
            .heights
            .get(&settings.config_chain)
            .copied()
            .ok_or(FeeError::MissingHeight(settings.config_chain))?;
        let tx = self
            .assembler
            .assemble(&pending, preselected, &settings.fee_address, creation_height)
            .await?;
        let encoded = self.encoder.encode(&tx, &settings.fee_address)?;
        let tx_json = serde_json::to_string(&encoded)
            .map_err(|e| TransactionError::Encoding(e.to_string()))?;
        info!("Transaction to update minimum-fee config box generated");

        self.notify_update(&report, &bridge_fee_differences).await;

        tokio::join!(
            self.store.save_prices(&report.prices),
            self.store.save_tx(&tx_json),
            self.store.save_tokens_config(tokens)
        );
        info!("Saved data in the store");

        report.transaction = Some(encoded);
        info!("✓ Job done");
        Ok(report)
    }

    async fn process_token(
        &self,
        token: &SupportedToken,
        inputs: &DerivationInputs,
    ) -> AppResult<ReconcileOutcome> {
        let derived = self.engine.derive(token, inputs)?;
        let outcome = self
            .reconciler
            .reconcile(token, derived, &inputs.heights)
            .await?;
        Ok(outcome)
    }

    /// Config box for `token`: minimum value, the config NFT and one unit of
    /// the token unless it is the native currency
    fn pending_output(&self, token: &SupportedToken, schedule: FeeSchedule) -> PendingOutput {
        let settings = &self.config.minimum_fee;
        let mut required = AssetBalance::native(settings.min_box_value).with_token(&settings.nft, 1);
        if token.token_id != settings.native_token_id {
            required = required.with_token(&token.config_token_id, 1);
        }
        PendingOutput {
            token_id: token.token_id.clone(),
            address: settings.config_address.clone(),
            required,
            schedule: Some(schedule),
        }
    }

    async fn notify_update(&self, report: &RunReport, differences: &BTreeMap<String, u128>) {
        self.notifier
            .send("# MinimumFee configs need to be updated")
            .await;

        let prices: Vec<String> = self
            .config
            .supported_tokens
            .iter()
            .filter_map(|token| {
                let price = report.prices.get(&token.token_id)?;
                let change = differences
                    .get(&token.token_id)
                    .map(|d| format!(" ({}% change)", d))
                    .unwrap_or_default();
                Some(format!("{} => {}${}", token.name, price, change))
            })
            .collect();
        self.notifier
            .send(&format!("## Prices\n```json\n{}\n```", prices.join("\n")))
            .await;

        let changed: Vec<String> = report
            .updated
            .iter()
            .filter_map(|token_id| self.config.token(token_id))
            .map(|token| format!("- {} [`{}`]", token.name, token.config_token_id))
            .collect();
        self.notifier
            .send(&format!("## Changed Tokens\n{}", changed.join("\n")))
            .await;

        if !report.failed.is_empty() {
            let failed: Vec<String> = report
                .failed
                .iter()
                .map(|(token_id, reason)| format!("- `{}`: {}", token_id, reason))
                .collect();
            self.notifier
                .send(&format!("## Skipped Tokens\n{}", failed.join("\n")))
                .await;
        }
    }
}
