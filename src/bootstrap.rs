use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::{
    adapters::{
        chains::{ErgoExplorerClient, EsploraClient, EvmRpcClient, KoiosClient},
        traits::HeightProvider,
        ChainRegistry,
    },
    config::{AppConfig, ChainSettings},
    error::{AppError, AppResult},
    fee_engine::FeeEngine,
    job::{FeeJob, JobScheduler},
    ledger::{GreedySelector, JsonTransactionEncoder, TransactionAssembler},
    models::Chain,
    notification,
    pricing::{sources_from_settings, PriceResolver},
    schedule::ScheduleReconciler,
    store::ResultStore,
};

/// Wire concrete network clients into the job and its scheduler
pub fn initialize_scheduler(config: AppConfig) -> AppResult<JobScheduler> {
    info!("Initializing job components ...");
    let config = Arc::new(config);
    let timeout = config.price_sources.request_timeout();
    let settings = &config.minimum_fee;

    if settings.config_chain != Chain::Ergo {
        return Err(AppError::Config(format!(
            "config records are only supported on ergo, not [{}]",
            settings.config_chain
        )));
    }
    let ergo_settings = chain_settings(&config, Chain::Ergo)?;
    let explorer = Arc::new(ErgoExplorerClient::new(
        &ergo_settings.url,
        &settings.nft,
        &settings.config_address,
        &settings.native_token_id,
        timeout,
    )?);
    info!("✅ Ergo explorer client initialized: {}", ergo_settings.url);

    info!("⚙️  Initializing chain height providers...");
    let mut registry = ChainRegistry::new();
    for (chain, chain_settings) in &config.chains {
        let provider: Arc<dyn HeightProvider> = match chain {
            Chain::Ergo => explorer.clone(),
            Chain::Cardano => Arc::new(KoiosClient::new(&chain_settings.url, timeout)?),
            Chain::Bitcoin => {
                let esplora = Arc::new(EsploraClient::new(&chain_settings.url, timeout)?);
                registry.register_fee_rate_estimator(esplora.clone());
                esplora
            }
            Chain::Ethereum | Chain::Binance => {
                Arc::new(EvmRpcClient::new(*chain, &chain_settings.url, timeout)?)
            }
        };
        registry.register_height_provider(provider);
    }

    let resolver = PriceResolver::new(
        sources_from_settings(&config.price_sources)?,
        config.price_sources.clone(),
    );
    info!("✅ Price resolver initialized");

    let windows: BTreeMap<Chain, u64> = config
        .chains
        .iter()
        .map(|(chain, settings)| (*chain, settings.fee_guarantee_window))
        .collect();
    let reconciler = ScheduleReconciler::new(
        explorer.clone(),
        settings,
        config.trigger_percent.clone(),
        windows,
    );
    let assembler = TransactionAssembler::new(explorer, Arc::new(GreedySelector), settings);

    let job = FeeJob {
        resolver,
        chains: Arc::new(registry),
        engine: FeeEngine::new(config.clone()),
        reconciler,
        assembler,
        encoder: Arc::new(JsonTransactionEncoder),
        notifier: notification::from_settings(&config.notification),
        store: ResultStore::from_settings(config.store.as_ref()),
        config: config.clone(),
    };

    info!(
        "🔗 Job initialized for {} tokens on chains {:?}",
        config.supported_tokens.len(),
        config.configured_chains()
    );
    Ok(JobScheduler::new(Arc::new(job), config.interval()))
}

fn chain_settings(config: &AppConfig, chain: Chain) -> AppResult<&ChainSettings> {
    config
        .chains
        .get(&chain)
        .ok_or_else(|| AppError::Config(format!("chain [{}] has no chain settings", chain)))
}
