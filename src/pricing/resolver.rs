use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PriceSourceSettings;
use crate::error::{AppError, AppResult, PriceError};
use crate::models::{PriceBackend, SupportedToken};
use crate::pricing::sources::PriceSources;
use crate::pricing::weighted::{eligible_market_quotes, pool_price, volume_weighted_average};

/// USD prices resolved in one run
#[derive(Debug, Clone, Default)]
pub struct PriceReport {
    pub prices: BTreeMap<String, Decimal>,
    /// Tokens whose own backend failed; the rest of the run continues without them
    pub failures: Vec<(String, PriceError)>,
}

impl PriceReport {
    pub fn price(&self, token_id: &str) -> Option<Decimal> {
        self.prices.get(token_id).copied()
    }

    /// Price that the run cannot continue without
    pub fn require(&self, token_id: &str) -> Result<Decimal, AppError> {
        self.price(token_id)
            .ok_or_else(|| AppError::RequiredPrice(token_id.to_string()))
    }

    fn record(&mut self, token: &SupportedToken, result: Result<Decimal, PriceError>) {
        match result {
            Ok(price) => {
                debug!("Price of [{}] from {}: {}$", token.name, token.price.name(), price);
                self.prices.insert(token.token_id.clone(), price);
            }
            Err(e) => {
                warn!(
                    "⚠️  Price of [{}] is not available from {}: {}",
                    token.name,
                    token.price.name(),
                    e
                );
                self.failures.push((token.token_id.clone(), e));
            }
        }
    }
}

pub struct PriceResolver {
    sources: PriceSources,
    settings: PriceSourceSettings,
}

impl PriceResolver {
    pub fn new(sources: PriceSources, settings: PriceSourceSettings) -> Self {
        Self { sources, settings }
    }

    /// Resolve every token's price. Independent backends run first, then
    /// backends priced against a reference token, then duplicates. An error
    /// is returned only when a dependency cannot be satisfied.
    pub async fn resolve(&self, tokens: &[SupportedToken]) -> Result<PriceReport, PriceError> {
        let mut report = PriceReport::default();

        // phase 1
        let mut gecko = Vec::new();
        let mut markets = Vec::new();
        for token in tokens {
            match &token.price {
                PriceBackend::Manual { price } => report.record(token, Ok(*price)),
                PriceBackend::Coingecko { network } => gecko.push((token, network.clone())),
                PriceBackend::Coinmarketcap { slug } => markets.push((token, slug.clone())),
                _ => {}
            }
        }
        let (gecko_prices, market_prices) =
            tokio::join!(self.quote_prices(&gecko), self.market_prices(&markets));
        for (token, result) in gecko_prices.into_iter().chain(market_prices) {
            report.record(token, result);
        }

        // phase 2
        let pooled: Vec<&SupportedToken> = tokens
            .iter()
            .filter(|token| matches!(token.price, PriceBackend::Spectrum))
            .collect();
        let paired: Vec<&SupportedToken> = tokens
            .iter()
            .filter(|token| matches!(token.price, PriceBackend::Dexhunter))
            .collect();
        let pool_reference = Self::reference_price(&report, &pooled, &self.settings.pool_reference_token)?;
        let pair_reference = Self::reference_price(&report, &paired, &self.settings.pair_reference_token)?;

        let (pool_prices, pair_prices) = tokio::join!(
            self.pool_prices(&pooled, pool_reference),
            self.pair_prices(&paired, pair_reference)
        );
        for (token, result) in pool_prices.into_iter().chain(pair_prices) {
            report.record(token, result);
        }

        // phase 3
        let mut pending: Vec<(&SupportedToken, &str)> = tokens
            .iter()
            .filter_map(|token| match &token.price {
                PriceBackend::DuplicateToken { token_id } => Some((token, token_id.as_str())),
                _ => None,
            })
            .collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::new();
            for (token, source) in pending {
                match report.price(source) {
                    Some(price) => report.record(token, Ok(price)),
                    None => waiting.push((token, source)),
                }
            }
            if waiting.len() == before {
                let (token, source) = waiting[0];
                return Err(PriceError::DependencyUnresolved {
                    token: token.token_id.clone(),
                    dependency: source.to_string(),
                });
            }
            pending = waiting;
        }

        info!(
            "💱 Resolved {} prices ({} failed)",
            report.prices.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn reference_price(
        report: &PriceReport,
        dependents: &[&SupportedToken],
        reference: &str,
    ) -> Result<Decimal, PriceError> {
        match (dependents.first(), report.price(reference)) {
            (_, Some(price)) => Ok(price),
            (None, None) => Ok(Decimal::ZERO),
            (Some(token), None) => Err(PriceError::DependencyUnresolved {
                token: token.token_id.clone(),
                dependency: reference.to_string(),
            }),
        }
    }

    async fn quote_prices<'a>(
        &self,
        tokens: &[(&'a SupportedToken, String)],
    ) -> Vec<(&'a SupportedToken, Result<Decimal, PriceError>)> {
        if tokens.is_empty() {
            return Vec::new();
        }
        let mut networks: Vec<String> = tokens.iter().map(|(_, network)| network.clone()).collect();
        networks.sort();
        networks.dedup();

        match self.sources.quote_api.usd_prices(&networks).await {
            Ok(prices) => tokens
                .iter()
                .map(|(token, network)| {
                    let result = prices.get(network).copied().ok_or_else(|| {
                        PriceError::unavailable(&token.token_id, format!("no quote for [{}]", network))
                    });
                    (*token, result)
                })
                .collect(),
            Err(e) => tokens
                .iter()
                .map(|(token, _)| (*token, Err(PriceError::unavailable(&token.token_id, e.to_string()))))
                .collect(),
        }
    }

    async fn market_prices<'a>(
        &self,
        tokens: &[(&'a SupportedToken, String)],
    ) -> Vec<(&'a SupportedToken, Result<Decimal, PriceError>)> {
        let fetches = tokens.iter().map(|(token, slug)| async move {
            let result = match self.sources.markets.market_pairs(slug).await {
                Ok(pairs) => volume_weighted_average(&eligible_market_quotes(&pairs))
                    .ok_or_else(|| PriceError::unavailable(&token.token_id, format!("No pool found for [{}]", slug))),
                Err(e) => Err(PriceError::unavailable(&token.token_id, e.to_string())),
            };
            (*token, result)
        });
        join_all(fetches).await
    }

    async fn pool_prices<'a>(
        &self,
        tokens: &[&'a SupportedToken],
        reference_price: Decimal,
    ) -> Vec<(&'a SupportedToken, Result<Decimal, PriceError>)> {
        if tokens.is_empty() {
            return Vec::new();
        }
        let to = Utc::now();
        let from = to - ChronoDuration::days(self.settings.pool_lookback_days);
        let pools = match self.sources.pools.pool_snapshots(from, to).await {
            Ok(pools) => pools,
            Err(e) => {
                return tokens
                    .iter()
                    .map(|token| (*token, Err(PriceError::unavailable(&token.token_id, e.to_string()))))
                    .collect()
            }
        };

        tokens
            .iter()
            .map(|token| {
                let result = pool_price(&pools, &token.token_id, &self.settings.pool_reference_asset)
                    .and_then(|price| price.checked_mul(reference_price))
                    .ok_or_else(|| {
                        PriceError::unavailable(
                            &token.token_id,
                            format!(
                                "No pool found between [{}] and [{}]",
                                self.settings.pool_reference_token, token.token_id
                            ),
                        )
                    });
                (*token, result)
            })
            .collect()
    }

    async fn pair_prices<'a>(
        &self,
        tokens: &[&'a SupportedToken],
        reference_price: Decimal,
    ) -> Vec<(&'a SupportedToken, Result<Decimal, PriceError>)> {
        let fetches = tokens.iter().map(|token| async move {
            let result = match self.sources.pair_ratio.price_in_reference(&token.token_id).await {
                Ok(ratio) => ratio.checked_mul(reference_price).ok_or_else(|| {
                    PriceError::unavailable(&token.token_id, "price overflow")
                }),
                Err(e) => Err(PriceError::unavailable(&token.token_id, e.to_string())),
            };
            (*token, result)
        });
        join_all(fetches).await
    }
}

/// Build the resolver sources from settings
pub fn sources_from_settings(settings: &PriceSourceSettings) -> AppResult<PriceSources> {
    use crate::pricing::coingecko::CoingeckoClient;
    use crate::pricing::coinmarketcap::CoinmarketcapClient;
    use crate::pricing::dexhunter::DexhunterClient;
    use crate::pricing::spectrum::SpectrumClient;

    let timeout = settings.request_timeout();
    Ok(PriceSources {
        quote_api: Arc::new(CoingeckoClient::new(&settings.coingecko_url, timeout)?),
        markets: Arc::new(CoinmarketcapClient::new(
            &settings.coinmarketcap_url,
            settings.market_pair_limit,
            timeout,
        )?),
        pools: Arc::new(SpectrumClient::new(&settings.spectrum_url, timeout)?),
        pair_ratio: Arc::new(DexhunterClient::new(&settings.dexhunter_url, timeout)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::token;
    use crate::models::Chain;
    use crate::pricing::sources::{LockedAsset, MarketPair, PoolSnapshot};
    use crate::testing::{fake_sources, FakePriceSources};
    use rust_decimal_macros::dec;

    fn priced(id: &str, backend: PriceBackend) -> SupportedToken {
        let mut token = token(id, 6, &[Chain::Ergo]);
        token.price = backend;
        token
    }

    fn settings() -> PriceSourceSettings {
        PriceSourceSettings {
            pool_reference_asset: "0000".to_string(),
            pool_reference_token: "erg".to_string(),
            pair_reference_token: "ada".to_string(),
            ..PriceSourceSettings::default()
        }
    }

    fn gecko(network: &str) -> PriceBackend {
        PriceBackend::Coingecko {
            network: network.to_string(),
        }
    }

    fn duplicate(of: &str) -> PriceBackend {
        PriceBackend::DuplicateToken {
            token_id: of.to_string(),
        }
    }

    #[tokio::test]
    async fn test_resolves_all_phases() {
        let fakes = FakePriceSources {
            quotes: [("ergo", dec!(1.5)), ("cardano", dec!(0.4))]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            market_pairs: vec![
                MarketPair { price: dec!(1.0), volume_24h: Some(dec!(10)) },
                MarketPair { price: dec!(2.0), volume_24h: None },
            ],
            pools: vec![PoolSnapshot {
                id: "p".to_string(),
                locked_x: LockedAsset { id: "0000".to_string(), amount: dec!(100), decimals: 0 },
                locked_y: LockedAsset { id: "rsn".to_string(), amount: dec!(1000), decimals: 0 },
                volume: dec!(5),
            }],
            pair_ratio: Some(dec!(0.5)),
            ..Default::default()
        };
        let resolver = PriceResolver::new(fake_sources(fakes), settings());

        let tokens = vec![
            priced("rsn-copy", duplicate("rsn")),
            priced("copy-of-copy", duplicate("rsn-copy")),
            priced("rsn", PriceBackend::Spectrum),
            priced("hosky", PriceBackend::Dexhunter),
            priced("usdt", PriceBackend::Coinmarketcap { slug: "tether".to_string() }),
            priced("erg", gecko("ergo")),
            priced("ada", gecko("cardano")),
            priced("manual", PriceBackend::Manual { price: dec!(3) }),
        ];

        let report = resolver.resolve(&tokens).await.unwrap();

        assert!(report.failures.is_empty());
        assert_eq!(report.price("erg"), Some(dec!(1.5)));
        assert_eq!(report.price("usdt"), Some(dec!(1.0)));
        assert_eq!(report.price("rsn"), Some(dec!(0.15)));
        assert_eq!(report.price("hosky"), Some(dec!(0.2)));
        assert_eq!(report.price("rsn-copy"), Some(dec!(0.15)));
        assert_eq!(report.price("copy-of-copy"), Some(dec!(0.15)));
        assert_eq!(report.price("manual"), Some(dec!(3)));
    }

    #[tokio::test]
    async fn test_failed_backend_is_isolated() {
        let fakes = FakePriceSources {
            quotes: [("ergo".to_string(), dec!(1.5))].into_iter().collect(),
            markets_fail: true,
            ..Default::default()
        };
        let resolver = PriceResolver::new(fake_sources(fakes), settings());
        let tokens = vec![
            priced("erg", gecko("ergo")),
            priced("usdt", PriceBackend::Coinmarketcap { slug: "tether".to_string() }),
            priced("missing", gecko("unknown-network")),
        ];

        let report = resolver.resolve(&tokens).await.unwrap();

        assert_eq!(report.price("erg"), Some(dec!(1.5)));
        let failed: Vec<&str> = report.failures.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(failed, vec!["missing", "usdt"]);
        assert!(matches!(report.require("usdt"), Err(AppError::RequiredPrice(_))));
    }

    #[tokio::test]
    async fn test_missing_reference_price_is_fatal() {
        let resolver = PriceResolver::new(fake_sources(FakePriceSources::default()), settings());
        let err = resolver
            .resolve(&[priced("rsn", PriceBackend::Spectrum)])
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PriceError::DependencyUnresolved {
                token: "rsn".to_string(),
                dependency: "erg".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_cycle_is_fatal() {
        let resolver = PriceResolver::new(fake_sources(FakePriceSources::default()), settings());
        let err = resolver
            .resolve(&[priced("a", duplicate("b")), priced("b", duplicate("a"))])
            .await
            .unwrap_err();
        assert!(matches!(err, PriceError::DependencyUnresolved { .. }));
    }
}
