use rust_decimal::Decimal;

use crate::pricing::sources::{MarketPair, PoolSnapshot, VolumeQuote};

/// `Σ(price_i * volume_i) / Σ(volume_i)`; `None` without positive total volume
pub fn volume_weighted_average(quotes: &[VolumeQuote]) -> Option<Decimal> {
    let mut weighted = Decimal::ZERO;
    let mut total = Decimal::ZERO;
    for quote in quotes {
        weighted = weighted.checked_add(quote.price.checked_mul(quote.volume)?)?;
        total = total.checked_add(quote.volume)?;
    }
    if total <= Decimal::ZERO {
        return None;
    }
    weighted.checked_div(total)
}

/// Pairs with a positive 24h volume
pub fn eligible_market_quotes(pairs: &[MarketPair]) -> Vec<VolumeQuote> {
    pairs
        .iter()
        .filter_map(|pair| match pair.volume_24h {
            Some(volume) if volume > Decimal::ZERO => Some(VolumeQuote {
                price: pair.price,
                volume,
            }),
            _ => None,
        })
        .collect()
}

fn whole_units(amount: Decimal, decimals: u32) -> Option<Decimal> {
    let scale = 10i64.checked_pow(decimals)?;
    amount.checked_div(Decimal::from(scale))
}

/// Reference asset amount and token amount locked in a pool pairing the two
fn pool_reserves(pool: &PoolSnapshot, token_id: &str, reference_asset: &str) -> Option<(Decimal, Decimal)> {
    let (reference, token) = if pool.locked_x.id == reference_asset && pool.locked_y.id == token_id {
        (&pool.locked_x, &pool.locked_y)
    } else if pool.locked_x.id == token_id && pool.locked_y.id == reference_asset {
        (&pool.locked_y, &pool.locked_x)
    } else {
        return None;
    };
    let reference = whole_units(reference.amount, reference.decimals)?;
    let token = whole_units(token.amount, token.decimals)?;
    if token <= Decimal::ZERO {
        return None;
    }
    Some((reference, token))
}

/// Token price in the reference asset across every pool pairing the two.
/// Weighted by trade volume; when no matching pool reports volume the
/// locked amounts are pooled instead.
pub fn pool_price(pools: &[PoolSnapshot], token_id: &str, reference_asset: &str) -> Option<Decimal> {
    let matching: Vec<(Decimal, Decimal, Decimal)> = pools
        .iter()
        .filter_map(|pool| {
            pool_reserves(pool, token_id, reference_asset)
                .map(|(reference, token)| (reference, token, pool.volume))
        })
        .collect();
    if matching.is_empty() {
        return None;
    }

    let quotes: Vec<VolumeQuote> = matching
        .iter()
        .filter_map(|(reference, token, volume)| {
            Some(VolumeQuote {
                price: reference.checked_div(*token)?,
                volume: *volume,
            })
        })
        .collect();
    if let Some(price) = volume_weighted_average(&quotes) {
        return Some(price);
    }

    let (reference, token) = matching
        .iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(r, t), (reference, token, _)| {
            (r + reference, t + token)
        });
    reference.checked_div(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::sources::LockedAsset;
    use rust_decimal_macros::dec;

    const REF: &str = "0000";

    fn pool(reference: Decimal, token: Decimal, volume: Decimal, flipped: bool) -> PoolSnapshot {
        let reference = LockedAsset {
            id: REF.to_string(),
            amount: reference,
            decimals: 0,
        };
        let token = LockedAsset {
            id: "tkn".to_string(),
            amount: token,
            decimals: 0,
        };
        let (locked_x, locked_y) = if flipped { (token, reference) } else { (reference, token) };
        PoolSnapshot {
            id: "pool".to_string(),
            locked_x,
            locked_y,
            volume,
        }
    }

    #[test]
    fn test_weighted_average_lies_between_extremes() {
        let quotes = vec![
            VolumeQuote { price: dec!(1.0), volume: dec!(10) },
            VolumeQuote { price: dec!(2.0), volume: dec!(30) },
            VolumeQuote { price: dec!(1.5), volume: dec!(5) },
        ];
        let average = volume_weighted_average(&quotes).unwrap();
        assert!(average >= dec!(1.0) && average <= dec!(2.0));
        assert_eq!(volume_weighted_average(&quotes[..1]), Some(dec!(1.0)));
        assert_eq!(volume_weighted_average(&[]), None);
    }

    #[test]
    fn test_zero_and_missing_volume_pairs_are_discarded() {
        let pairs = vec![
            MarketPair { price: dec!(100), volume_24h: None },
            MarketPair { price: dec!(200), volume_24h: Some(dec!(0)) },
            MarketPair { price: dec!(1.01), volume_24h: Some(dec!(500)) },
        ];
        let quotes = eligible_market_quotes(&pairs);
        assert_eq!(quotes.len(), 1);
        assert_eq!(volume_weighted_average(&quotes), Some(dec!(1.01)));
    }

    #[test]
    fn test_single_pool_price_is_its_own_price() {
        let pools = vec![pool(dec!(500), dec!(1000), dec!(42), false)];
        assert_eq!(pool_price(&pools, "tkn", REF), Some(dec!(0.5)));

        let flipped = vec![pool(dec!(500), dec!(1000), dec!(42), true)];
        assert_eq!(pool_price(&flipped, "tkn", REF), Some(dec!(0.5)));
    }

    #[test]
    fn test_pools_weighted_by_volume() {
        let pools = vec![
            pool(dec!(100), dec!(100), dec!(3), false),
            pool(dec!(200), dec!(100), dec!(1), true),
            pool(dec!(900), dec!(1), dec!(1000), false).with_other_token(),
        ];
        assert_eq!(pool_price(&pools, "tkn", REF), Some(dec!(1.25)));
    }

    #[test]
    fn test_pools_without_volume_use_locked_amounts() {
        let pools = vec![
            pool(dec!(100), dec!(100), dec!(0), false),
            pool(dec!(300), dec!(100), dec!(0), false),
        ];
        assert_eq!(pool_price(&pools, "tkn", REF), Some(dec!(2)));
        assert_eq!(pool_price(&pools, "missing", REF), None);
    }

    impl PoolSnapshot {
        fn with_other_token(mut self) -> Self {
            self.locked_y.id = "other".to_string();
            self
        }
    }
}
