use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapters::traits::ConfigBoxReader;
use crate::config::{MinimumFeeSettings, TriggerPercent};
use crate::error::ScheduleError;
use crate::ledger::models::UtxoBox;
use crate::models::{Chain, SupportedToken};
use crate::schedule::models::{ChainFeeParams, CommittedSchedule, Epoch, FeeSchedule};

/// Percentage changes between the effective epoch and a freshly derived one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeeDifferences {
    pub bridge_fee: u128,
    pub rsn_ratio: u128,
    pub network_fee: BTreeMap<Chain, u128>,
}

impl FeeDifferences {
    pub fn exceeds(&self, triggers: &TriggerPercent) -> bool {
        self.bridge_fee > u128::from(triggers.bridge_fee)
            || self.rsn_ratio > u128::from(triggers.rsn_ratio)
            || self
                .network_fee
                .iter()
                .any(|(chain, diff)| *diff > u128::from(triggers.network_fee_for(*chain)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    NoCommittedSchedule,
    NothingEffective,
    ThresholdExceeded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    NoUpdate {
        differences: FeeDifferences,
    },
    UpdatedSchedule {
        schedule: FeeSchedule,
        reason: UpdateReason,
        differences: Option<FeeDifferences>,
        /// Config box being replaced, if one exists
        current_box: Option<UtxoBox>,
    },
}

/// `|old - new| * 100 / old`, truncated. A zero old value counts as an
/// unbounded change unless the new value is zero too.
pub fn difference_percent(old: u128, new: u128) -> u128 {
    if old == 0 {
        return if new == 0 { 0 } else { u128::MAX };
    }
    old.abs_diff(new).saturating_mul(100) / old
}

/// Index of the newest epoch with at least one chain height at or below that
/// chain's current height
fn effective_index(schedule: &FeeSchedule, heights: &BTreeMap<Chain, u64>) -> Option<usize> {
    schedule.epochs().iter().rposition(|epoch| {
        epoch
            .entries()
            .iter()
            .any(|(chain, entry)| heights.get(chain).map_or(false, |h| entry.height <= *h))
    })
}

/// Every chain the epoch has params for is older than its guarantee window
fn is_expired(epoch: &Epoch, heights: &BTreeMap<Chain, u64>, windows: &BTreeMap<Chain, u64>) -> bool {
    epoch
        .entries()
        .iter()
        .filter(|(_, entry)| entry.params().is_some())
        .all(|(chain, entry)| match (heights.get(chain), windows.get(chain)) {
            (Some(height), Some(window)) => entry.height < height.saturating_sub(*window),
            _ => false,
        })
}

/// Drop epochs that will never take effect, and every epoch strictly older
/// than the newest expired one. That epoch still sets the fee between the
/// guarantee window cutoff and the next activation height.
pub fn prune(
    schedule: &FeeSchedule,
    heights: &BTreeMap<Chain, u64>,
    windows: &BTreeMap<Chain, u64>,
) -> FeeSchedule {
    let Some(effective) = effective_index(schedule, heights) else {
        return FeeSchedule::new();
    };
    let epochs = schedule.epochs();
    let start = (0..effective)
        .rev()
        .find(|index| is_expired(&epochs[*index], heights, windows))
        .unwrap_or(0);

    FeeSchedule::from_epochs(epochs[start..=effective].to_vec())
}

fn scaled_ratio(ratio: u128, divisor: u128, common: u128) -> u128 {
    if divisor == 0 {
        return ratio;
    }
    ratio.saturating_mul(common / divisor)
}

/// Differences over the chains active on both sides. A chain missing from
/// either epoch is skipped.
fn compare(current: &Epoch, derived: &Epoch) -> FeeDifferences {
    let shared: Vec<(Chain, ChainFeeParams, ChainFeeParams)> = current
        .active_chains()
        .into_iter()
        .filter_map(|chain| match (current.params(chain), derived.params(chain)) {
            (Some(old), Some(new)) => Some((chain, *old, *new)),
            _ => None,
        })
        .collect();

    let mut differences = FeeDifferences::default();
    // bridge fee and rsn ratio are the same on every chain
    if let Some((_, old, new)) = shared.first() {
        differences.bridge_fee = difference_percent(old.bridge_fee, new.bridge_fee);

        let common = old.rsn_ratio_divisor.max(new.rsn_ratio_divisor);
        differences.rsn_ratio = difference_percent(
            scaled_ratio(old.rsn_ratio, old.rsn_ratio_divisor, common),
            scaled_ratio(new.rsn_ratio, new.rsn_ratio_divisor, common),
        );
    }
    for (chain, old, new) in &shared {
        differences
            .network_fee
            .insert(*chain, difference_percent(old.network_fee, new.network_fee));
    }

    differences
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Keep(FeeDifferences),
    Replace {
        schedule: FeeSchedule,
        reason: UpdateReason,
        differences: Option<FeeDifferences>,
    },
}

/// Pure reconciliation of a committed schedule with a freshly derived epoch
pub fn decide(
    committed: Option<&FeeSchedule>,
    derived: Epoch,
    heights: &BTreeMap<Chain, u64>,
    windows: &BTreeMap<Chain, u64>,
    triggers: &TriggerPercent,
) -> Decision {
    let Some(committed) = committed else {
        return Decision::Replace {
            schedule: FeeSchedule::from_epochs(vec![derived]),
            reason: UpdateReason::NoCommittedSchedule,
            differences: None,
        };
    };

    let mut pruned = prune(committed, heights, windows);
    let Some(current) = pruned.last().cloned() else {
        return Decision::Replace {
            schedule: FeeSchedule::from_epochs(vec![derived]),
            reason: UpdateReason::NothingEffective,
            differences: None,
        };
    };

    let differences = compare(&current, &derived);
    if !differences.exceeds(triggers) {
        return Decision::Keep(differences);
    }
    pruned.append(derived);
    Decision::Replace {
        schedule: pruned,
        reason: UpdateReason::ThresholdExceeded,
        differences: Some(differences),
    }
}

/// Reads committed schedules and decides whether a token needs a new one
pub struct ScheduleReconciler {
    reader: Arc<dyn ConfigBoxReader>,
    triggers: TriggerPercent,
    windows: BTreeMap<Chain, u64>,
    fetch_retry: u32,
}

impl ScheduleReconciler {
    pub fn new(
        reader: Arc<dyn ConfigBoxReader>,
        settings: &MinimumFeeSettings,
        triggers: TriggerPercent,
        windows: BTreeMap<Chain, u64>,
    ) -> Self {
        Self {
            reader,
            triggers,
            windows,
            fetch_retry: settings.fetch_box_retry.max(1),
        }
    }

    /// Fetch the committed schedule, retrying transport failures. Exhausted
    /// retries are reported as no committed schedule.
    pub async fn fetch_committed(
        &self,
        token: &SupportedToken,
    ) -> Result<Option<CommittedSchedule>, ScheduleError> {
        for attempt in 1..=self.fetch_retry {
            match self.reader.fetch_schedule(&token.config_token_id).await {
                Ok(committed) => return Ok(committed),
                Err(e @ ScheduleError::ScheduleFetchFailed { .. }) => {
                    warn!(
                        "⚠️  Attempt {}/{} to fetch config box of [{}] failed: {}",
                        attempt, self.fetch_retry, token.token_id, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
        warn!(
            "⚠️  Config box of [{}] treated as absent after {} attempts",
            token.token_id, self.fetch_retry
        );
        Ok(None)
    }

    pub async fn reconcile(
        &self,
        token: &SupportedToken,
        derived: Epoch,
        heights: &BTreeMap<Chain, u64>,
    ) -> Result<ReconcileOutcome, ScheduleError> {
        let committed = self.fetch_committed(token).await?;
        let decision = decide(
            committed.as_ref().map(|c| &c.schedule),
            derived,
            heights,
            &self.windows,
            &self.triggers,
        );

        match decision {
            Decision::Replace {
                schedule,
                reason,
                differences,
            } => {
                info!(
                    "📝 Token [{}] needs a new schedule ({:?}, {} epochs)",
                    token.token_id,
                    reason,
                    schedule.len()
                );
                Ok(ReconcileOutcome::UpdatedSchedule {
                    schedule,
                    reason,
                    differences,
                    current_box: committed.map(|c| c.config_box),
                })
            }
            Decision::Keep(differences) => {
                debug!(
                    "Token [{}] is within thresholds: {:?}",
                    token.token_id, differences
                );
                Ok(ReconcileOutcome::NoUpdate { differences })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::token;
    use crate::schedule::models::fixtures::{epoch, params};
    use crate::testing::StaticConfigReader;

    fn triggers() -> TriggerPercent {
        TriggerPercent {
            bridge_fee: 2,
            rsn_ratio: 2,
            network_fee: BTreeMap::from([(Chain::Ergo, 2), (Chain::Cardano, 2)]),
        }
    }

    fn windows() -> BTreeMap<Chain, u64> {
        BTreeMap::from([(Chain::Ergo, 720), (Chain::Cardano, 4320)])
    }

    fn heights(ergo: u64, cardano: u64) -> BTreeMap<Chain, u64> {
        BTreeMap::from([(Chain::Ergo, ergo), (Chain::Cardano, cardano)])
    }

    #[test]
    fn test_difference_percent() {
        assert_eq!(difference_percent(100, 101), 1);
        assert_eq!(difference_percent(100, 50), 50);
        assert_eq!(difference_percent(3, 4), 33);
        assert_eq!(difference_percent(0, 0), 0);
        assert_eq!(difference_percent(0, 1), u128::MAX);
    }

    #[test]
    fn test_prune_drops_trailing_and_expired_epochs() {
        let schedule = FeeSchedule::from_epochs(vec![
            epoch(1_000, 10_000, 1),
            epoch(9_000, 94_000, 2),
            epoch(9_500, 95_000, 3),
            epoch(20_000, 200_000, 4),
        ]);

        // the newest expired epoch is kept, older ones go
        let pruned = prune(&schedule, &heights(10_000, 100_000), &windows());
        assert_eq!(pruned.epochs(), &schedule.epochs()[1..3]);

        let pruned = prune(&schedule, &heights(9_600, 96_000), &windows());
        assert_eq!(pruned.epochs(), &schedule.epochs()[0..3]);
    }

    #[test]
    fn test_prune_keeps_epoch_governing_guarantee_window() {
        let schedule = FeeSchedule::from_epochs(vec![
            epoch(9_000, 94_000, 1),
            epoch(9_500, 95_000, 2),
        ]);

        // cutoffs are 9280 and 95680, so ergo heights 9280..9500 still use the first epoch
        let pruned = prune(&schedule, &heights(10_000, 100_000), &windows());
        assert_eq!(pruned.len(), 2);
        assert_eq!(pruned.epochs(), schedule.epochs());
    }

    #[test]
    fn test_prune_is_idempotent() {
        let schedule = FeeSchedule::from_epochs(vec![
            epoch(1_000, 10_000, 1),
            epoch(9_000, 94_000, 2),
            epoch(9_500, 95_000, 3),
            epoch(20_000, 200_000, 4),
        ]);
        let heights = heights(9_600, 96_000);

        let once = prune(&schedule, &heights, &windows());
        let twice = prune(&once, &heights, &windows());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_prune_without_effective_epoch_is_empty() {
        let schedule = FeeSchedule::from_epochs(vec![epoch(5_000, 50_000, 1)]);
        assert!(prune(&schedule, &heights(100, 100), &windows()).is_empty());
    }

    #[test]
    fn test_small_change_does_not_update() {
        let committed = FeeSchedule::from_epochs(vec![epoch(900, 9_000, 100)]);
        let decision = decide(
            Some(&committed),
            epoch(1_010, 10_010, 101),
            &heights(1_000, 10_000),
            &windows(),
            &triggers(),
        );

        match decision {
            Decision::Keep(differences) => assert_eq!(differences.bridge_fee, 1),
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn test_large_change_appends_epoch_in_height_order() {
        let committed = FeeSchedule::from_epochs(vec![epoch(900, 9_000, 100)]);
        let decision = decide(
            Some(&committed),
            epoch(1_010, 10_010, 150),
            &heights(1_000, 10_000),
            &windows(),
            &triggers(),
        );

        let Decision::Replace {
            schedule, reason, ..
        } = decision
        else {
            panic!("expected a replacement");
        };
        assert_eq!(reason, UpdateReason::ThresholdExceeded);
        assert_eq!(schedule.len(), 2);
        for pair in schedule.epochs().windows(2) {
            for (chain, entry) in pair[1].entries() {
                if let Some(older) = pair[0].height(*chain) {
                    assert!(older <= entry.height);
                }
            }
        }
    }

    #[test]
    fn test_chain_turning_inactive_with_same_fees_is_kept() {
        let committed = FeeSchedule::from_epochs(vec![epoch(900, 9_000, 100)]);
        let derived = Epoch::new()
            .with_chain(Chain::Ergo, 1_010, Some(params(100)))
            .with_chain(Chain::Cardano, 10_010, None);

        let decision = decide(
            Some(&committed),
            derived,
            &heights(1_000, 10_000),
            &windows(),
            &triggers(),
        );
        match decision {
            Decision::Keep(differences) => {
                assert_eq!(differences.bridge_fee, 0);
                assert_eq!(
                    differences.network_fee,
                    BTreeMap::from([(Chain::Ergo, 0)])
                );
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn test_shared_chain_change_still_updates_when_set_differs() {
        let committed = FeeSchedule::from_epochs(vec![epoch(900, 9_000, 100)]);
        let derived = Epoch::new()
            .with_chain(Chain::Ergo, 1_010, Some(params(200)))
            .with_chain(Chain::Cardano, 10_010, None);

        let decision = decide(
            Some(&committed),
            derived,
            &heights(1_000, 10_000),
            &windows(),
            &triggers(),
        );
        assert!(matches!(
            decision,
            Decision::Replace {
                reason: UpdateReason::ThresholdExceeded,
                ..
            }
        ));
    }

    #[test]
    fn test_rsn_ratio_compared_on_common_divisor() {
        let committed = FeeSchedule::from_epochs(vec![epoch(900, 9_000, 100)]);
        let mut derived_params = params(100);
        derived_params.rsn_ratio = 1_500_000;
        derived_params.rsn_ratio_divisor = 10_000_000;
        let derived = Epoch::new()
            .with_chain(Chain::Ergo, 1_010, Some(derived_params))
            .with_chain(Chain::Cardano, 10_010, Some(derived_params));

        let decision = decide(
            Some(&committed),
            derived,
            &heights(1_000, 10_000),
            &windows(),
            &triggers(),
        );
        match decision {
            Decision::Keep(differences) => assert_eq!(differences.rsn_ratio, 0),
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reconcile_without_committed_schedule() {
        let reader = Arc::new(StaticConfigReader::default());
        let config = crate::config::fixtures::app_config();
        let reconciler =
            ScheduleReconciler::new(reader, &config.minimum_fee, triggers(), windows());

        let outcome = reconciler
            .reconcile(
                &token("erg", 9, &[Chain::Ergo, Chain::Cardano]),
                epoch(1_010, 10_010, 5),
                &heights(1_000, 10_000),
            )
            .await
            .unwrap();

        match outcome {
            ReconcileOutcome::UpdatedSchedule {
                schedule,
                reason,
                current_box,
                ..
            } => {
                assert_eq!(schedule.len(), 1);
                assert_eq!(reason, UpdateReason::NoCommittedSchedule);
                assert!(current_box.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_failures_are_retried_then_treated_as_absent() {
        let reader = Arc::new(StaticConfigReader::failing());
        let config = crate::config::fixtures::app_config();
        let reconciler =
            ScheduleReconciler::new(reader.clone(), &config.minimum_fee, triggers(), windows());

        let committed = reconciler
            .fetch_committed(&token("erg", 9, &[Chain::Ergo]))
            .await
            .unwrap();

        assert!(committed.is_none());
        assert_eq!(reader.calls(), config.minimum_fee.fetch_box_retry as usize);
    }
}
