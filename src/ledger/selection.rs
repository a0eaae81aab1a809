use crate::ledger::models::{AssetBalance, Subtraction, UtxoBox};

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub covered: bool,
    pub boxes: Vec<UtxoBox>,
}

/// Picks boxes that together cover a required balance
pub trait BoxSelector: Send + Sync {
    fn select(&self, required: &AssetBalance, available: Vec<UtxoBox>) -> Selection;
}

/// Takes boxes in the given order while they contribute to what is still missing
pub struct GreedySelector;

impl BoxSelector for GreedySelector {
    fn select(&self, required: &AssetBalance, available: Vec<UtxoBox>) -> Selection {
        let mut remaining = required.clone();
        let mut boxes = Vec::new();

        for candidate in available {
            if remaining.is_zero() {
                break;
            }
            let contributes = (remaining.native > 0 && candidate.value > 0)
                || candidate
                    .assets
                    .iter()
                    .any(|asset| remaining.token(&asset.token_id) > 0);
            if !contributes {
                continue;
            }
            // floor subtraction cannot fail
            remaining = remaining
                .subtract(&candidate.balance(), Subtraction::Floor)
                .unwrap_or_default();
            boxes.push(candidate);
        }

        Selection {
            covered: remaining.is_zero(),
            boxes,
        }
    }
}
