use std::collections::HashMap;

use crate::models::{ItemId, Transaction};

/// Regularizer added to the interaction count of an item
pub const ITEM_BIAS_REGULARIZER: f64 = 0.001;

/// Regularizer added to the length of a list when averaging user residuals
pub const USER_BIAS_REGULARIZER: f64 = 0.001;

/// Global mean and per-item bias of the transaction values of one run
///
/// An item's bias is the sum of its deviations from the global mean divided
/// by its regularized interaction count. Items without transactions have no
/// bias. Non-finite values are left out; the users holding them fail on their
/// own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemBias {
    mean: f64,
    items: HashMap<ItemId, f64>,
}

impl ItemBias {
    pub fn fit(transactions: &[Transaction]) -> Self {
        let values = || {
            transactions
                .iter()
                .filter(|t| t.transaction_value.is_finite())
        };

        let count = values().count();
        if count == 0 {
            return Self::default();
        }
        let mean = values().map(|t| t.transaction_value).sum::<f64>() / count as f64;

        let mut totals: HashMap<&str, (f64, usize)> = HashMap::new();
        for transaction in values() {
            let entry = totals.entry(transaction.item_id.as_str()).or_default();
            entry.0 += transaction.transaction_value - mean;
            entry.1 += 1;
        }

        let items = totals
            .into_iter()
            .map(|(item_id, (deviation, n))| {
                (item_id.to_string(), deviation / (ITEM_BIAS_REGULARIZER + n as f64))
            })
            .collect();

        Self { mean, items }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn item_bias(&self, item_id: &str) -> f64 {
        self.items.get(item_id).copied().unwrap_or(0.0)
    }

    /// Part of a predicted score not explained by the mean and the item bias
    pub fn residual(&self, item_id: &str, score: f64) -> f64 {
        score - self.mean - self.item_bias(item_id)
    }
}

/// User bias of a list whose residuals sum to `residual_sum`
pub fn user_bias(residual_sum: f64, len: usize) -> f64 {
    residual_sum / (USER_BIAS_REGULARIZER + len as f64)
}
