use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod genre;

pub use genre::{Distribution, GenreIndex};

use crate::services::CalibrationConfig;

/// Identifier of a user
pub type UserId = String;

/// Identifier of an item
pub type ItemId = String;

/// One historical user-item interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub user_id: UserId,
    pub item_id: ItemId,
    /// Positive interaction strength (rating, play count, ...)
    pub transaction_value: f64,
    /// Ordering key; larger means more recent
    #[serde(default)]
    pub timestamp: i64,
}

/// A candidate item scored by the upstream recommender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub predicted_value: f64,
}

/// Item metadata: the set of genres an item belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: ItemId,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl ItemRecord {
    pub fn new<I, S>(item_id: impl Into<ItemId>, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            item_id: item_id.into(),
            genres: genres.into_iter().map(Into::into).collect(),
        }
    }
}

/// One row of a calibrated recommendation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub item_id: ItemId,
    /// 1-based rank in the final list
    pub order: usize,
    pub user_id: UserId,
    /// Predicted relevance carried over from the candidate row
    pub transaction_value: f64,
}

/// Final calibrated list for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedList {
    pub user_id: UserId,
    /// Tradeoff weight used for this user
    pub alpha: f64,
    /// Divergence between the target and the full list's distribution
    pub divergence: f64,
    /// Aggregated relevance of the full list
    pub relevance: f64,
    pub items: Vec<RankedItem>,
}

impl RankedList {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item ids in rank order
    pub fn item_ids(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.item_id.as_str()).collect()
    }
}

/// Request body for a calibration run
#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationRequest {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    pub candidates: Vec<Candidate>,
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    pub config: Option<CalibrationConfig>,
}

/// A user whose list could not be produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFailure {
    pub user_id: UserId,
    pub error: String,
}

/// Result of a calibration run over a user population
///
/// Users are independent: a data problem for one user lands in `failures`
/// and does not prevent the others from being calibrated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResponse {
    pub lists: BTreeMap<UserId, RankedList>,
    pub failures: Vec<UserFailure>,
    /// Users not processed before the run deadline expired
    pub timed_out: Vec<UserId>,
}

/// Accepted component names per family
#[derive(Debug, Clone, Serialize)]
pub struct ComponentCatalog {
    pub distribution_component: Vec<&'static str>,
    pub fairness_component: Vec<&'static str>,
    pub relevance_component: Vec<&'static str>,
    pub tradeoff_weight_component: Vec<&'static str>,
    pub select_item_component: Vec<&'static str>,
}
