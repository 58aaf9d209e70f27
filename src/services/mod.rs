pub mod bias;
pub mod calibrator;
pub mod catalog;
pub mod components;
pub mod distribution;
pub mod divergence;
pub mod metrics;
pub mod relevance;
pub mod selector;
pub mod tradeoff_weight;

use thiserror::Error;

pub use bias::ItemBias;
pub use calibrator::{CalibrationData, Calibrator};
pub use catalog::ItemCatalog;
pub use components::{CalibrationConfig, Components};
pub use distribution::{DistributionBuilder, DistributionStrategy};
pub use divergence::Divergence;
pub use relevance::RelevanceMeasure;
pub use selector::{PoolItem, Selection, SelectorStrategy, SurrogateSelector};
pub use tradeoff_weight::{TradeoffWeight, WeightContext};

/// Error types for the calibration engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("Unknown {family} component: {name}")]
    UnknownComponent { family: &'static str, name: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Item metadata declares no genres")]
    EmptyVocabulary,

    #[error("Item {item_id} is not present in the item metadata")]
    UnknownItem { item_id: String },

    #[error("Non-finite value in {context}")]
    NonFiniteValue { context: String },

    #[error("Non-finite distribution: {context}")]
    NonFiniteDistribution { context: String },
}

impl CalibrationError {
    /// Configuration problems abort a whole run; everything else is scoped
    /// to the user whose data triggered it
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CalibrationError::UnknownComponent { .. }
                | CalibrationError::InvalidParameter(_)
                | CalibrationError::EmptyVocabulary
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let unknown = CalibrationError::UnknownComponent {
            family: "fairness",
            name: "NOPE".to_string(),
        };
        assert!(unknown.is_config_error());
        assert_eq!(unknown.to_string(), "Unknown fairness component: NOPE");

        let missing = CalibrationError::UnknownItem {
            item_id: "i9".to_string(),
        };
        assert!(!missing.is_config_error());
    }
}
