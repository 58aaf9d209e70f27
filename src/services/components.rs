use serde::{Deserialize, Serialize};

use crate::models::ComponentCatalog;

use super::{
    CalibrationError, DistributionStrategy, Divergence, RelevanceMeasure, SelectorStrategy,
    TradeoffWeight,
};

/// Per-run component selection, as received from callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub distribution_component: String,
    pub fairness_component: String,
    pub relevance_component: String,
    pub tradeoff_weight_component: String,
    pub select_item_component: String,
    pub list_size: usize,
    /// Weight of the target in the smoothed realized distribution
    pub smoothing: f64,
    pub minkowski_order: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            distribution_component: "CWS".to_string(),
            fairness_component: "KL".to_string(),
            relevance_component: "SUM".to_string(),
            tradeoff_weight_component: "C@0.5".to_string(),
            select_item_component: "SURROGATE".to_string(),
            list_size: 10,
            smoothing: 0.01,
            minkowski_order: 3,
        }
    }
}

/// Validated components of one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Components {
    pub distribution: DistributionStrategy,
    pub divergence: Divergence,
    pub relevance: RelevanceMeasure,
    pub tradeoff_weight: TradeoffWeight,
    pub selector: SelectorStrategy,
    pub list_size: usize,
    pub smoothing: f64,
}

impl CalibrationConfig {
    /// Resolves every component name and checks every parameter
    pub fn resolve(&self) -> Result<Components, CalibrationError> {
        if self.list_size == 0 {
            return Err(CalibrationError::InvalidParameter(
                "list_size must be positive".to_string(),
            ));
        }

        if !(self.smoothing.is_finite() && (0.0..1.0).contains(&self.smoothing)) {
            return Err(CalibrationError::InvalidParameter(format!(
                "smoothing must be within [0, 1), got {}",
                self.smoothing
            )));
        }

        Ok(Components {
            distribution: self.distribution_component.parse()?,
            divergence: Divergence::from_name(&self.fairness_component, self.minkowski_order)?,
            relevance: self.relevance_component.parse()?,
            tradeoff_weight: self.tradeoff_weight_component.parse()?,
            selector: self.select_item_component.parse()?,
            list_size: self.list_size,
            smoothing: self.smoothing,
        })
    }
}

/// Every accepted component name, per family
pub fn catalog() -> ComponentCatalog {
    ComponentCatalog {
        distribution_component: DistributionStrategy::NAMES.to_vec(),
        fairness_component: Divergence::NAMES.to_vec(),
        relevance_component: RelevanceMeasure::NAMES.to_vec(),
        tradeoff_weight_component: TradeoffWeight::NAMES.to_vec(),
        select_item_component: SelectorStrategy::NAMES.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve() {
        let components = CalibrationConfig::default().resolve().unwrap();
        assert_eq!(components.distribution, DistributionStrategy::Cws);
        assert_eq!(components.divergence, Divergence::Kl);
        assert_eq!(components.relevance, RelevanceMeasure::Sum);
        assert_eq!(components.tradeoff_weight, TradeoffWeight::Constant(0.5));
        assert_eq!(components.selector, SelectorStrategy::Surrogate);
        assert_eq!(components.list_size, 10);
    }

    #[test]
    fn test_partial_config_from_json() {
        let config: CalibrationConfig = serde_json::from_str(
            r#"{"fairness_component": "HELLINGER", "tradeoff_weight_component": "VAR", "list_size": 3}"#,
        )
        .unwrap();
        assert_eq!(config.distribution_component, "CWS");

        let components = config.resolve().unwrap();
        assert_eq!(components.divergence, Divergence::Hellinger);
        assert_eq!(components.tradeoff_weight, TradeoffWeight::Variance);
        assert_eq!(components.list_size, 3);
    }

    #[test]
    fn test_minkowski_order_is_forwarded() {
        let config = CalibrationConfig {
            fairness_component: "MINKOWSKI".to_string(),
            minkowski_order: 4,
            ..CalibrationConfig::default()
        };
        assert_eq!(config.resolve().unwrap().divergence, Divergence::Minkowski(4));
    }

    #[test]
    fn test_each_family_rejects_unknown_names() {
        let cases = [
            ("distribution", CalibrationConfig {
                distribution_component: "NOPE".to_string(),
                ..CalibrationConfig::default()
            }),
            ("fairness", CalibrationConfig {
                fairness_component: "NOPE".to_string(),
                ..CalibrationConfig::default()
            }),
            ("relevance", CalibrationConfig {
                relevance_component: "NOPE".to_string(),
                ..CalibrationConfig::default()
            }),
            ("tradeoff_weight", CalibrationConfig {
                tradeoff_weight_component: "NOPE".to_string(),
                ..CalibrationConfig::default()
            }),
            ("select_item", CalibrationConfig {
                select_item_component: "NOPE".to_string(),
                ..CalibrationConfig::default()
            }),
        ];

        for (family, config) in cases {
            match config.resolve() {
                Err(CalibrationError::UnknownComponent { family: f, .. }) => assert_eq!(f, family),
                other => panic!("expected unknown {family} component, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_invalid_parameters() {
        let zero = CalibrationConfig {
            list_size: 0,
            ..CalibrationConfig::default()
        };
        assert!(matches!(zero.resolve(), Err(CalibrationError::InvalidParameter(_))));

        let smoothing = CalibrationConfig {
            smoothing: 1.5,
            ..CalibrationConfig::default()
        };
        assert!(matches!(
            smoothing.resolve(),
            Err(CalibrationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_catalog_lists_defaults() {
        let catalog = catalog();
        assert!(catalog.fairness_component.contains(&"KL"));
        assert!(catalog.distribution_component.contains(&"CWS"));
        assert_eq!(catalog.select_item_component, vec!["SURROGATE", "LOGARITHM_BIAS"]);
        assert!(catalog.distribution_component.contains(&"TWB_GLEB"));
    }
}
