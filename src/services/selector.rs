use std::str::FromStr;

use crate::models::Distribution;

use super::bias::user_bias;
use super::distribution::{DistributionBuilder, WeightedRow};
use super::{CalibrationError, Components, Divergence, RelevanceMeasure};

/// Selection strategies accepted as `select_item_component`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorStrategy {
    /// Greedy one-item-at-a-time construction
    Surrogate,
    /// Greedy construction on a log-compressed utility plus the user bias of
    /// the list
    LogarithmBias,
}

impl SelectorStrategy {
    pub const NAMES: [&'static str; 2] = ["SURROGATE", "LOGARITHM_BIAS"];

    pub fn name(&self) -> &'static str {
        match self {
            SelectorStrategy::Surrogate => "SURROGATE",
            SelectorStrategy::LogarithmBias => "LOGARITHM_BIAS",
        }
    }

    /// Builds the final list for one user
    pub fn select(
        &self,
        components: &Components,
        builder: &DistributionBuilder,
        target: &Distribution,
        pool: &[PoolItem<'_>],
        alpha: f64,
    ) -> Result<Selection, CalibrationError> {
        SurrogateSelector::new(builder, target, components)
            .with_strategy(*self)
            .select(pool, alpha)
    }

    /// Final objective of a hypothetical whose linear tradeoff is `linear`
    fn utility(&self, linear: f64, bias: f64) -> f64 {
        match self {
            SelectorStrategy::Surrogate => linear,
            SelectorStrategy::LogarithmBias => linear.signum() * linear.abs().ln_1p() + bias,
        }
    }
}

impl FromStr for SelectorStrategy {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SURROGATE" => Ok(SelectorStrategy::Surrogate),
            "LOGARITHM_BIAS" | "LOG_BIAS" => Ok(SelectorStrategy::LogarithmBias),
            _ => Err(CalibrationError::UnknownComponent {
                family: "select_item",
                name: s.to_string(),
            }),
        }
    }
}

/// One candidate available to the selector
#[derive(Debug, Clone, Copy)]
pub struct PoolItem<'a> {
    pub item_id: &'a str,
    pub score: f64,
    pub genres: &'a [(usize, f64)],
    /// Score minus the global mean and the item bias
    pub residual: f64,
}

/// Outcome of one selection run
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Indexes into the pool, in rank order
    pub picks: Vec<usize>,
    /// Relevance of the final list
    pub relevance: f64,
    /// Divergence of the final list from the target
    pub divergence: f64,
}

/// Scores of one hypothetical extension of the current list
#[derive(Debug, Clone, Copy)]
struct Hypothetical {
    slot: usize,
    relevance: f64,
    divergence: f64,
    bias: f64,
    objective: f64,
}

/// Greedy calibrated selector
///
/// At every position each remaining candidate is tried at the end of the
/// list. The candidate maximizing
/// `(1 - alpha) * normalized_relevance - alpha * divergence` is kept, where
/// relevance is min-max scaled over the candidates tried at that position.
/// Under [`SelectorStrategy::LogarithmBias`] that value `u` becomes
/// `sign(u) * ln(|u| + 1)` plus the user bias of the hypothetical list.
/// Ties go to the higher score, then to the lowest item id.
pub struct SurrogateSelector<'a> {
    builder: &'a DistributionBuilder,
    target: &'a Distribution,
    strategy: SelectorStrategy,
    divergence: Divergence,
    relevance: RelevanceMeasure,
    smoothing: f64,
    list_size: usize,
}

impl<'a> SurrogateSelector<'a> {
    pub fn new(
        builder: &'a DistributionBuilder,
        target: &'a Distribution,
        components: &Components,
    ) -> Self {
        Self {
            builder,
            target,
            strategy: components.selector,
            divergence: components.divergence,
            relevance: components.relevance,
            smoothing: components.smoothing,
            list_size: components.list_size,
        }
    }

    pub fn with_strategy(mut self, strategy: SelectorStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn select(&self, pool: &[PoolItem<'_>], alpha: f64) -> Result<Selection, CalibrationError> {
        if !self.target.is_finite() {
            return Err(CalibrationError::NonFiniteDistribution {
                context: "target distribution".to_string(),
            });
        }

        let mut realized = self.builder.accumulator();
        let mut remaining: Vec<usize> = (0..pool.len()).collect();
        let mut picks = Vec::with_capacity(self.list_size.min(pool.len()));
        let mut scores: Vec<f64> = Vec::with_capacity(picks.capacity());
        let mut relevance = self.relevance.aggregate(&scores);
        let mut residual_sum = 0.0;

        while picks.len() < self.list_size && !remaining.is_empty() {
            let time = DistributionBuilder::list_time(picks.len() + 1);
            let mut hypotheticals = Vec::with_capacity(remaining.len());

            for (slot, &ix) in remaining.iter().enumerate() {
                let item = &pool[ix];
                let row = WeightedRow {
                    genres: item.genres,
                    value: item.score,
                    time,
                };
                let divergence = self.divergence_of(&realized.with_row(&row), item.item_id)?;

                let extended = self.relevance.extend(&scores, relevance, item.score);
                if !extended.is_finite() {
                    return Err(CalibrationError::NonFiniteValue {
                        context: format!(
                            "{} relevance with {}",
                            self.relevance.name(),
                            item.item_id
                        ),
                    });
                }

                hypotheticals.push(Hypothetical {
                    slot,
                    relevance: extended,
                    divergence,
                    bias: user_bias(residual_sum + item.residual, picks.len() + 1),
                    objective: 0.0,
                });
            }

            score_objectives(&mut hypotheticals, alpha, self.strategy);

            if let Some(bad) = hypotheticals.iter().find(|h| !h.objective.is_finite()) {
                return Err(CalibrationError::NonFiniteValue {
                    context: format!(
                        "selection objective of {}",
                        pool[remaining[bad.slot]].item_id
                    ),
                });
            }

            let best = hypotheticals
                .iter()
                .copied()
                .max_by(|a, b| {
                    let (item_a, item_b) = (&pool[remaining[a.slot]], &pool[remaining[b.slot]]);
                    a.objective
                        .total_cmp(&b.objective)
                        .then_with(|| item_a.score.total_cmp(&item_b.score))
                        .then_with(|| item_b.item_id.cmp(item_a.item_id))
                });

            let Some(best) = best else {
                break;
            };

            let ix = remaining.remove(best.slot);
            let item = &pool[ix];
            tracing::debug!(
                position = picks.len() + 1,
                item_id = item.item_id,
                objective = best.objective,
                divergence = best.divergence,
                "Selected item"
            );

            realized.push(WeightedRow {
                genres: item.genres,
                value: item.score,
                time,
            });
            scores.push(item.score);
            relevance = best.relevance;
            residual_sum += item.residual;
            picks.push(ix);
        }

        let divergence = self.divergence_of(&realized.distribution(), "final list")?;

        Ok(Selection {
            picks,
            relevance,
            divergence,
        })
    }

    fn divergence_of(&self, realized: &Distribution, context: &str) -> Result<f64, CalibrationError> {
        if !realized.is_finite() {
            return Err(CalibrationError::NonFiniteDistribution {
                context: format!("realized distribution with {context}"),
            });
        }

        let smoothed = realized.smoothed_towards(self.target, self.smoothing);
        let divergence = self.divergence.distance(self.target, &smoothed);
        if !divergence.is_finite() {
            return Err(CalibrationError::NonFiniteDistribution {
                context: format!("{} divergence with {context}", self.divergence.name()),
            });
        }

        Ok(divergence)
    }
}

/// Fills in the objective of every hypothetical of one step
fn score_objectives(hypotheticals: &mut [Hypothetical], alpha: f64, strategy: SelectorStrategy) {
    let (min, max) = hypotheticals
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), h| {
            (lo.min(h.relevance), hi.max(h.relevance))
        });
    // Halved so the span of finite extremes stays finite
    let span = max / 2.0 - min / 2.0;

    for h in hypotheticals.iter_mut() {
        let normalized = if span > 0.0 {
            (h.relevance / 2.0 - min / 2.0) / span
        } else {
            1.0
        };
        let linear = (1.0 - alpha) * normalized - alpha * h.divergence;
        h.objective = strategy.utility(linear, h.bias);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemRecord;
    use crate::services::{CalibrationConfig, DistributionStrategy, ItemCatalog};
    use std::cmp::Ordering;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn relevance_order(pool: &[PoolItem<'_>]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..pool.len()).collect();
        order.sort_by(|&a, &b| match pool[b].score.total_cmp(&pool[a].score) {
            Ordering::Equal => pool[a].item_id.cmp(pool[b].item_id),
            other => other,
        });
        order
    }

    fn catalog() -> Arc<ItemCatalog> {
        Arc::new(
            ItemCatalog::new(&[
                ItemRecord::new("A", ["Action"]),
                ItemRecord::new("B", ["Drama"]),
                ItemRecord::new("C", ["Action"]),
                ItemRecord::new("D", ["Comedy", "Drama"]),
                ItemRecord::new("E", ["Comedy"]),
                ItemRecord::new("F", ["Action", "Comedy"]),
            ])
            .unwrap(),
        )
    }

    fn components(weight: &str, list_size: usize) -> Components {
        CalibrationConfig {
            tradeoff_weight_component: weight.to_string(),
            list_size,
            ..CalibrationConfig::default()
        }
        .resolve()
        .unwrap()
    }

    fn pool<'a>(catalog: &'a ItemCatalog, items: &[(&'a str, f64)]) -> Vec<PoolItem<'a>> {
        items
            .iter()
            .map(|&(item_id, score)| PoolItem {
                item_id,
                score,
                genres: catalog.genre_weights(item_id).unwrap(),
                residual: 0.0,
            })
            .collect()
    }

    fn target(catalog: &Arc<ItemCatalog>, mass: Vec<f64>) -> Distribution {
        Distribution::from_mass(Arc::clone(catalog.genre_index()), mass)
    }

    fn ids<'a>(pool: &[PoolItem<'a>], selection: &Selection) -> Vec<&'a str> {
        selection.picks.iter().map(|&ix| pool[ix].item_id).collect()
    }

    #[test]
    fn test_balances_majority_and_minority_genre() {
        let catalog = catalog();
        let builder = DistributionBuilder::new(DistributionStrategy::Cws, Arc::clone(&catalog));
        // Action, Comedy, Drama
        let target = target(&catalog, vec![0.6, 0.0, 0.4]);
        let components = components("C@0.5", 2);
        let pool = pool(&catalog, &[("A", 5.0), ("B", 4.0), ("C", 3.0)]);

        let selection = SurrogateSelector::new(&builder, &target, &components)
            .select(&pool, 0.5)
            .unwrap();

        assert_eq!(ids(&pool, &selection), vec!["A", "B"]);
        assert_eq!(selection.relevance, 9.0);
        assert!(selection.divergence >= 0.0);
    }

    #[test]
    fn test_zero_alpha_sorts_by_score() {
        let catalog = catalog();
        let builder = DistributionBuilder::new(DistributionStrategy::Cws, Arc::clone(&catalog));
        let target = target(&catalog, vec![0.0, 0.0, 1.0]);
        let components = components("C@0", 6);
        let pool = pool(
            &catalog,
            &[("E", 1.0), ("A", 4.0), ("C", 4.0), ("B", 2.5), ("F", 0.5), ("D", 3.0)],
        );

        let selection = SurrogateSelector::new(&builder, &target, &components)
            .select(&pool, 0.0)
            .unwrap();

        let expected: Vec<&str> = relevance_order(&pool).iter().map(|&ix| pool[ix].item_id).collect();
        assert_eq!(expected, vec!["A", "C", "D", "B", "E", "F"]);
        assert_eq!(ids(&pool, &selection), expected);
    }

    #[test]
    fn test_full_alpha_follows_target() {
        let catalog = catalog();
        let builder = DistributionBuilder::new(DistributionStrategy::Vws, Arc::clone(&catalog));
        let target = target(&catalog, vec![0.0, 0.0, 1.0]);
        let components = components("C@1", 1);
        let pool = pool(&catalog, &[("A", 9.0), ("B", 1.0), ("C", 8.0)]);

        let selection = SurrogateSelector::new(&builder, &target, &components)
            .select(&pool, 1.0)
            .unwrap();

        assert_eq!(ids(&pool, &selection), vec!["B"]);
    }

    #[test]
    fn test_never_exceeds_list_size_or_duplicates() {
        let catalog = catalog();
        let builder = DistributionBuilder::new(DistributionStrategy::Twb, Arc::clone(&catalog));
        let target = target(&catalog, vec![0.3, 0.3, 0.4]);
        let components = components("C@0.7", 4);
        let pool = pool(
            &catalog,
            &[("A", 1.0), ("B", 2.0), ("C", 3.0), ("D", 4.0), ("E", 5.0), ("F", 6.0)],
        );

        let selection = SurrogateSelector::new(&builder, &target, &components)
            .select(&pool, 0.7)
            .unwrap();

        assert_eq!(selection.picks.len(), 4);
        let unique: HashSet<usize> = selection.picks.iter().copied().collect();
        assert_eq!(unique.len(), 4);
        assert!(selection.picks.iter().all(|&ix| ix < pool.len()));
    }

    #[test]
    fn test_short_pool_gives_short_list() {
        let catalog = catalog();
        let builder = DistributionBuilder::new(DistributionStrategy::Cws, Arc::clone(&catalog));
        let target = target(&catalog, vec![1.0, 1.0, 1.0]);
        let components = components("C@0.5", 10);
        let pool = pool(&catalog, &[("A", 1.0), ("B", 2.0)]);

        let selection = SurrogateSelector::new(&builder, &target, &components)
            .select(&pool, 0.5)
            .unwrap();
        assert_eq!(selection.picks.len(), 2);
    }

    #[test]
    fn test_empty_pool() {
        let catalog = catalog();
        let builder = DistributionBuilder::new(DistributionStrategy::Cws, Arc::clone(&catalog));
        let target = target(&catalog, vec![1.0, 0.0, 0.0]);
        let components = components("C@0.5", 3);

        let selection = SurrogateSelector::new(&builder, &target, &components)
            .select(&[], 0.5)
            .unwrap();
        assert!(selection.picks.is_empty());
        assert_eq!(selection.relevance, 0.0);
    }

    #[test]
    fn test_equal_candidates_break_ties_by_id() {
        let catalog = catalog();
        let builder = DistributionBuilder::new(DistributionStrategy::Cws, Arc::clone(&catalog));
        let target = target(&catalog, vec![1.0, 0.0, 0.0]);
        let components = components("C@0.5", 1);
        let pool = pool(&catalog, &[("C", 2.0), ("A", 2.0)]);

        let selection = SurrogateSelector::new(&builder, &target, &components)
            .select(&pool, 0.5)
            .unwrap();
        assert_eq!(ids(&pool, &selection), vec!["A"]);
    }

    #[test]
    fn test_non_finite_target_fails() {
        let catalog = catalog();
        let builder = DistributionBuilder::new(DistributionStrategy::Cws, Arc::clone(&catalog));
        let target = target(&catalog, vec![f64::NAN, 1.0, 0.0]);
        let components = components("C@0.5", 1);
        let pool = pool(&catalog, &[("A", 1.0)]);

        let result = SurrogateSelector::new(&builder, &target, &components).select(&pool, 0.5);
        assert!(matches!(
            result,
            Err(CalibrationError::NonFiniteDistribution { .. })
        ));
    }

    #[test]
    fn test_strategy_dispatch() {
        let catalog = catalog();
        let builder = DistributionBuilder::new(DistributionStrategy::Cws, Arc::clone(&catalog));
        let target = target(&catalog, vec![0.6, 0.0, 0.4]);
        let components = components("C@0.5", 2);
        let pool = pool(&catalog, &[("A", 5.0), ("B", 4.0), ("C", 3.0)]);

        let selection = SelectorStrategy::Surrogate
            .select(&components, &builder, &target, &pool, 0.5)
            .unwrap();
        assert_eq!(ids(&pool, &selection), vec!["A", "B"]);
        assert!("GREEDY_PLUS".parse::<SelectorStrategy>().is_err());
        for name in SelectorStrategy::NAMES {
            assert_eq!(name.parse::<SelectorStrategy>().unwrap().name(), name);
        }
    }

    #[test]
    fn test_logarithm_bias_follows_user_bias() {
        let catalog = catalog();
        let builder = DistributionBuilder::new(DistributionStrategy::Cws, Arc::clone(&catalog));
        let target = target(&catalog, vec![1.0, 0.0, 0.0]);
        let components = components("C@0", 1);
        let mut pool = pool(&catalog, &[("A", 5.0), ("C", 4.0)]);
        // "A" scores above what its history predicts, "C" well below
        pool[0].residual = -4.0;
        pool[1].residual = 2.0;

        let linear = SelectorStrategy::Surrogate
            .select(&components, &builder, &target, &pool, 0.0)
            .unwrap();
        let biased = SelectorStrategy::LogarithmBias
            .select(&components, &builder, &target, &pool, 0.0)
            .unwrap();

        assert_eq!(ids(&pool, &linear), vec!["A"]);
        assert_eq!(ids(&pool, &biased), vec!["C"]);
    }

    #[test]
    fn test_log_utility_keeps_sign() {
        let strategy = SelectorStrategy::LogarithmBias;
        assert_eq!(strategy.utility(0.0, 0.0), 0.0);
        assert!((strategy.utility(1.0, 0.0) - 2f64.ln()).abs() < 1e-12);
        assert!((strategy.utility(-1.0, 0.5) - (0.5 - 2f64.ln())).abs() < 1e-12);
        assert_eq!(SelectorStrategy::Surrogate.utility(-0.25, 9.0), -0.25);
    }

    #[test]
    fn test_overflowing_relevance_fails() {
        let catalog = catalog();
        // Counts only, so the genre mass stays finite
        let builder = DistributionBuilder::new(DistributionStrategy::Pgd, Arc::clone(&catalog));
        let target = target(&catalog, vec![1.0, 0.0, 0.0]);
        let components = components("C@0.5", 2);
        let pool = pool(&catalog, &[("A", f64::MAX), ("C", f64::MAX)]);

        let result = SurrogateSelector::new(&builder, &target, &components).select(&pool, 0.5);
        assert!(matches!(result, Err(CalibrationError::NonFiniteValue { .. })));
    }

    #[test]
    fn test_wide_relevance_range_keeps_order() {
        let catalog = catalog();
        let builder = DistributionBuilder::new(DistributionStrategy::Cws, Arc::clone(&catalog));
        let target = target(&catalog, vec![1.0, 0.0, 0.0]);
        let components = components("C@0", 1);
        let pool = pool(&catalog, &[("C", -f64::MAX), ("A", f64::MAX), ("F", 0.0)]);

        let selection = SurrogateSelector::new(&builder, &target, &components)
            .select(&pool, 0.0)
            .unwrap();
        assert_eq!(ids(&pool, &selection), vec!["A"]);
    }
}
