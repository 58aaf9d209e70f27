use std::str::FromStr;

use super::CalibrationError;

/// Summarizes the scores of an ordered list into one number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelevanceMeasure {
    Sum,
    /// Exponential gain, log discount, normalized by the ideal ordering
    Ndcg,
    /// Linear gain, log discount
    Dcg,
}

impl RelevanceMeasure {
    pub const NAMES: [&'static str; 3] = ["SUM", "NDCG", "DCG"];

    pub fn name(&self) -> &'static str {
        match self {
            RelevanceMeasure::Sum => "SUM",
            RelevanceMeasure::Ndcg => "NDCG",
            RelevanceMeasure::Dcg => "DCG",
        }
    }

    /// Relevance of `scores` in list order
    pub fn aggregate(&self, scores: &[f64]) -> f64 {
        match self {
            RelevanceMeasure::Sum => scores.iter().sum(),
            RelevanceMeasure::Dcg => scores
                .iter()
                .enumerate()
                .map(|(ix, s)| s / discount(ix))
                .sum(),
            RelevanceMeasure::Ndcg => ndcg(scores),
        }
    }

    /// Relevance of `prefix` followed by `next`
    ///
    /// `prefix_value` must be `self.aggregate(prefix)`. SUM and DCG only add
    /// one term; NDCG renormalizes against the new ideal ordering.
    pub fn extend(&self, prefix: &[f64], prefix_value: f64, next: f64) -> f64 {
        match self {
            RelevanceMeasure::Sum => prefix_value + next,
            RelevanceMeasure::Dcg => prefix_value + next / discount(prefix.len()),
            RelevanceMeasure::Ndcg => {
                let mut scores = Vec::with_capacity(prefix.len() + 1);
                scores.extend_from_slice(prefix);
                scores.push(next);
                ndcg(&scores)
            }
        }
    }
}

impl FromStr for RelevanceMeasure {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUM" => Ok(RelevanceMeasure::Sum),
            "NDCG" => Ok(RelevanceMeasure::Ndcg),
            "DCG" => Ok(RelevanceMeasure::Dcg),
            _ => Err(CalibrationError::UnknownComponent {
                family: "relevance",
                name: s.to_string(),
            }),
        }
    }
}

/// Discount of a 0-based position
fn discount(ix: usize) -> f64 {
    (ix as f64 + 2.0).log2()
}

fn discounted(gains: impl Iterator<Item = f64>) -> f64 {
    gains.enumerate().map(|(ix, gain)| gain / discount(ix)).sum()
}

/// Normalized DCG with gain `2^s - 1`
///
/// Gains are taken relative to the top score, `2^(s - top) - 2^-top`, which
/// only rescales them and cannot overflow. When no score has a positive gain
/// the list is ranked on `2^(s - top)` alone. Either way the ideal ordering
/// scores exactly 1.0, for any finite scores. Empty lists score zero.
pub fn ndcg(scores: &[f64]) -> f64 {
    let mut ideal = scores.to_vec();
    ideal.sort_by(|a, b| b.total_cmp(a));
    let Some(&top) = ideal.first() else {
        return 0.0;
    };

    let offset = (-top).exp2();
    let gain = |s: &f64| (s - top).exp2() - offset;
    let idcg = discounted(ideal.iter().map(gain));
    if idcg > 0.0 && idcg.is_finite() {
        return discounted(scores.iter().map(gain)) / idcg;
    }

    let shifted = |s: &f64| (s - top).exp2();
    discounted(scores.iter().map(shifted)) / discounted(ideal.iter().map(shifted))
}
