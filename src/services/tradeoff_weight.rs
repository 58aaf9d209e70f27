use std::fmt;
use std::str::FromStr;

use crate::models::Distribution;

use super::divergence::Divergence;
use super::relevance::ndcg;
use super::CalibrationError;

/// Per-user inputs a weight policy may read besides the target distribution
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightContext<'a> {
    /// Candidate scores in the order the recommender produced them
    pub candidate_scores: &'a [f64],
    /// Genre distribution of the whole candidate pool
    pub candidate_distribution: Option<&'a Distribution>,
}

/// Policy producing the tradeoff weight `alpha` of one user
///
/// Higher values push the selector towards the target distribution, lower
/// values towards raw relevance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TradeoffWeight {
    /// `C@<x>`: the same weight for every user
    Constant(f64),
    /// Share of genres the user has consumed
    GenreCount,
    /// One minus the variance of the target
    Variance,
    /// One minus the standard deviation of the target
    StdDev,
    /// Mean of the target
    Trust,
    /// One minus the mean pairwise gap of the target
    Amplitude,
    /// Variance over squared mean of the target
    Efficiency,
    /// Harmonic blend of candidate NDCG and target/candidate similarity
    Mitigation,
}

impl TradeoffWeight {
    pub const NAMES: [&'static str; 8] = ["C@<x>", "CGR", "VAR", "STD", "TRT", "AMP", "EFF", "MIT"];

    /// True when [`TradeoffWeight::alpha`] reads the candidate-pool distribution
    pub fn needs_candidate_distribution(&self) -> bool {
        matches!(self, TradeoffWeight::Mitigation)
    }

    pub fn alpha(
        &self,
        target: &Distribution,
        context: &WeightContext<'_>,
    ) -> Result<f64, CalibrationError> {
        let p = target.values();
        let n = p.len().max(1) as f64;

        let raw = match self {
            TradeoffWeight::Constant(value) => *value,
            TradeoffWeight::GenreCount => p.iter().filter(|v| **v > 0.0).count() as f64 / n,
            TradeoffWeight::Variance => 1.0 - variance(p),
            TradeoffWeight::StdDev => 1.0 - variance(p).sqrt(),
            TradeoffWeight::Trust => mean(p),
            TradeoffWeight::Amplitude => {
                let magnitude: f64 = p
                    .iter()
                    .map(|y| p.iter().map(|x| (x - y).abs()).sum::<f64>())
                    .sum();
                1.0 - magnitude / (n * n)
            }
            TradeoffWeight::Efficiency => {
                let m = mean(p);
                if m == 0.0 {
                    0.0
                } else {
                    variance(p) / (m * m)
                }
            }
            TradeoffWeight::Mitigation => {
                let relevance = ndcg(context.candidate_scores);
                let similarity = match context.candidate_distribution {
                    Some(candidates) => {
                        1.0 - Divergence::JensenShannon.distance(target, candidates)
                    }
                    None => 1.0,
                };
                if relevance + similarity == 0.0 {
                    0.0
                } else {
                    (relevance * similarity) / (relevance + similarity)
                }
            }
        };

        if !raw.is_finite() {
            return Err(CalibrationError::NonFiniteValue {
                context: format!("tradeoff weight {self}"),
            });
        }

        Ok(raw.clamp(0.0, 1.0))
    }
}

impl fmt::Display for TradeoffWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeoffWeight::Constant(value) => write!(f, "C@{value}"),
            TradeoffWeight::GenreCount => f.write_str("CGR"),
            TradeoffWeight::Variance => f.write_str("VAR"),
            TradeoffWeight::StdDev => f.write_str("STD"),
            TradeoffWeight::Trust => f.write_str("TRT"),
            TradeoffWeight::Amplitude => f.write_str("AMP"),
            TradeoffWeight::Efficiency => f.write_str("EFF"),
            TradeoffWeight::Mitigation => f.write_str("MIT"),
        }
    }
}

impl FromStr for TradeoffWeight {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase();

        if let Some(value) = name.strip_prefix("C@") {
            let value: f64 = value.parse().map_err(|_| {
                CalibrationError::InvalidParameter(format!("constant tradeoff weight in {s}"))
            })?;
            if !(0.0..=1.0).contains(&value) {
                return Err(CalibrationError::InvalidParameter(format!(
                    "constant tradeoff weight must be within [0, 1], got {value}"
                )));
            }
            return Ok(TradeoffWeight::Constant(value));
        }

        match name.as_str() {
            "CGR" => Ok(TradeoffWeight::GenreCount),
            "VAR" => Ok(TradeoffWeight::Variance),
            "STD" => Ok(TradeoffWeight::StdDev),
            "TRT" => Ok(TradeoffWeight::Trust),
            "AMP" => Ok(TradeoffWeight::Amplitude),
            "EFF" => Ok(TradeoffWeight::Efficiency),
            "MIT" => Ok(TradeoffWeight::Mitigation),
            _ => Err(CalibrationError::UnknownComponent {
                family: "tradeoff_weight",
                name: s.to_string(),
            }),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}
