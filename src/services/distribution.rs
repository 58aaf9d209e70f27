use std::str::FromStr;
use std::sync::Arc;

use crate::models::{Distribution, GenreIndex, Transaction};

use super::{CalibrationError, ItemCatalog};

/// Value given to a genre that is present in the rows but whose weighted
/// ratio came out as zero
const PRESENT_GENRE_FLOOR: f64 = 0.00001;

/// How rows are turned into genre mass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionStrategy {
    /// Pure genre count
    Pgd,
    /// Value-weighted even split
    Vws,
    /// Class weighted strategy
    Cws,
    /// Time weighted based
    Twb,
    /// Time genre distribution
    Tgd,
    /// Global-local entropy based
    Gleb,
    /// Global-local entropy weighted by recency
    TwbGleb,
}

impl DistributionStrategy {
    pub const NAMES: [&'static str; 7] = ["PGD", "VWS", "CWS", "TWB", "TGD", "GLEB", "TWB_GLEB"];

    pub fn name(&self) -> &'static str {
        match self {
            DistributionStrategy::Pgd => "PGD",
            DistributionStrategy::Vws => "VWS",
            DistributionStrategy::Cws => "CWS",
            DistributionStrategy::Twb => "TWB",
            DistributionStrategy::Tgd => "TGD",
            DistributionStrategy::Gleb => "GLEB",
            DistributionStrategy::TwbGleb => "TWB_GLEB",
        }
    }

    fn is_entropy(&self) -> bool {
        matches!(self, DistributionStrategy::Gleb | DistributionStrategy::TwbGleb)
    }

    /// Ratio strategies divide a per-genre numerator by a per-genre denominator
    fn is_ratio(&self) -> bool {
        !matches!(self, DistributionStrategy::Pgd | DistributionStrategy::Vws)
    }

    /// `(numerator, denominator)` added to a genre by one row
    fn contribution(&self, row: &WeightedRow<'_>, genre_weight: f64) -> (f64, f64) {
        let value = row.value.max(0.0);
        match self {
            DistributionStrategy::Pgd => (genre_weight, 0.0),
            DistributionStrategy::Vws => (value * genre_weight, 0.0),
            DistributionStrategy::Cws => (value * genre_weight, value),
            DistributionStrategy::Twb => (row.time * value * genre_weight, value),
            DistributionStrategy::Tgd => (row.time * genre_weight, row.time),
            // Needs the global genre shares, computed over the full row set
            DistributionStrategy::Gleb | DistributionStrategy::TwbGleb => (0.0, 0.0),
        }
    }
}

impl FromStr for DistributionStrategy {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PGD" => Ok(DistributionStrategy::Pgd),
            "VWS" => Ok(DistributionStrategy::Vws),
            "CWS" => Ok(DistributionStrategy::Cws),
            "TWB" => Ok(DistributionStrategy::Twb),
            "TGD" => Ok(DistributionStrategy::Tgd),
            "GLEB" => Ok(DistributionStrategy::Gleb),
            "TWB_GLEB" => Ok(DistributionStrategy::TwbGleb),
            _ => Err(CalibrationError::UnknownComponent {
                family: "distribution",
                name: s.to_string(),
            }),
        }
    }
}

/// One item as seen by the distribution builder
#[derive(Debug, Clone, Copy)]
pub struct WeightedRow<'a> {
    pub genres: &'a [(usize, f64)],
    /// Transaction value or predicted score
    pub value: f64,
    /// Recency weight in `[0, 1]`
    pub time: f64,
}

/// Running genre mass of a growing row set
///
/// Linear strategies keep per-genre sums so that testing one more row costs
/// O(genres). The entropy strategies depend on the genre shares of the whole
/// set and are rebuilt from the stored rows instead.
#[derive(Debug, Clone)]
pub struct DistributionAccumulator<'a> {
    strategy: DistributionStrategy,
    index: Arc<GenreIndex>,
    numerator: Vec<f64>,
    denominator: Vec<f64>,
    present: Vec<u32>,
    rows: Vec<WeightedRow<'a>>,
}

impl<'a> DistributionAccumulator<'a> {
    pub fn new(strategy: DistributionStrategy, index: Arc<GenreIndex>) -> Self {
        let n = index.len();
        Self {
            strategy,
            index,
            numerator: vec![0.0; n],
            denominator: vec![0.0; n],
            present: vec![0; n],
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, row: WeightedRow<'a>) {
        Self::apply(
            self.strategy,
            &row,
            &mut self.numerator,
            &mut self.denominator,
            &mut self.present,
        );
        self.rows.push(row);
    }

    /// Distribution of the rows pushed so far
    pub fn distribution(&self) -> Distribution {
        let mass = if self.strategy.is_entropy() {
            gleb_mass(self.strategy, self.index.len(), self.rows.iter())
        } else {
            finish_mass(self.strategy, &self.numerator, &self.denominator, &self.present)
        };
        Distribution::from_mass(Arc::clone(&self.index), mass)
    }

    /// Distribution the rows would have after pushing `row`, leaving `self`
    /// untouched
    pub fn with_row(&self, row: &WeightedRow<'a>) -> Distribution {
        let mass = if self.strategy.is_entropy() {
            gleb_mass(
                self.strategy,
                self.index.len(),
                self.rows.iter().chain(std::iter::once(row)),
            )
        } else {
            let mut numerator = self.numerator.clone();
            let mut denominator = self.denominator.clone();
            let mut present = self.present.clone();
            Self::apply(self.strategy, row, &mut numerator, &mut denominator, &mut present);
            finish_mass(self.strategy, &numerator, &denominator, &present)
        };
        Distribution::from_mass(Arc::clone(&self.index), mass)
    }

    fn apply(
        strategy: DistributionStrategy,
        row: &WeightedRow<'_>,
        numerator: &mut [f64],
        denominator: &mut [f64],
        present: &mut [u32],
    ) {
        for &(ix, weight) in row.genres {
            let (num, den) = strategy.contribution(row, weight);
            numerator[ix] += num;
            denominator[ix] += den;
            present[ix] += 1;
        }
    }
}

fn finish_mass(
    strategy: DistributionStrategy,
    numerator: &[f64],
    denominator: &[f64],
    present: &[u32],
) -> Vec<f64> {
    if !strategy.is_ratio() {
        return numerator.to_vec();
    }

    numerator
        .iter()
        .zip(denominator)
        .zip(present)
        .map(|((&num, &den), &count)| ratio_or_floor(num, den, count))
        .collect()
}

fn ratio_or_floor(numerator: f64, denominator: f64, count: u32) -> f64 {
    if count == 0 {
        0.0
    } else if numerator > 0.0 && denominator > 0.0 {
        numerator / denominator
    } else if numerator.is_nan() || denominator.is_nan() {
        f64::NAN
    } else {
        PRESENT_GENRE_FLOOR
    }
}

fn gleb_mass<'r, 'a: 'r>(
    strategy: DistributionStrategy,
    genres: usize,
    rows: impl Iterator<Item = &'r WeightedRow<'a>> + Clone,
) -> Vec<f64> {
    let mut occurrences = vec![0u32; genres];
    for row in rows.clone() {
        for &(ix, _) in row.genres {
            occurrences[ix] += 1;
        }
    }

    let total: u32 = occurrences.iter().sum();
    if total == 0 {
        return vec![0.0; genres];
    }

    let mut numerator = vec![0.0; genres];
    let mut denominator = vec![0.0; genres];
    for row in rows {
        let value = row.value.max(0.0);
        let time = match strategy {
            DistributionStrategy::TwbGleb => row.time,
            _ => 1.0,
        };
        for &(ix, weight) in row.genres {
            let share = occurrences[ix] as f64 / total as f64 * weight;
            let entropy = -share * share.log2();
            numerator[ix] += value * time * entropy;
            denominator[ix] += value;
        }
    }

    numerator
        .iter()
        .zip(&denominator)
        .zip(&occurrences)
        .map(|((&num, &den), &count)| ratio_or_floor(num, den, count))
        .collect()
}

/// Builds target and realized distributions against one item catalog
#[derive(Debug, Clone)]
pub struct DistributionBuilder {
    strategy: DistributionStrategy,
    catalog: Arc<ItemCatalog>,
}

impl DistributionBuilder {
    pub fn new(strategy: DistributionStrategy, catalog: Arc<ItemCatalog>) -> Self {
        Self { strategy, catalog }
    }

    pub fn strategy(&self) -> DistributionStrategy {
        self.strategy
    }

    pub fn catalog(&self) -> &Arc<ItemCatalog> {
        &self.catalog
    }

    /// Recency weight of the item at a 1-based list position
    pub fn list_time(position: usize) -> f64 {
        1.0 / position.max(1) as f64
    }

    pub fn accumulator<'a>(&self) -> DistributionAccumulator<'a> {
        DistributionAccumulator::new(self.strategy, Arc::clone(self.catalog.genre_index()))
    }

    /// Distribution of an arbitrary row set
    pub fn build<'a>(&self, rows: impl IntoIterator<Item = WeightedRow<'a>>) -> Distribution {
        let mut acc = self.accumulator();
        for row in rows {
            acc.push(row);
        }
        acc.distribution()
    }

    /// Target distribution of one user's history
    ///
    /// Timestamps are min-max scaled into `[0, 1]`; a history whose rows all
    /// share one timestamp gets time 1.0 everywhere. No history yields the
    /// uniform distribution.
    pub fn target(&self, transactions: &[&Transaction]) -> Result<Distribution, CalibrationError> {
        let (min, max) = transactions
            .iter()
            .fold((i64::MAX, i64::MIN), |(lo, hi), t| {
                (lo.min(t.timestamp), hi.max(t.timestamp))
            });
        let span = max.saturating_sub(min) as f64;

        let mut acc = self.accumulator();
        for transaction in transactions {
            let time = if span > 0.0 {
                (transaction.timestamp.saturating_sub(min)) as f64 / span
            } else {
                1.0
            };
            acc.push(WeightedRow {
                genres: self.catalog.genre_weights(&transaction.item_id)?,
                value: transaction.transaction_value,
                time,
            });
        }

        Ok(acc.distribution())
    }
}
