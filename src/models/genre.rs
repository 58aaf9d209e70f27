use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Tolerance used when checking that a distribution sums to one
pub const SUM_TOLERANCE: f64 = 1e-9;

/// Fixed genre vocabulary shared by every distribution of one run
///
/// Genres are stored in sorted order so that two indexes built from the same
/// metadata always assign the same positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenreIndex {
    genres: Vec<String>,
    positions: HashMap<String, usize>,
}

impl GenreIndex {
    /// Builds the vocabulary as the union of the given genre labels
    pub fn new<I, S>(genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: BTreeSet<String> = genres.into_iter().map(Into::into).collect();
        let genres: Vec<String> = sorted.into_iter().collect();
        let positions = genres
            .iter()
            .enumerate()
            .map(|(ix, genre)| (genre.clone(), ix))
            .collect();

        Self { genres, positions }
    }

    pub fn len(&self) -> usize {
        self.genres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genres.is_empty()
    }

    /// Position of a genre in the vocabulary
    pub fn position(&self, genre: &str) -> Option<usize> {
        self.positions.get(genre).copied()
    }

    pub fn genres(&self) -> &[String] {
        &self.genres
    }
}

/// Probability distribution over a [`GenreIndex`]
///
/// Values are non-negative and sum to one. Every operation that changes the
/// mass produces a new value; a distribution is never mutated in place.
#[derive(Debug, Clone)]
pub struct Distribution {
    index: Arc<GenreIndex>,
    values: Vec<f64>,
}

impl Distribution {
    /// Normalizes raw mass into a distribution
    ///
    /// Negative mass counts as zero. A zero total yields the uniform
    /// distribution, which is how users without history and empty lists are
    /// represented.
    pub fn from_mass(index: Arc<GenreIndex>, mut mass: Vec<f64>) -> Self {
        debug_assert_eq!(mass.len(), index.len());
        for value in mass.iter_mut() {
            // NaN compares false and survives
            if *value < 0.0 {
                *value = 0.0;
            }
        }
        let total: f64 = mass.iter().sum();

        if total > 0.0 {
            for value in mass.iter_mut() {
                *value /= total;
            }
            Self {
                index,
                values: mass,
            }
        } else if total.is_nan() {
            // Keep the NaN so callers can reject it instead of hiding it
            Self {
                index,
                values: mass,
            }
        } else {
            Self::uniform(index)
        }
    }

    /// Uniform distribution over the whole vocabulary
    pub fn uniform(index: Arc<GenreIndex>) -> Self {
        let n = index.len();
        let value = if n == 0 { 0.0 } else { 1.0 / n as f64 };
        Self {
            values: vec![value; n],
            index,
        }
    }

    pub fn index(&self) -> &Arc<GenreIndex> {
        &self.index
    }

    /// Probability values in vocabulary order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Probability of a genre; unknown genres have probability zero
    pub fn get(&self, genre: &str) -> f64 {
        self.index
            .position(genre)
            .map(|ix| self.values[ix])
            .unwrap_or(0.0)
    }

    /// Iterates `(genre, probability)` pairs in vocabulary order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.index
            .genres()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// True when every value is finite
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Mixes this (realized) distribution with a target distribution:
    /// `(1 - weight) * self + weight * target`
    ///
    /// Every genre with positive target mass keeps positive mass afterwards,
    /// so logarithmic measures stay finite.
    pub fn smoothed_towards(&self, target: &Distribution, weight: f64) -> Distribution {
        let values = self
            .values
            .iter()
            .zip(target.values.iter())
            .map(|(q, p)| (1.0 - weight) * q + weight * p)
            .collect();

        Distribution {
            index: Arc::clone(&self.index),
            values,
        }
    }

    /// Copies the distribution into a genre-keyed map
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.iter().map(|(g, v)| (g.to_string(), v)).collect()
    }
}

impl PartialEq for Distribution {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.values == other.values
    }
}

impl Serialize for Distribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}
