use crate::models::Distribution;

use super::CalibrationError;

/// Stand-in for a zero denominator or a zero argument of a logarithm
const EPSILON: f64 = 0.00001;

/// Divergence between a target and a realized distribution
///
/// Every variant is non-negative, zero when both distributions are equal and
/// finite on the whole simplex. Terms follow `0 * log(0) = 0`; a zero
/// denominator facing a non-zero numerator is replaced by a small constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Divergence {
    Kl,
    Jeffreys,
    KDivergence,
    Topsoe,
    JensenShannon,
    JensenDifference,
    Hellinger,
    Bhattacharyya,
    Matusita,
    SquaredChord,
    PearsonChiSquare,
    Neyman,
    SquaredChi,
    ProbabilisticChi,
    Clark,
    SquaredEuclidean,
    Euclidean,
    CityBlock,
    Chebyshev,
    Minkowski(u32),
    Intersection,
    WeightedTotalVariation,
}

impl Divergence {
    pub const NAMES: [&'static str; 22] = [
        "KL",
        "JEFFREYS",
        "K_DIV",
        "TOPSOE",
        "JENSEN_SHANNON",
        "JENSEN_DIFF",
        "HELLINGER",
        "BHATTACHARYYA",
        "MATUSITA",
        "SQUARED_CHORD",
        "CHI_SQUARE",
        "NEYMAN",
        "SQUARED_CHI",
        "PROBABILISTIC_CHI",
        "CLARK",
        "SQUARED_EUCLIDEAN",
        "EUCLIDEAN",
        "CITY_BLOCK",
        "CHEBYSHEV",
        "MINKOWSKI",
        "INTERSECTION",
        "WTV",
    ];

    /// Resolves a configured name; `minkowski_order` is only read for
    /// `MINKOWSKI`
    pub fn from_name(name: &str, minkowski_order: u32) -> Result<Self, CalibrationError> {
        let divergence = match name.trim().to_ascii_uppercase().as_str() {
            "KL" => Divergence::Kl,
            "JEFFREYS" => Divergence::Jeffreys,
            "K_DIV" => Divergence::KDivergence,
            "TOPSOE" => Divergence::Topsoe,
            "JENSEN_SHANNON" | "JS" => Divergence::JensenShannon,
            "JENSEN_DIFF" => Divergence::JensenDifference,
            "HELLINGER" => Divergence::Hellinger,
            "BHATTACHARYYA" => Divergence::Bhattacharyya,
            "MATUSITA" => Divergence::Matusita,
            "SQUARED_CHORD" => Divergence::SquaredChord,
            "CHI_SQUARE" | "PEARSON" => Divergence::PearsonChiSquare,
            "NEYMAN" => Divergence::Neyman,
            "SQUARED_CHI" => Divergence::SquaredChi,
            "PROBABILISTIC_CHI" => Divergence::ProbabilisticChi,
            "CLARK" => Divergence::Clark,
            "SQUARED_EUCLIDEAN" => Divergence::SquaredEuclidean,
            "EUCLIDEAN" => Divergence::Euclidean,
            "CITY_BLOCK" => Divergence::CityBlock,
            "CHEBYSHEV" => Divergence::Chebyshev,
            "MINKOWSKI" => {
                if minkowski_order == 0 {
                    return Err(CalibrationError::InvalidParameter(
                        "minkowski_order must be at least 1".to_string(),
                    ));
                }
                Divergence::Minkowski(minkowski_order)
            }
            "INTERSECTION" => Divergence::Intersection,
            "WTV" => Divergence::WeightedTotalVariation,
            _ => {
                return Err(CalibrationError::UnknownComponent {
                    family: "fairness",
                    name: name.to_string(),
                })
            }
        };

        Ok(divergence)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Divergence::Kl => "KL",
            Divergence::Jeffreys => "JEFFREYS",
            Divergence::KDivergence => "K_DIV",
            Divergence::Topsoe => "TOPSOE",
            Divergence::JensenShannon => "JENSEN_SHANNON",
            Divergence::JensenDifference => "JENSEN_DIFF",
            Divergence::Hellinger => "HELLINGER",
            Divergence::Bhattacharyya => "BHATTACHARYYA",
            Divergence::Matusita => "MATUSITA",
            Divergence::SquaredChord => "SQUARED_CHORD",
            Divergence::PearsonChiSquare => "CHI_SQUARE",
            Divergence::Neyman => "NEYMAN",
            Divergence::SquaredChi => "SQUARED_CHI",
            Divergence::ProbabilisticChi => "PROBABILISTIC_CHI",
            Divergence::Clark => "CLARK",
            Divergence::SquaredEuclidean => "SQUARED_EUCLIDEAN",
            Divergence::Euclidean => "EUCLIDEAN",
            Divergence::CityBlock => "CITY_BLOCK",
            Divergence::Chebyshev => "CHEBYSHEV",
            Divergence::Minkowski(_) => "MINKOWSKI",
            Divergence::Intersection => "INTERSECTION",
            Divergence::WeightedTotalVariation => "WTV",
        }
    }

    /// Divergence of `realized` from `target`
    pub fn distance(&self, target: &Distribution, realized: &Distribution) -> f64 {
        self.compute(target.values(), realized.values())
    }

    /// Same as [`Divergence::distance`] over raw probability vectors
    pub fn compute(&self, p: &[f64], q: &[f64]) -> f64 {
        debug_assert_eq!(p.len(), q.len());

        let value = match self {
            Divergence::Kl => sum_terms(p, q, |p, q| p * ln_ratio(p, q)),
            Divergence::Jeffreys => sum_terms(p, q, |p, q| {
                if p == q {
                    0.0
                } else {
                    (p - q) * (guard(p) / guard(q)).ln()
                }
            }),
            Divergence::KDivergence => sum_terms(p, q, |p, q| p * ln_ratio(2.0 * p, p + q)),
            Divergence::Topsoe => sum_terms(p, q, topsoe_term),
            Divergence::JensenShannon => 0.5 * sum_terms(p, q, topsoe_term),
            Divergence::JensenDifference => sum_terms(p, q, |p, q| {
                let m = (p + q) / 2.0;
                (x_ln_x(p) + x_ln_x(q)) / 2.0 - x_ln_x(m)
            }),
            Divergence::Hellinger => (2.0 * sum_terms(p, q, sqrt_gap)).sqrt(),
            Divergence::Bhattacharyya => {
                let coefficient = sum_terms(p, q, |p, q| (p * q).sqrt());
                -guard(coefficient).ln()
            }
            Divergence::Matusita => sum_terms(p, q, sqrt_gap).sqrt(),
            Divergence::SquaredChord => sum_terms(p, q, sqrt_gap),
            Divergence::PearsonChiSquare => sum_terms(p, q, |p, q| ratio((p - q).powi(2), q)),
            Divergence::Neyman => sum_terms(p, q, |p, q| ratio((p - q).powi(2), p)),
            Divergence::SquaredChi => sum_terms(p, q, |p, q| ratio((p - q).powi(2), p + q)),
            Divergence::ProbabilisticChi => {
                2.0 * sum_terms(p, q, |p, q| ratio((p - q).powi(2), p + q))
            }
            Divergence::Clark => {
                sum_terms(p, q, |p, q| ratio((p - q).abs(), p + q).powi(2)).sqrt()
            }
            Divergence::SquaredEuclidean => sum_terms(p, q, |p, q| (p - q).powi(2)),
            Divergence::Euclidean => sum_terms(p, q, |p, q| (p - q).powi(2)).sqrt(),
            Divergence::CityBlock => sum_terms(p, q, |p, q| (p - q).abs()),
            Divergence::Chebyshev => p
                .iter()
                .zip(q)
                .map(|(p, q)| (p - q).abs())
                .fold(0.0, f64::max),
            Divergence::Minkowski(order) => {
                let d = f64::from(*order);
                sum_terms(p, q, |p, q| (p - q).abs().powf(d)).powf(1.0 / d)
            }
            Divergence::Intersection => 0.5 * sum_terms(p, q, |p, q| (p - q).abs()),
            Divergence::WeightedTotalVariation => {
                sum_terms(p, q, |p, q| (p + 1.0) * (p - q).abs()) / 2.0
            }
        };

        // Rounding can push a zero divergence slightly below zero
        if value.is_nan() {
            value
        } else {
            value.max(0.0)
        }
    }
}

fn sum_terms(p: &[f64], q: &[f64], term: impl Fn(f64, f64) -> f64) -> f64 {
    p.iter().zip(q).map(|(&p, &q)| term(p, q)).sum()
}

fn guard(x: f64) -> f64 {
    if x > 0.0 {
        x
    } else {
        EPSILON
    }
}

/// `ln(a / b)` for a positive `a`; zero `a` contributes nothing upstream
fn ln_ratio(a: f64, b: f64) -> f64 {
    if a > 0.0 {
        (a / guard(b)).ln()
    } else {
        0.0
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if numerator == 0.0 {
        0.0
    } else {
        numerator / guard(denominator)
    }
}

fn x_ln_x(x: f64) -> f64 {
    if x > 0.0 {
        x * x.ln()
    } else {
        0.0
    }
}

fn topsoe_term(p: f64, q: f64) -> f64 {
    p * ln_ratio(2.0 * p, p + q) + q * ln_ratio(2.0 * q, p + q)
}

fn sqrt_gap(p: f64, q: f64) -> f64 {
    (p.sqrt() - q.sqrt()).powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> Vec<Divergence> {
        Divergence::NAMES
            .iter()
            .map(|name| Divergence::from_name(name, 3).unwrap())
            .collect()
    }

    const SAMPLES: [[f64; 3]; 4] = [
        [0.6, 0.4, 0.0],
        [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
        [0.0, 0.0, 1.0],
        [0.1, 0.2, 0.7],
    ];

    #[test]
    fn test_names_resolve() {
        for name in Divergence::NAMES {
            let divergence = Divergence::from_name(name, 2).unwrap();
            assert_eq!(divergence.name(), name);
        }
        assert_eq!(Divergence::from_name("kl", 2).unwrap(), Divergence::Kl);
    }

    #[test]
    fn test_unknown_name() {
        let err = Divergence::from_name("EARTH_MOVER", 2).unwrap_err();
        assert_eq!(
            err,
            CalibrationError::UnknownComponent {
                family: "fairness",
                name: "EARTH_MOVER".to_string()
            }
        );
    }

    #[test]
    fn test_minkowski_order_must_be_positive() {
        assert!(matches!(
            Divergence::from_name("MINKOWSKI", 0),
            Err(CalibrationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_zero_at_equality() {
        for divergence in all() {
            for sample in SAMPLES {
                let d = divergence.compute(&sample, &sample);
                assert!(
                    d.abs() < 1e-9,
                    "{} gave {d} for identical inputs",
                    divergence.name()
                );
            }
        }
    }

    #[test]
    fn test_non_negative_and_finite() {
        for divergence in all() {
            for p in SAMPLES {
                for q in SAMPLES {
                    let d = divergence.compute(&p, &q);
                    assert!(d.is_finite(), "{} not finite", divergence.name());
                    assert!(d >= 0.0, "{} negative", divergence.name());
                }
            }
        }
    }

    #[test]
    fn test_separates_different_distributions() {
        for divergence in all() {
            let d = divergence.compute(&SAMPLES[0], &SAMPLES[3]);
            assert!(d > 0.0, "{} did not separate", divergence.name());
        }
    }

    #[test]
    fn test_kl_known_value() {
        let p = [0.5, 0.5];
        let q = [0.25, 0.75];
        let expected = 0.5 * (2.0f64).ln() + 0.5 * (0.5f64 / 0.75).ln();
        assert!((Divergence::Kl.compute(&p, &q) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_kl_ignores_empty_target_bins() {
        let p = [1.0, 0.0];
        let q = [0.5, 0.5];
        assert!((Divergence::Kl.compute(&p, &q) - 2.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric_measures() {
        let p = SAMPLES[0];
        let q = SAMPLES[3];
        for divergence in [
            Divergence::JensenShannon,
            Divergence::Hellinger,
            Divergence::Euclidean,
            Divergence::CityBlock,
        ] {
            let forward = divergence.compute(&p, &q);
            let backward = divergence.compute(&q, &p);
            assert!((forward - backward).abs() < 1e-12);
        }
    }

    #[test]
    fn test_city_block_and_chebyshev() {
        let p = [0.5, 0.5, 0.0];
        let q = [0.2, 0.6, 0.2];
        assert!((Divergence::CityBlock.compute(&p, &q) - 0.6).abs() < 1e-12);
        assert!((Divergence::Chebyshev.compute(&p, &q) - 0.3).abs() < 1e-12);
        assert!((Divergence::Intersection.compute(&p, &q) - 0.3).abs() < 1e-12);
    }
}
