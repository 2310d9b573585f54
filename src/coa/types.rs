//! Core types for the Crayfish Optimization Algorithm.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoaError, Result};

/// A point in the search space.
pub type Vector = Vec<f64>;

/// An ordered set of individuals, all of the same dimension.
pub type Population = Vec<Vector>;

/// Defines a continuous minimization problem for COA.
///
/// The user supplies the objective and the box constraints; the
/// engine handles the population update, boundary repair and best
/// bookkeeping.
///
/// # Minimization
///
/// COA minimizes the objective. For maximization, negate it.
///
/// # Examples
///
/// ```
/// use u_crayfish::coa::{Bounds, Objective};
///
/// struct Sphere {
///     bounds: Bounds,
/// }
///
/// impl Objective for Sphere {
///     fn dim(&self) -> usize { 5 }
///     fn bounds(&self) -> &Bounds { &self.bounds }
///     fn evaluate(&self, x: &[f64]) -> f64 { x.iter().map(|v| v * v).sum() }
/// }
///
/// let sphere = Sphere { bounds: Bounds::uniform(-5.0, 5.0).unwrap() };
/// assert_eq!(sphere.evaluate(&[1.0, 2.0]), 5.0);
/// ```
pub trait Objective: Send + Sync {
    /// Number of decision variables.
    fn dim(&self) -> usize;

    /// Box constraints applied after every position update.
    fn bounds(&self) -> &Bounds;

    /// Fitness of `x`. Lower is better.
    ///
    /// Should be deterministic for a fixed input; randomized objectives
    /// are allowed but make seeded runs non-reproducible.
    fn evaluate(&self, x: &[f64]) -> f64;

    /// Human-readable identifier, used in logs.
    fn name(&self) -> &str {
        "objective"
    }
}

/// Box constraints: one pair shared by every dimension, or one pair per
/// dimension.
///
/// Deserialized bounds are checked like [`Bounds::per_dimension`] input:
/// finite, `lower <= upper`, equal lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBounds")]
pub enum Bounds {
    /// The same `[lower, upper]` for every dimension.
    Uniform {
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },

    /// `lower[j] <= x[j] <= upper[j]`.
    PerDimension {
        /// Lower bound per dimension.
        lower: Vec<f64>,
        /// Upper bound per dimension.
        upper: Vec<f64>,
    },
}

/// Unchecked wire form of [`Bounds`].
#[derive(Deserialize)]
enum RawBounds {
    Uniform { lower: f64, upper: f64 },
    PerDimension { lower: Vec<f64>, upper: Vec<f64> },
}

impl TryFrom<RawBounds> for Bounds {
    type Error = CoaError;

    fn try_from(raw: RawBounds) -> Result<Self> {
        match raw {
            RawBounds::Uniform { lower, upper } => Bounds::uniform(lower, upper),
            RawBounds::PerDimension { lower, upper } => {
                let bounds = Bounds::PerDimension { lower, upper };
                bounds.check_pairs()?;
                Ok(bounds)
            }
        }
    }
}

impl Bounds {
    /// Creates a shared bound. Fails if `lower > upper` or either is not finite.
    pub fn uniform(lower: f64, upper: f64) -> Result<Self> {
        check_pair(0, lower, upper)?;
        Ok(Bounds::Uniform { lower, upper })
    }

    /// Creates per-dimension bounds.
    ///
    /// A single-element pair collapses to [`Bounds::Uniform`], matching the
    /// "one bound for all dimensions" convention.
    pub fn per_dimension(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        let bounds = Bounds::PerDimension { lower, upper };
        bounds.check_pairs()?;
        match bounds {
            Bounds::PerDimension { lower, upper } if lower.len() == 1 => Ok(Bounds::Uniform {
                lower: lower[0],
                upper: upper[0],
            }),
            other => Ok(other),
        }
    }

    /// Number of explicit bound pairs (1 for uniform bounds).
    pub fn len(&self) -> usize {
        match self {
            Bounds::Uniform { .. } => 1,
            Bounds::PerDimension { lower, .. } => lower.len(),
        }
    }

    /// Always `false`; bounds carry at least one pair.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The `(lower, upper)` pair governing dimension `j`.
    #[inline]
    pub fn range(&self, j: usize) -> (f64, f64) {
        match self {
            Bounds::Uniform { lower, upper } => (*lower, *upper),
            Bounds::PerDimension { lower, upper } => (lower[j], upper[j]),
        }
    }

    /// Checks that these bounds can constrain a `dim`-dimensional vector.
    ///
    /// Every pair must be finite with `lower <= upper`; per-dimension
    /// bounds must have exactly `dim` pairs on both sides. The variants'
    /// fields are public, so this is the check every run goes through
    /// before touching the population.
    pub fn validate_for(&self, dim: usize) -> Result<()> {
        if dim == 0 {
            return Err(CoaError::invalid("dimension must be at least 1"));
        }
        self.check_pairs()?;
        if let Bounds::PerDimension { lower, .. } = self {
            if lower.len() != dim {
                return Err(CoaError::invalid(format!(
                    "per-dimension bounds cover {} dimensions, problem has {dim}",
                    lower.len()
                )));
            }
        }
        Ok(())
    }

    fn check_pairs(&self) -> Result<()> {
        match self {
            Bounds::Uniform { lower, upper } => check_pair(0, *lower, *upper),
            Bounds::PerDimension { lower, upper } => {
                if lower.len() != upper.len() {
                    return Err(CoaError::invalid(format!(
                        "bounds length mismatch: {} lower vs {} upper",
                        lower.len(),
                        upper.len()
                    )));
                }
                if lower.is_empty() {
                    return Err(CoaError::invalid("bounds must not be empty"));
                }
                for (j, (&lo, &hi)) in lower.iter().zip(upper.iter()).enumerate() {
                    check_pair(j, lo, hi)?;
                }
                Ok(())
            }
        }
    }

    /// Clamps every component of `x` into its range.
    ///
    /// `NaN` components are mapped to the lower bound so the box invariant
    /// holds unconditionally.
    pub fn clamp(&self, x: &mut [f64]) {
        for (j, v) in x.iter_mut().enumerate() {
            let (lo, hi) = self.range(j);
            *v = if v.is_nan() { lo } else { v.min(hi).max(lo) };
        }
    }

    /// Whether every component of `x` lies inside its range.
    pub fn contains(&self, x: &[f64]) -> bool {
        x.iter().enumerate().all(|(j, &v)| {
            let (lo, hi) = self.range(j);
            lo <= v && v <= hi
        })
    }

    /// Samples a point uniformly inside the box.
    pub fn sample<R: Rng>(&self, dim: usize, rng: &mut R) -> Vector {
        (0..dim)
            .map(|j| {
                let (lo, hi) = self.range(j);
                lo + rng.random::<f64>() * (hi - lo)
            })
            .collect()
    }
}

fn check_pair(j: usize, lower: f64, upper: f64) -> Result<()> {
    if !lower.is_finite() || !upper.is_finite() {
        return Err(CoaError::invalid(format!(
            "bounds for dimension {j} must be finite"
        )));
    }
    if lower > upper {
        return Err(CoaError::invalid(format!(
            "lower bound {lower} exceeds upper bound {upper} in dimension {j}"
        )));
    }
    Ok(())
}

/// Whether `candidate` is strictly better than `incumbent`.
///
/// IEEE comparisons make `NaN` neither smaller nor larger than anything,
/// so `NaN` is ordered explicitly: a `NaN` candidate never improves, and
/// any non-`NaN` candidate improves on a `NaN` incumbent.
#[inline]
pub fn improves(candidate: f64, incumbent: f64) -> bool {
    if candidate.is_nan() {
        false
    } else if incumbent.is_nan() {
        true
    } else {
        candidate < incumbent
    }
}

/// Food intake curve `p(T)`: a Gaussian bump centred at 25 degrees with
/// standard deviation 3, scaled by 0.2.
#[inline]
pub fn intake(temperature: f64) -> f64 {
    const MU: f64 = 25.0;
    const SIGMA: f64 = 3.0;
    const C1: f64 = 0.2;
    C1 * (1.0 / ((2.0 * std::f64::consts::PI).sqrt() * SIGMA))
        * (-(temperature - MU).powi(2) / (2.0 * SIGMA * SIGMA)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_improves_orders_nan_last() {
        assert!(improves(1.0, 2.0));
        assert!(!improves(2.0, 1.0));
        assert!(!improves(1.0, 1.0));
        assert!(!improves(f64::NAN, 1.0));
        assert!(improves(1.0, f64::NAN));
        assert!(improves(f64::INFINITY, f64::NAN));
        assert!(!improves(f64::NAN, f64::NAN));
        assert!(improves(1.0, f64::INFINITY));
    }

    #[test]
    fn test_intake_peaks_at_25() {
        let peak = intake(25.0);
        assert!((peak - 0.2 / ((2.0 * std::f64::consts::PI).sqrt() * 3.0)).abs() < 1e-15);
        assert!(intake(20.0) < peak);
        assert!(intake(30.0) < peak);
        assert!((intake(22.0) - intake(28.0)).abs() < 1e-15);
    }

    #[test]
    fn test_uniform_rejects_inverted() {
        assert!(Bounds::uniform(1.0, -1.0).is_err());
        assert!(Bounds::uniform(f64::NEG_INFINITY, 1.0).is_err());
        assert!(Bounds::uniform(-1.0, 1.0).is_ok());
    }

    #[test]
    fn test_per_dimension_collapses_single_pair() {
        let b = Bounds::per_dimension(vec![-2.0], vec![2.0]).unwrap();
        assert_eq!(b, Bounds::Uniform { lower: -2.0, upper: 2.0 });
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_per_dimension_length_checks() {
        assert!(Bounds::per_dimension(vec![0.0, 1.0], vec![1.0]).is_err());
        let b = Bounds::per_dimension(vec![-5.0, 0.0], vec![10.0, 15.0]).unwrap();
        assert!(b.validate_for(2).is_ok());
        assert!(b.validate_for(3).is_err());
        assert_eq!(b.range(1), (0.0, 15.0));
    }

    #[test]
    fn test_clamp_per_dimension() {
        let b = Bounds::per_dimension(vec![-5.0, 0.0], vec![10.0, 15.0]).unwrap();
        let mut x = vec![-7.0, 20.0];
        b.clamp(&mut x);
        assert_eq!(x, vec![-5.0, 15.0]);

        let mut y = vec![f64::NAN, 3.0];
        b.clamp(&mut y);
        assert_eq!(y, vec![-5.0, 3.0]);
        assert!(b.contains(&y));
    }

    #[test]
    fn test_validate_for_rejects_malformed_variants() {
        let ragged = Bounds::PerDimension {
            lower: vec![-1.0, -1.0],
            upper: vec![1.0],
        };
        assert!(matches!(
            ragged.validate_for(2),
            Err(CoaError::InvalidArgument(_))
        ));

        let inverted = Bounds::Uniform {
            lower: 5.0,
            upper: -5.0,
        };
        assert!(inverted.validate_for(2).is_err());

        let nan = Bounds::PerDimension {
            lower: vec![0.0, f64::NAN],
            upper: vec![1.0, 1.0],
        };
        assert!(nan.validate_for(2).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Bounds =
            serde_json::from_str(r#"{"PerDimension":{"lower":[-5.0,0.0],"upper":[10.0,15.0]}}"#)
                .unwrap();
        assert_eq!(ok.range(1), (0.0, 15.0));

        assert!(serde_json::from_str::<Bounds>(r#"{"Uniform":{"lower":5.0,"upper":-5.0}}"#).is_err());
        assert!(serde_json::from_str::<Bounds>(
            r#"{"PerDimension":{"lower":[-1.0,-1.0],"upper":[1.0]}}"#
        )
        .is_err());
    }

    #[test]
    fn test_sample_inside_box() {
        let b = Bounds::uniform(-100.0, 100.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let x = b.sample(8, &mut rng);
            assert_eq!(x.len(), 8);
            assert!(b.contains(&x));
        }
    }
}
