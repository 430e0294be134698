//! Per-alpha budget vectors.

use serde::{Deserialize, Serialize};

use crate::{AlphaSet, BudgetError};

/// A non-negative epsilon per Rényi order.
///
/// Used for demands, capacities and unlock increments alike. The vector does
/// not carry its alpha set; callers check lengths against the run's
/// [`AlphaSet`] at the boundary and binary operations check each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Budget(Vec<f64>);

impl Budget {
    /// Builds a budget, rejecting negative or non-finite entries.
    pub fn new(values: Vec<f64>) -> Result<Self, BudgetError> {
        for (index, value) in values.iter().enumerate() {
            if !value.is_finite() || *value < 0.0 {
                return Err(BudgetError::InvalidValue {
                    index,
                    value: *value,
                });
            }
        }
        Ok(Self(values))
    }

    /// Builds a budget and checks it against the alpha set.
    pub fn for_alphas(values: Vec<f64>, alphas: &AlphaSet) -> Result<Self, BudgetError> {
        alphas.check_len(values.len())?;
        Self::new(values)
    }

    /// All-zero vector of length `len`.
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    /// Same epsilon on every order.
    pub fn uniform(len: usize, epsilon: f64) -> Result<Self, BudgetError> {
        Self::new(vec![epsilon; len])
    }

    /// Block capacity that guarantees (epsilon, delta)-DP for any composition
    /// of demands that fits under it on at least one order.
    ///
    /// Uses `max(epsilon + ln(delta) / (alpha - 1), 0)`.
    pub fn from_epsilon_delta(
        epsilon: f64,
        delta: f64,
        alphas: &AlphaSet,
    ) -> Result<Self, BudgetError> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(BudgetError::InvalidParameter {
                name: "epsilon",
                value: epsilon,
            });
        }
        if !(delta > 0.0 && delta < 1.0) {
            return Err(BudgetError::InvalidParameter {
                name: "delta",
                value: delta,
            });
        }
        alphas.require_above_one()?;

        let values = alphas
            .iter()
            .map(|alpha| (epsilon + delta.ln() / (alpha - 1.0)).max(0.0))
            .collect();
        Ok(Self(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Epsilon at alpha position `index`, zero when out of range.
    pub fn get(&self, index: usize) -> f64 {
        self.0.get(index).copied().unwrap_or(0.0)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }

    /// True when every entry is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// Largest entry, zero for an empty vector.
    pub fn max_value(&self) -> f64 {
        self.0.iter().copied().fold(0.0, f64::max)
    }

    /// True when `self[a] <= other[a]` for every alpha.
    pub fn fits_within(&self, other: &Budget) -> bool {
        self.len() == other.len() && self.0.iter().zip(&other.0).all(|(d, r)| d <= r)
    }

    /// Element-wise sum.
    pub fn checked_add(&self, other: &Budget) -> Result<Budget, BudgetError> {
        self.check_same_len(other)?;
        Ok(Self(self.0.iter().zip(&other.0).map(|(a, b)| a + b).collect()))
    }

    /// Element-wise difference; fails instead of going negative.
    pub fn checked_sub(&self, other: &Budget) -> Result<Budget, BudgetError> {
        self.check_same_len(other)?;
        let mut out = Vec::with_capacity(self.len());
        for (alpha_index, (a, b)) in self.0.iter().zip(&other.0).enumerate() {
            if b > a {
                return Err(BudgetError::InsufficientBudget {
                    alpha_index,
                    requested: *b,
                    available: *a,
                });
            }
            out.push(a - b);
        }
        Ok(Self(out))
    }

    /// Adds `other` but never goes above `threshold` on any order.
    pub fn add_with_threshold(
        &self,
        other: &Budget,
        threshold: &Budget,
    ) -> Result<Budget, BudgetError> {
        self.check_same_len(other)?;
        self.check_same_len(threshold)?;
        Ok(Self(
            self.0
                .iter()
                .zip(&other.0)
                .zip(&threshold.0)
                .map(|((a, b), t)| (a + b).min(*t))
                .collect(),
        ))
    }

    /// Ratio to another budget per order; orders where `other` is not
    /// positive map to zero.
    pub fn normalize_by(&self, other: &Budget) -> Result<Vec<f64>, BudgetError> {
        self.check_same_len(other)?;
        Ok(self
            .0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| if *b > 0.0 { a / b } else { 0.0 })
            .collect())
    }

    /// Multiplies every entry by a non-negative factor.
    pub fn scale(&self, factor: f64) -> Result<Budget, BudgetError> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(BudgetError::InvalidParameter {
                name: "factor",
                value: factor,
            });
        }
        Ok(Self(self.0.iter().map(|v| v * factor).collect()))
    }

    /// Tightest (epsilon, delta)-DP guarantee implied by this RDP vector:
    /// `min over alpha of eps + ln(1/delta) / (alpha - 1)`.
    pub fn dp_epsilon(&self, delta: f64, alphas: &AlphaSet) -> Result<f64, BudgetError> {
        alphas.check_len(self.len())?;
        alphas.require_above_one()?;
        if !(delta > 0.0 && delta < 1.0) {
            return Err(BudgetError::InvalidParameter {
                name: "delta",
                value: delta,
            });
        }
        Ok(self
            .0
            .iter()
            .zip(alphas.iter())
            .map(|(eps, alpha)| eps + (1.0 / delta).ln() / (alpha - 1.0))
            .fold(f64::INFINITY, f64::min))
    }

    fn check_same_len(&self, other: &Budget) -> Result<(), BudgetError> {
        if self.len() != other.len() {
            return Err(BudgetError::DimensionMismatch {
                expected: self.len(),
                actual: other.len(),
            });
        }
        Ok(())
    }

    /// Mutable access for the curve, which maintains its own invariants.
    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.0
    }
}

impl TryFrom<Vec<f64>> for Budget {
    type Error = BudgetError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Budget> for Vec<f64> {
    fn from(budget: Budget) -> Self {
        budget.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(values: &[f64]) -> Budget {
        Budget::new(values.to_vec()).unwrap()
    }

    #[test]
    fn test_new_rejects_negative_and_nan() {
        assert!(Budget::new(vec![1.0, -0.5]).is_err());
        assert!(Budget::new(vec![f64::NAN]).is_err());
        assert!(Budget::new(vec![0.0, 3.0]).is_ok());
    }

    #[test]
    fn test_from_epsilon_delta_clamps_small_orders() {
        let alphas = AlphaSet::new(vec![1.5, 3.0, 64.0]).unwrap();
        let budget = Budget::from_epsilon_delta(10.0, 1e-7, &alphas).unwrap();
        // 10 + ln(1e-7) / 0.5 is negative
        assert_eq!(budget.get(0), 0.0);
        let expected = 10.0 + (1e-7f64).ln() / 2.0;
        assert!((budget.get(1) - expected).abs() < 1e-12);
        assert!(budget.get(2) > budget.get(1));
    }

    #[test]
    fn test_from_epsilon_delta_requires_alpha_above_one() {
        let alphas = AlphaSet::new(vec![0.5, 2.0]).unwrap();
        assert!(Budget::from_epsilon_delta(10.0, 1e-5, &alphas).is_err());
    }

    #[test]
    fn test_checked_sub_refuses_to_go_negative() {
        let err = b(&[5.0, 1.0]).checked_sub(&b(&[2.0, 3.0])).unwrap_err();
        assert!(err.is_insufficient());
        assert_eq!(b(&[5.0, 3.0]).checked_sub(&b(&[2.0, 3.0])).unwrap(), b(&[3.0, 0.0]));
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = b(&[1.0]).checked_add(&b(&[1.0, 2.0])).unwrap_err();
        assert!(matches!(err, BudgetError::DimensionMismatch { expected: 1, actual: 2 }));
        assert!(!b(&[1.0]).fits_within(&b(&[1.0, 2.0])));
    }

    #[test]
    fn test_add_with_threshold_caps() {
        let out = b(&[4.0, 1.0])
            .add_with_threshold(&b(&[4.0, 4.0]), &b(&[6.0, 10.0]))
            .unwrap();
        assert_eq!(out, b(&[6.0, 5.0]));
    }

    #[test]
    fn test_normalize_by_skips_empty_orders() {
        let ratios = b(&[2.0, 3.0]).normalize_by(&b(&[4.0, 0.0])).unwrap();
        assert_eq!(ratios, vec![0.5, 0.0]);
    }

    #[test]
    fn test_fits_within_handles_zero_demand() {
        assert!(b(&[0.0, 2.0]).fits_within(&b(&[0.0, 2.0])));
        assert!(!b(&[0.1, 2.0]).fits_within(&b(&[0.0, 2.0])));
    }

    #[test]
    fn test_dp_epsilon_picks_best_order() {
        let alphas = AlphaSet::new(vec![2.0, 11.0]).unwrap();
        let delta = 1e-5;
        let eps = b(&[1.0, 5.0]).dp_epsilon(delta, &alphas).unwrap();
        let at_two = 1.0 + (1.0 / delta).ln();
        let at_eleven = 5.0 + (1.0 / delta).ln() / 10.0;
        assert!((eps - at_two.min(at_eleven)).abs() < 1e-12);
    }
}
