//! The fixed set of Rényi orders shared by every vector of a run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::BudgetError;

/// Rényi orders used when a run does not configure its own.
pub const DEFAULT_ALPHAS: [f64; 12] = [
    1.5, 1.75, 2.0, 2.5, 3.0, 4.0, 5.0, 6.0, 8.0, 16.0, 32.0, 64.0,
];

/// Ordered, finite set of positive Rényi orders.
///
/// Cheap to clone; the orders are shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct AlphaSet(Arc<[f64]>);

impl AlphaSet {
    /// Builds an alpha set, requiring strictly increasing positive finite orders.
    pub fn new(alphas: Vec<f64>) -> Result<Self, BudgetError> {
        if alphas.is_empty() {
            return Err(BudgetError::InvalidAlphas("at least one alpha is required".into()));
        }
        for (i, alpha) in alphas.iter().enumerate() {
            if !alpha.is_finite() || *alpha <= 0.0 {
                return Err(BudgetError::InvalidAlphas(format!(
                    "alpha #{i} must be a positive finite number, got {alpha}"
                )));
            }
        }
        if alphas.windows(2).any(|w| w[0] >= w[1]) {
            return Err(BudgetError::InvalidAlphas(
                "alphas must be strictly increasing".into(),
            ));
        }
        Ok(Self(alphas.into()))
    }

    /// The default orders, see [`DEFAULT_ALPHAS`].
    pub fn default_orders() -> Self {
        Self(DEFAULT_ALPHAS.to_vec().into())
    }

    /// Number of orders.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed set; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Order at position `index`.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    /// Position of an order in the set, matched exactly.
    pub fn index_of(&self, alpha: f64) -> Option<usize> {
        self.0.iter().position(|a| *a == alpha)
    }

    /// Iterate orders in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Fails unless `len` matches the number of orders.
    pub fn check_len(&self, len: usize) -> Result<(), BudgetError> {
        if len != self.len() {
            return Err(BudgetError::DimensionMismatch {
                expected: self.len(),
                actual: len,
            });
        }
        Ok(())
    }

    /// Fails unless every order is strictly above 1, which the RDP to DP
    /// conversion formulas need.
    pub fn require_above_one(&self) -> Result<(), BudgetError> {
        match self.iter().find(|a| *a <= 1.0) {
            Some(alpha) => Err(BudgetError::InvalidParameter {
                name: "alpha",
                value: alpha,
            }),
            None => Ok(()),
        }
    }
}

impl Default for AlphaSet {
    fn default() -> Self {
        Self::default_orders()
    }
}

impl TryFrom<Vec<f64>> for AlphaSet {
    type Error = BudgetError;

    fn try_from(alphas: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(alphas)
    }
}

impl From<AlphaSet> for Vec<f64> {
    fn from(set: AlphaSet) -> Self {
        set.0.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_orders_are_valid() {
        let set = AlphaSet::default();
        assert_eq!(set.len(), 12);
        assert!(AlphaSet::new(DEFAULT_ALPHAS.to_vec()).is_ok());
        assert_eq!(set.index_of(2.0), Some(2));
    }

    #[test]
    fn test_rejects_unordered_and_invalid() {
        assert!(AlphaSet::new(vec![]).is_err());
        assert!(AlphaSet::new(vec![2.0, 2.0]).is_err());
        assert!(AlphaSet::new(vec![3.0, 2.0]).is_err());
        assert!(AlphaSet::new(vec![0.0, 2.0]).is_err());
        assert!(AlphaSet::new(vec![f64::NAN]).is_err());
    }

    #[test]
    fn test_require_above_one() {
        assert!(AlphaSet::new(vec![2.0, 4.0]).unwrap().require_above_one().is_ok());
        assert!(AlphaSet::new(vec![0.5, 4.0]).unwrap().require_above_one().is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: AlphaSet = serde_json::from_str("[2.0, 3.0]").unwrap();
        assert_eq!(ok.len(), 2);
        let bad: Result<AlphaSet, _> = serde_json::from_str("[3.0, 2.0]");
        assert!(bad.is_err());
    }
}
