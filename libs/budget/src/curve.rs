//! Remaining budget of a single block.

use serde::Serialize;

use crate::{Budget, BudgetError};

/// The budget of one block across all alphas.
///
/// Tracks four vectors: the original `capacity`, the part `unlocked` so far,
/// what has been `consumed` by committed allocations, and what is
/// `remaining` for new allocations. `remaining` is kept directly rather than
/// derived so that subtracting an affordable demand can never round below
/// zero.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetCurve {
    capacity: Budget,
    unlocked: Budget,
    consumed: Budget,
    remaining: Budget,
}

impl BudgetCurve {
    /// A curve with its whole capacity available.
    pub fn new(capacity: Budget) -> Self {
        Self::with_unlocked_fraction(capacity, 1.0)
    }

    /// A curve with only `fraction` of its capacity available; the rest is
    /// withheld until released with [`BudgetCurve::unlock`].
    ///
    /// The fraction is clamped to `[0, 1]`.
    pub fn with_unlocked_fraction(capacity: Budget, fraction: f64) -> Self {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            1.0
        };
        let unlocked: Vec<f64> = capacity.iter().map(|c| c * fraction).collect();
        let unlocked = Budget::new(unlocked).unwrap_or_else(|_| Budget::zeros(capacity.len()));
        Self {
            consumed: Budget::zeros(capacity.len()),
            remaining: unlocked.clone(),
            unlocked,
            capacity,
        }
    }

    /// Remaining budget at alpha position `alpha_index`.
    pub fn remaining(&self, alpha_index: usize) -> f64 {
        self.remaining.get(alpha_index)
    }

    pub fn remaining_budget(&self) -> &Budget {
        &self.remaining
    }

    pub fn capacity(&self) -> &Budget {
        &self.capacity
    }

    pub fn unlocked(&self) -> &Budget {
        &self.unlocked
    }

    pub fn consumed(&self) -> &Budget {
        &self.consumed
    }

    /// Capacity not yet released.
    pub fn withheld(&self) -> Budget {
        self.capacity
            .checked_sub(&self.unlocked)
            .unwrap_or_else(|_| Budget::zeros(self.capacity.len()))
    }

    /// True iff `demand[a] <= remaining[a]` for every alpha.
    pub fn can_afford(&self, demand: &Budget) -> bool {
        demand.fits_within(&self.remaining)
    }

    /// Consumes `demand`.
    ///
    /// Re-checks affordability; on failure the curve is left unchanged.
    pub fn commit(&mut self, demand: &Budget) -> Result<(), BudgetError> {
        self.check_len(demand)?;
        if let Some((alpha_index, (requested, available))) = demand
            .iter()
            .zip(self.remaining.iter())
            .enumerate()
            .find(|(_, (d, r))| d > r)
        {
            return Err(BudgetError::InsufficientBudget {
                alpha_index,
                requested,
                available,
            });
        }

        for (i, d) in demand.iter().enumerate() {
            self.remaining.values_mut()[i] -= d;
            self.consumed.values_mut()[i] += d;
        }
        debug_assert!(
            self.remaining.iter().all(|r| r >= 0.0),
            "remaining budget went negative after an affordable commit"
        );
        Ok(())
    }

    /// Gives back a previously committed demand.
    ///
    /// Only for rolling back a multi-block commit that failed halfway;
    /// committed allocations are otherwise never undone.
    pub fn release(&mut self, demand: &Budget) -> Result<(), BudgetError> {
        self.check_len(demand)?;
        for (i, d) in demand.iter().enumerate() {
            let give_back = d.min(self.consumed.get(i));
            self.consumed.values_mut()[i] -= give_back;
            self.remaining.values_mut()[i] += give_back;
        }
        Ok(())
    }

    /// Releases withheld budget, capped at the original capacity.
    ///
    /// Returns the amount actually released on each alpha.
    pub fn unlock(&mut self, increment: &Budget) -> Result<Budget, BudgetError> {
        self.check_len(increment)?;
        let target = self.unlocked.add_with_threshold(increment, &self.capacity)?;
        let released: Vec<f64> = target
            .iter()
            .zip(self.unlocked.iter())
            .map(|(t, u)| (t - u).max(0.0))
            .collect();
        for (i, r) in released.iter().enumerate() {
            self.remaining.values_mut()[i] += r;
        }
        self.unlocked = target;
        Budget::new(released)
    }

    /// Share of the capacity consumed on each alpha (zero-capacity alphas
    /// report zero).
    pub fn consumed_fraction(&self) -> Vec<f64> {
        self.consumed
            .normalize_by(&self.capacity)
            .unwrap_or_else(|_| vec![0.0; self.capacity.len()])
    }

    /// True when nothing is left on any alpha and nothing is withheld.
    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_zero() && self.withheld().is_zero()
    }

    fn check_len(&self, other: &Budget) -> Result<(), BudgetError> {
        if other.len() != self.capacity.len() {
            return Err(BudgetError::DimensionMismatch {
                expected: self.capacity.len(),
                actual: other.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn b(values: &[f64]) -> Budget {
        Budget::new(values.to_vec()).unwrap()
    }

    #[test]
    fn test_commit_consumes_and_rejects_overdraw() {
        let mut curve = BudgetCurve::new(b(&[10.0]));
        curve.commit(&b(&[6.0])).unwrap();
        assert_eq!(curve.remaining(0), 4.0);

        let err = curve.commit(&b(&[6.0])).unwrap_err();
        assert!(matches!(
            err,
            BudgetError::InsufficientBudget { alpha_index: 0, requested, available }
                if requested == 6.0 && available == 4.0
        ));
        assert_eq!(curve.remaining(0), 4.0);
        assert_eq!(curve.consumed().get(0), 6.0);
    }

    #[test]
    fn test_can_afford_requires_every_alpha() {
        let curve = BudgetCurve::new(b(&[10.0, 1.0]));
        assert!(curve.can_afford(&b(&[10.0, 1.0])));
        assert!(curve.can_afford(&b(&[0.0, 0.0])));
        assert!(!curve.can_afford(&b(&[1.0, 1.5])));
        assert!(!curve.can_afford(&b(&[1.0])));
    }

    #[test]
    fn test_unlock_is_capped_at_capacity() {
        let mut curve = BudgetCurve::with_unlocked_fraction(b(&[10.0, 4.0]), 0.5);
        assert_eq!(curve.remaining_budget(), &b(&[5.0, 2.0]));
        assert_eq!(curve.withheld(), b(&[5.0, 2.0]));

        let released = curve.unlock(&b(&[2.5, 1.0])).unwrap();
        assert_eq!(released, b(&[2.5, 1.0]));
        let released = curve.unlock(&b(&[10.0, 10.0])).unwrap();
        assert_eq!(released, b(&[2.5, 1.0]));
        assert_eq!(curve.unlocked(), curve.capacity());
        assert_eq!(curve.remaining_budget(), &b(&[10.0, 4.0]));
    }

    #[test]
    fn test_unlock_after_consumption_keeps_consumed() {
        let mut curve = BudgetCurve::with_unlocked_fraction(b(&[10.0]), 0.5);
        curve.commit(&b(&[5.0])).unwrap();
        curve.unlock(&b(&[5.0])).unwrap();
        assert_eq!(curve.remaining(0), 5.0);
        assert_eq!(curve.consumed_fraction(), vec![0.5]);
    }

    #[test]
    fn test_release_undoes_commit() {
        let mut curve = BudgetCurve::new(b(&[3.0, 3.0]));
        curve.commit(&b(&[1.0, 2.0])).unwrap();
        curve.release(&b(&[1.0, 2.0])).unwrap();
        assert_eq!(curve.remaining_budget(), &b(&[3.0, 3.0]));
        assert!(curve.consumed().is_zero());
    }

    #[test]
    fn test_exhausted() {
        let mut curve = BudgetCurve::new(b(&[1.0]));
        assert!(!curve.is_exhausted());
        curve.commit(&b(&[1.0])).unwrap();
        assert!(curve.is_exhausted());
    }

    proptest! {
        #[test]
        fn remaining_never_negative(
            demands in proptest::collection::vec(0.0f64..4.0, 1..40),
            unlocks in proptest::collection::vec(0.0f64..2.0, 0..10),
        ) {
            let mut curve = BudgetCurve::with_unlocked_fraction(b(&[10.0]), 0.3);
            let mut unlocks = unlocks.into_iter();
            for demand in demands {
                let _ = curve.commit(&b(&[demand]));
                if let Some(u) = unlocks.next() {
                    curve.unlock(&b(&[u])).unwrap();
                }
                prop_assert!(curve.remaining(0) >= 0.0);
                prop_assert!(curve.consumed().get(0) <= 10.0 + 1e-9);
            }
        }
    }
}
