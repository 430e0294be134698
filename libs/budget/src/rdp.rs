//! RDP curves of common mechanisms.

use serde::{Deserialize, Serialize};

use crate::{AlphaSet, Budget, BudgetError};

/// How a task's demand vector is produced.
///
/// Serialized with an explicit `mechanism` tag, e.g.
/// `{ mechanism = "gaussian", sigma = 2.0 }` in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mechanism", rename_all = "snake_case")]
pub enum DemandCurve {
    /// Gaussian mechanism with L2 sensitivity 1: `alpha / (2 sigma^2)`.
    Gaussian { sigma: f64 },

    /// Laplace mechanism with L1 sensitivity 1 and scale `noise`.
    Laplace { noise: f64 },

    /// Poisson-subsampled Gaussian run for `steps` iterations, using the
    /// small-sampling-rate bound `2 q^2 alpha / sigma^2` per step.
    SubsampledGaussian {
        sampling_probability: f64,
        noise_multiplier: f64,
        steps: f64,
    },

    /// Epsilons given directly, one per alpha of the run.
    Explicit { rdp_epsilons: Vec<f64> },
}

impl DemandCurve {
    /// Evaluates the curve on every order of the alpha set.
    pub fn evaluate(&self, alphas: &AlphaSet) -> Result<Budget, BudgetError> {
        match self {
            DemandCurve::Gaussian { sigma } => {
                positive("sigma", *sigma)?;
                Budget::new(alphas.iter().map(|a| a / (2.0 * sigma * sigma)).collect())
            }
            DemandCurve::Laplace { noise } => {
                positive("noise", *noise)?;
                alphas.require_above_one()?;
                Budget::new(alphas.iter().map(|a| laplace_rdp(a, *noise)).collect())
            }
            DemandCurve::SubsampledGaussian {
                sampling_probability,
                noise_multiplier,
                steps,
            } => {
                let q = *sampling_probability;
                if !(q > 0.0 && q <= 1.0) {
                    return Err(BudgetError::InvalidParameter {
                        name: "sampling_probability",
                        value: q,
                    });
                }
                positive("noise_multiplier", *noise_multiplier)?;
                positive("steps", *steps)?;
                let sigma2 = noise_multiplier * noise_multiplier;
                Budget::new(
                    alphas
                        .iter()
                        .map(|a| steps * 2.0 * q * q * a / sigma2)
                        .collect(),
                )
            }
            DemandCurve::Explicit { rdp_epsilons } => {
                Budget::for_alphas(rdp_epsilons.clone(), alphas)
            }
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), BudgetError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(BudgetError::InvalidParameter { name, value })
    }
}

/// `1/(a-1) * ln( a/(2a-1) e^{(a-1)/b} + (a-1)/(2a-1) e^{-a/b} )`, evaluated
/// with a shifted log-sum-exp so large `a / b` does not overflow.
fn laplace_rdp(alpha: f64, noise: f64) -> f64 {
    let w1 = alpha / (2.0 * alpha - 1.0);
    let w2 = (alpha - 1.0) / (2.0 * alpha - 1.0);
    let x1 = (alpha - 1.0) / noise;
    let x2 = -alpha / noise;
    let m = x1.max(x2);
    let lse = m + (w1 * (x1 - m).exp() + w2 * (x2 - m).exp()).ln();
    (lse / (alpha - 1.0)).max(0.0)
}
