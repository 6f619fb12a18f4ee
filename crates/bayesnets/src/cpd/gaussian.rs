//! Linear-Gaussian and conditional linear-Gaussian CPDs.
//!
//! A linear-Gaussian CPD is the kernel `x ↦ N(w·x + b, σ²)`; the conditional
//! variant keeps one such kernel per configuration of its discrete parents.

use serde::{Deserialize, Serialize};

use crate::assignment::{Value, Variable};
use crate::distribution::Distribution;
use crate::error::{BayesNetError, Result};

/// `target | parents ~ N(weights · parents + bias, std²)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearGaussian {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub std: f64,
}

impl LinearGaussian {
    pub fn new(weights: Vec<f64>, bias: f64, std: f64) -> Result<Self> {
        if !(std > 0.0) || !std.is_finite() {
            return Err(BayesNetError::invalid("std", "must be positive and finite"));
        }
        if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
            return Err(BayesNetError::invalid("weights", "must be finite"));
        }
        Ok(Self { weights, bias, std })
    }

    /// The conditional mean for the given regressor values.
    pub fn mean(&self, regressors: &[Value]) -> Result<f64> {
        if regressors.len() != self.weights.len() {
            return Err(BayesNetError::ShapeMismatch {
                expected: self.weights.len(),
                got: regressors.len(),
            });
        }
        Ok(self
            .weights
            .iter()
            .zip(regressors)
            .map(|(w, x)| w * x.as_f64())
            .sum::<f64>()
            + self.bias)
    }

    pub fn distribution(&self, regressors: &[Value]) -> Result<Distribution> {
        Distribution::normal(self.mean(regressors)?, self.std)
    }

    /// Weights, bias and standard deviation.
    pub fn n_params(&self) -> usize {
        self.weights.len() + 2
    }
}

/// A [`LinearGaussian`] per configuration of the discrete parents.
///
/// Discrete parents come first in the owning CPD's parent list, followed by
/// the continuous regressors shared by every sub-model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalLinearGaussian {
    discrete_cards: Vec<usize>,
    models: Vec<LinearGaussian>,
}

impl ConditionalLinearGaussian {
    pub fn new(discrete_cards: Vec<usize>, models: Vec<LinearGaussian>) -> Result<Self> {
        let n_configs: usize = discrete_cards.iter().product();
        if discrete_cards.iter().any(|&c| c == 0) {
            return Err(BayesNetError::invalid(
                "discrete_cards",
                "every discrete parent needs at least one category",
            ));
        }
        if models.len() != n_configs {
            return Err(BayesNetError::ShapeMismatch {
                expected: n_configs,
                got: models.len(),
            });
        }
        if let Some(first) = models.first() {
            let n = first.weights.len();
            if let Some(bad) = models.iter().find(|m| m.weights.len() != n) {
                return Err(BayesNetError::ShapeMismatch {
                    expected: n,
                    got: bad.weights.len(),
                });
            }
        }
        Ok(Self {
            discrete_cards,
            models,
        })
    }

    pub fn n_discrete(&self) -> usize {
        self.discrete_cards.len()
    }

    pub fn n_continuous(&self) -> usize {
        self.models.first().map_or(0, |m| m.weights.len())
    }

    pub fn discrete_cardinalities(&self) -> &[usize] {
        &self.discrete_cards
    }

    pub fn models(&self) -> &[LinearGaussian] {
        &self.models
    }

    /// Select the sub-model for `values` (discrete values first) and return
    /// its distribution.
    pub fn distribution(&self, parents: &[Variable], values: &[Value]) -> Result<Distribution> {
        let (discrete, continuous) = values.split_at(self.discrete_cards.len().min(values.len()));
        let mut idx = 0;
        for ((value, &card), name) in discrete.iter().zip(&self.discrete_cards).zip(parents) {
            let k = match value {
                Value::Discrete(k) if *k < card => *k,
                other => {
                    return Err(BayesNetError::Domain {
                        variable: name.clone(),
                        value: other.to_string(),
                        reason: format!("discrete parent takes values in 0..{}", card),
                    })
                }
            };
            idx = idx * card + k;
        }
        self.models[idx].distribution(continuous)
    }

    pub fn n_params(&self) -> usize {
        self.models.iter().map(LinearGaussian::n_params).sum()
    }
}
