//! Univariate distributions produced by CPDs.
//!
//! A CPD conditioned on its parents yields one of these. Discrete families
//! take zero-based category indices; continuous families take reals.

use std::f64::consts::PI;

use rand::Rng;
use rand_distr::{Distribution as _, Normal, Poisson};
use serde::{Deserialize, Serialize};

use crate::assignment::{Value, Variable};
use crate::cpd::FitOptions;
use crate::error::{BayesNetError, Result};
use crate::PROB_TOLERANCE;

/// A distribution over a single variable's domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    /// Finite distribution over `{0, .., probs.len() - 1}`.
    Categorical { probs: Vec<f64> },
    /// `P(1) = p`, `P(0) = 1 - p`.
    Bernoulli { p: f64 },
    Normal { mean: f64, std: f64 },
    /// Uniform on the closed interval `[low, high]`.
    Uniform { low: f64, high: f64 },
    Poisson { rate: f64 },
}

impl Distribution {
    /// Create a categorical distribution from a probability vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector is empty, has negative entries, or
    /// does not sum to 1 (within tolerance).
    pub fn categorical(probs: Vec<f64>) -> Result<Self> {
        let d = Distribution::Categorical { probs };
        d.validate()?;
        Ok(d)
    }

    /// Create a categorical distribution from unnormalized weights.
    pub fn from_weights(weights: Vec<f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(BayesNetError::invalid("probs", "distribution cannot be empty"));
        }
        if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(BayesNetError::NegativeWeight);
        }
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return Err(BayesNetError::invalid("probs", "all weights are zero"));
        }
        Ok(Distribution::Categorical {
            probs: weights.iter().map(|w| w / sum).collect(),
        })
    }

    pub fn uniform_categorical(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(BayesNetError::invalid("n", "need at least one category"));
        }
        Ok(Distribution::Categorical {
            probs: vec![1.0 / n as f64; n],
        })
    }

    pub fn bernoulli(p: f64) -> Result<Self> {
        let d = Distribution::Bernoulli { p };
        d.validate()?;
        Ok(d)
    }

    pub fn normal(mean: f64, std: f64) -> Result<Self> {
        let d = Distribution::Normal { mean, std };
        d.validate()?;
        Ok(d)
    }

    pub fn uniform(low: f64, high: f64) -> Result<Self> {
        let d = Distribution::Uniform { low, high };
        d.validate()?;
        Ok(d)
    }

    pub fn poisson(rate: f64) -> Result<Self> {
        let d = Distribution::Poisson { rate };
        d.validate()?;
        Ok(d)
    }

    /// Check the parameters against each family's constraints.
    pub fn validate(&self) -> Result<()> {
        match self {
            Distribution::Categorical { probs } => {
                if probs.is_empty() {
                    return Err(BayesNetError::invalid("probs", "distribution cannot be empty"));
                }
                if probs.iter().any(|p| *p < 0.0 || !p.is_finite()) {
                    return Err(BayesNetError::NegativeWeight);
                }
                let sum: f64 = probs.iter().sum();
                if (sum - 1.0).abs() > PROB_TOLERANCE {
                    return Err(BayesNetError::invalid(
                        "probs",
                        format!("probabilities sum to {} (expected 1.0)", sum),
                    ));
                }
            }
            Distribution::Bernoulli { p } => {
                if !(0.0..=1.0).contains(p) {
                    return Err(BayesNetError::invalid("p", "must lie in [0, 1]"));
                }
            }
            Distribution::Normal { mean, std } => {
                if !mean.is_finite() {
                    return Err(BayesNetError::invalid("mean", "must be finite"));
                }
                if !(*std > 0.0) || !std.is_finite() {
                    return Err(BayesNetError::invalid("std", "must be positive and finite"));
                }
            }
            Distribution::Uniform { low, high } => {
                if !(low < high) || !low.is_finite() || !high.is_finite() {
                    return Err(BayesNetError::invalid("low/high", "need finite low < high"));
                }
            }
            Distribution::Poisson { rate } => {
                if !(*rate > 0.0) || !rate.is_finite() {
                    return Err(BayesNetError::invalid("rate", "must be positive and finite"));
                }
            }
        }
        Ok(())
    }

    /// Number of categories for finite families, `None` otherwise.
    pub fn cardinality(&self) -> Option<usize> {
        match self {
            Distribution::Categorical { probs } => Some(probs.len()),
            Distribution::Bernoulli { .. } => Some(2),
            _ => None,
        }
    }

    /// Whether the family produces discrete values.
    pub fn is_discrete(&self) -> bool {
        matches!(
            self,
            Distribution::Categorical { .. } | Distribution::Bernoulli { .. } | Distribution::Poisson { .. }
        )
    }

    /// Probability vector of a finite family.
    pub fn probs(&self) -> Option<Vec<f64>> {
        match self {
            Distribution::Categorical { probs } => Some(probs.clone()),
            Distribution::Bernoulli { p } => Some(vec![1.0 - p, *p]),
            _ => None,
        }
    }

    /// Number of free parameters.
    pub fn n_params(&self) -> usize {
        match self {
            Distribution::Categorical { probs } => probs.len().saturating_sub(1),
            Distribution::Bernoulli { .. } | Distribution::Poisson { .. } => 1,
            Distribution::Normal { .. } | Distribution::Uniform { .. } => 2,
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            Distribution::Categorical { probs } => {
                probs.iter().enumerate().map(|(i, p)| i as f64 * p).sum()
            }
            Distribution::Bernoulli { p } => *p,
            Distribution::Normal { mean, .. } => *mean,
            Distribution::Uniform { low, high } => 0.5 * (low + high),
            Distribution::Poisson { rate } => *rate,
        }
    }

    /// Whether `value` lies in the support.
    pub fn contains(&self, value: &Value) -> bool {
        match (self, value) {
            (Distribution::Categorical { probs }, Value::Discrete(k)) => *k < probs.len(),
            (Distribution::Bernoulli { .. }, Value::Discrete(k)) => *k <= 1,
            (Distribution::Poisson { .. }, Value::Discrete(_)) => true,
            (Distribution::Normal { .. }, v) => v.as_f64().is_finite(),
            (Distribution::Uniform { low, high }, v) => {
                let x = v.as_f64();
                x >= *low && x <= *high
            }
            _ => false,
        }
    }

    /// Draw one value.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Value> {
        match self {
            Distribution::Categorical { probs } => Ok(Value::Discrete(sample_index(probs, rng.gen()))),
            Distribution::Bernoulli { p } => Ok(Value::Discrete(usize::from(rng.gen::<f64>() < *p))),
            Distribution::Normal { mean, std } => {
                let normal = Normal::new(*mean, *std)
                    .map_err(|e| BayesNetError::invalid("std", e.to_string()))?;
                Ok(Value::Continuous(normal.sample(rng)))
            }
            Distribution::Uniform { low, high } => Ok(Value::Continuous(rng.gen_range(*low..=*high))),
            Distribution::Poisson { rate } => {
                let poisson = Poisson::new(*rate)
                    .map_err(|e| BayesNetError::invalid("rate", e.to_string()))?;
                let k: f64 = poisson.sample(rng);
                Ok(Value::Discrete(k as usize))
            }
        }
    }

    /// Log probability (mass or density) of `value`.
    ///
    /// Values of the wrong kind or outside the support fail with
    /// [`BayesNetError::Domain`]. Zero-probability categories inside the
    /// support return `-inf`.
    pub fn log_density(&self, variable: &Variable, value: &Value) -> Result<f64> {
        if !self.contains(value) {
            return Err(BayesNetError::Domain {
                variable: variable.clone(),
                value: value.to_string(),
                reason: format!("not in the support of {}", self.family_name()),
            });
        }
        let lp = match (self, value) {
            (Distribution::Categorical { probs }, Value::Discrete(k)) => probs[*k].ln(),
            (Distribution::Bernoulli { p }, Value::Discrete(k)) => {
                if *k == 1 {
                    p.ln()
                } else {
                    (1.0 - p).ln()
                }
            }
            (Distribution::Poisson { rate }, Value::Discrete(k)) => {
                *k as f64 * rate.ln() - rate - ln_factorial(*k)
            }
            (Distribution::Normal { mean, std }, v) => {
                let z = (v.as_f64() - mean) / std;
                -0.5 * (2.0 * PI * std * std).ln() - 0.5 * z * z
            }
            (Distribution::Uniform { low, high }, _) => -(high - low).ln(),
            _ => f64::NEG_INFINITY,
        };
        Ok(lp)
    }

    pub fn density(&self, variable: &Variable, value: &Value) -> Result<f64> {
        Ok(self.log_density(variable, value)?.exp())
    }

    pub fn family_name(&self) -> &'static str {
        match self {
            Distribution::Categorical { .. } => "Categorical",
            Distribution::Bernoulli { .. } => "Bernoulli",
            Distribution::Normal { .. } => "Normal",
            Distribution::Uniform { .. } => "Uniform",
            Distribution::Poisson { .. } => "Poisson",
        }
    }
}

/// Inverse transform sampling from a probability vector with `u` in `[0, 1)`.
pub(crate) fn sample_index(probs: &[f64], u: f64) -> usize {
    let mut cumsum = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumsum += p;
        if u < cumsum {
            return i;
        }
    }
    // u close to 1.0 with rounding drift: take the last non-zero category
    probs.iter().rposition(|&p| p > 0.0).unwrap_or(probs.len() - 1)
}

fn ln_factorial(k: usize) -> f64 {
    (2..=k).map(|i| (i as f64).ln()).sum()
}

/// A distribution family, used to select what `fit` estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionFamily {
    /// Category count is taken from the options, this field, or the data, in that order.
    Categorical { n_categories: Option<usize> },
    Bernoulli,
    Normal,
    Uniform,
    Poisson,
}

impl DistributionFamily {
    /// Maximum-likelihood estimate from observed values of `name`.
    pub fn fit(&self, name: &Variable, values: &[Value], options: &FitOptions) -> Result<Distribution> {
        if values.is_empty() {
            return Err(BayesNetError::InsufficientData {
                name: name.clone(),
                reason: "no observations".to_string(),
            });
        }
        match self {
            DistributionFamily::Categorical { n_categories } => {
                let indices = discrete_values(name, values)?;
                let observed = indices.iter().max().map_or(0, |m| m + 1);
                let n = options
                    .target_cardinality
                    .or(*n_categories)
                    .unwrap_or(observed);
                if observed > n {
                    return Err(BayesNetError::CardinalityMismatch {
                        variable: name.clone(),
                        expected: n,
                        got: observed,
                    });
                }
                let mut counts = vec![options.pseudocount; n];
                for k in indices {
                    counts[k] += 1.0;
                }
                Distribution::from_weights(counts)
            }
            DistributionFamily::Bernoulli => {
                let indices = discrete_values(name, values)?;
                if let Some(bad) = indices.iter().find(|k| **k > 1) {
                    return Err(BayesNetError::Domain {
                        variable: name.clone(),
                        value: bad.to_string(),
                        reason: "Bernoulli values must be 0 or 1".to_string(),
                    });
                }
                let ones = indices.iter().filter(|k| **k == 1).count() as f64;
                let pc = options.pseudocount;
                Distribution::bernoulli((ones + pc) / (indices.len() as f64 + 2.0 * pc))
            }
            DistributionFamily::Normal => {
                let xs: Vec<f64> = values.iter().map(Value::as_f64).collect();
                let n = xs.len() as f64;
                let mean = xs.iter().sum::<f64>() / n;
                let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
                Distribution::normal(mean, var.sqrt().max(options.min_std))
            }
            DistributionFamily::Uniform => {
                let xs = values.iter().map(Value::as_f64);
                let low = xs.clone().fold(f64::INFINITY, f64::min);
                let high = xs.fold(f64::NEG_INFINITY, f64::max);
                if low >= high {
                    return Err(BayesNetError::InsufficientData {
                        name: name.clone(),
                        reason: "uniform fit needs at least two distinct values".to_string(),
                    });
                }
                Distribution::uniform(low, high)
            }
            DistributionFamily::Poisson => {
                let indices = discrete_values(name, values)?;
                let rate = indices.iter().sum::<usize>() as f64 / indices.len() as f64;
                if rate <= 0.0 {
                    return Err(BayesNetError::InsufficientData {
                        name: name.clone(),
                        reason: "all counts are zero".to_string(),
                    });
                }
                Distribution::poisson(rate)
            }
        }
    }
}

fn discrete_values(name: &Variable, values: &[Value]) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|v| {
            v.as_discrete().ok_or_else(|| BayesNetError::Domain {
                variable: name.clone(),
                value: v.to_string(),
                reason: "expected a discrete value".to_string(),
            })
        })
        .collect()
}
