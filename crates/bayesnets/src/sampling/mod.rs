//! Stochastic samplers over a [`BayesNet`].
//!
//! | Sampler | Evidence | Output |
//! |---------|----------|--------|
//! | [`DirectSampler`] | none | [`Assignment`] |
//! | [`RejectionSampler`] | exact match, bounded attempts | [`Assignment`] |
//! | [`LikelihoodWeighting`] | fixed, reweighted | [`WeightedAssignment`] |
//! | [`GibbsSampler`] | fixed, Markov chain | [`Assignment`] |
//!
//! Every sampler reads the network without mutating it and draws all of its
//! randomness from the `rng` it is handed, so a seeded [`rand::rngs::StdRng`]
//! gives reproducible output.

mod direct;
mod gibbs;
mod likelihood;
mod rejection;

use rand::Rng;
use serde::{Deserialize, Serialize};

pub use direct::DirectSampler;
pub use gibbs::{GibbsChain, GibbsConfig, GibbsSampler, VariableOrder};
pub use likelihood::{effective_sample_size, LikelihoodWeighting};
pub use rejection::{RejectionConfig, RejectionSampler};

use crate::assignment::{Assignment, Variable};
use crate::error::{BayesNetError, Result};
use crate::factor::Factor;
use crate::network::BayesNet;

/// A strategy for drawing samples from a network.
pub trait Sampler {
    type Sample;

    /// Draw a single sample.
    fn sample_one<R: Rng + ?Sized>(&self, net: &BayesNet, rng: &mut R) -> Result<Self::Sample>;

    /// Draw `n` samples. Either all of them are returned or the call fails.
    fn sample<R: Rng + ?Sized>(
        &self,
        net: &BayesNet,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Self::Sample>> {
        (0..n).map(|_| self.sample_one(net, rng)).collect()
    }
}

/// An assignment with its importance weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedAssignment {
    pub assignment: Assignment,
    pub weight: f64,
    pub log_weight: f64,
}

/// Every evidence variable must be a node of `net`.
pub(crate) fn check_evidence(net: &BayesNet, evidence: &Assignment) -> Result<()> {
    match evidence.names().find(|n| !net.contains(n.as_str())) {
        Some(name) => Err(BayesNetError::UndefinedVariable { name: name.clone() }),
        None => Ok(()),
    }
}

/// Exponentiate and normalize log weights using log-sum-exp.
///
/// Returns `None` when every weight is zero.
pub(crate) fn normalize_log(log_weights: &[f64]) -> Option<Vec<f64>> {
    let max = log_weights
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return None;
    }
    let shifted: Vec<f64> = log_weights.iter().map(|lw| (lw - max).exp()).collect();
    let total: f64 = shifted.iter().sum();
    Some(shifted.into_iter().map(|w| w / total).collect())
}

fn query_scope<N: AsRef<str>>(net: &BayesNet, query: &[N]) -> Result<(Vec<Variable>, Vec<usize>)> {
    let scope: Vec<Variable> = query.iter().map(|q| Variable::new(q.as_ref())).collect();
    let cards = query
        .iter()
        .map(|q| net.cardinality(q.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok((scope, cards))
}

fn accumulate<'s, N, I>(net: &BayesNet, query: &[N], samples: I) -> Result<Factor>
where
    N: AsRef<str>,
    I: IntoIterator<Item = (&'s Assignment, f64)>,
{
    let (scope, cards) = query_scope(net, query)?;
    let mut values = vec![0.0; cards.iter().product()];
    for (assignment, weight) in samples {
        let mut idx = 0;
        for (name, &card) in scope.iter().zip(&cards) {
            let k = assignment.discrete(name.as_str())?;
            if k >= card {
                return Err(BayesNetError::Domain {
                    variable: name.clone(),
                    value: k.to_string(),
                    reason: format!("variable has {} categories", card),
                });
            }
            idx = idx * card + k;
        }
        values[idx] += weight;
    }
    Factor::new(scope, cards, values)?.normalize()
}

/// Normalized sample frequencies over the discrete `query` variables.
pub fn empirical_factor<N: AsRef<str>>(
    net: &BayesNet,
    query: &[N],
    samples: &[Assignment],
) -> Result<Factor> {
    accumulate(net, query, samples.iter().map(|a| (a, 1.0)))
}

/// Weighted sample frequencies over the discrete `query` variables.
///
/// Dividing by the total weight (not the sample count) is what makes the
/// likelihood-weighting estimate consistent.
pub fn weighted_factor<N: AsRef<str>>(
    net: &BayesNet,
    query: &[N],
    samples: &[WeightedAssignment],
) -> Result<Factor> {
    accumulate(
        net,
        query,
        samples.iter().map(|s| (&s.assignment, s.weight)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::sprinkler_network;

    #[test]
    fn test_normalize_log() {
        let probs = normalize_log(&[-1000.0, -1000.0 + 2f64.ln()]).unwrap();
        assert!((probs[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((probs[1] - 2.0 / 3.0).abs() < 1e-12);
        assert!(normalize_log(&[f64::NEG_INFINITY, f64::NEG_INFINITY]).is_none());
    }

    #[test]
    fn test_empirical_factor() {
        let net = sprinkler_network().unwrap();
        let samples = vec![
            Assignment::new().with("rain", 1usize),
            Assignment::new().with("rain", 1usize),
            Assignment::new().with("rain", 0usize),
            Assignment::new().with("rain", 1usize),
        ];
        let f = empirical_factor(&net, &["rain"], &samples).unwrap();
        assert_eq!(f.to_probs().unwrap(), vec![0.25, 0.75]);

        assert!(matches!(
            empirical_factor(&net, &["rain"], &[]),
            Err(BayesNetError::DegenerateFactor { .. })
        ));
    }

    #[test]
    fn test_weighted_factor() {
        let net = sprinkler_network().unwrap();
        let sample = |rain: usize, weight: f64| WeightedAssignment {
            assignment: Assignment::new().with("rain", rain),
            weight,
            log_weight: weight.ln(),
        };
        let samples = vec![sample(0, 0.1), sample(1, 0.3), sample(1, 0.0)];
        let f = weighted_factor(&net, &["rain"], &samples).unwrap();
        let probs = f.to_probs().unwrap();
        assert!((probs[0] - 0.25).abs() < 1e-12);
        assert!((probs[1] - 0.75).abs() < 1e-12);
    }
}
