//! Likelihood-weighted sampling.
//!
//! Forward sampling with the evidence clamped:
//!
//! 1. Sample every non-evidence variable from its CPD given its parents
//! 2. Set evidence variables to their observed values
//! 3. Weight = Π P(evidence_var = observed | parents)
//!
//! Estimates divide by the total weight, not by the sample count.

use rand::Rng;

use super::direct::forward_pass;
use super::{check_evidence, Sampler, WeightedAssignment};
use crate::assignment::Assignment;
use crate::error::Result;
use crate::network::BayesNet;

/// Importance sampler that fixes the evidence instead of rejecting.
#[derive(Debug, Clone, Default)]
pub struct LikelihoodWeighting {
    evidence: Assignment,
}

impl LikelihoodWeighting {
    pub fn new(evidence: Assignment) -> Self {
        Self { evidence }
    }

    pub fn evidence(&self) -> &Assignment {
        &self.evidence
    }
}

impl Sampler for LikelihoodWeighting {
    type Sample = WeightedAssignment;

    fn sample_one<R: Rng + ?Sized>(
        &self,
        net: &BayesNet,
        rng: &mut R,
    ) -> Result<WeightedAssignment> {
        let mut samples = self.sample(net, 1, rng)?;
        Ok(samples.remove(0))
    }

    fn sample<R: Rng + ?Sized>(
        &self,
        net: &BayesNet,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<WeightedAssignment>> {
        check_evidence(net, &self.evidence)?;
        let cpds = net.ordered_cpds()?;
        (0..n)
            .map(|_| {
                let (assignment, log_weight) = forward_pass(&cpds, &self.evidence, rng)?;
                Ok(WeightedAssignment {
                    assignment,
                    weight: log_weight.exp(),
                    log_weight,
                })
            })
            .collect()
    }
}

/// Kish effective sample size `(Σw)² / Σw²`.
pub fn effective_sample_size(samples: &[WeightedAssignment]) -> f64 {
    let total: f64 = samples.iter().map(|s| s.weight).sum();
    let sum_sq: f64 = samples.iter().map(|s| s.weight * s.weight).sum();
    if sum_sq > 0.0 {
        total * total / sum_sq
    } else {
        0.0
    }
}
