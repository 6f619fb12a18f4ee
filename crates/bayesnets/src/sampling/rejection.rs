//! Rejection sampling with a bounded attempt budget.

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::direct::forward_pass;
use super::{check_evidence, Sampler};
use crate::assignment::{Assignment, Value};
use crate::error::{BayesNetError, Result};
use crate::network::BayesNet;

/// Configuration for [`RejectionSampler`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RejectionConfig {
    /// Forward samples drawn per call before giving up.
    pub max_attempts: usize,
}

impl Default for RejectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1_000_000,
        }
    }
}

impl RejectionConfig {
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Draws forward samples and keeps those that match the evidence exactly.
///
/// The attempt budget is shared by all samples of one call; exhausting it
/// fails with [`BayesNetError::RejectionLimit`].
#[derive(Debug, Clone, Default)]
pub struct RejectionSampler {
    evidence: Assignment,
    config: RejectionConfig,
}

impl RejectionSampler {
    pub fn new(evidence: Assignment) -> Self {
        Self {
            evidence,
            config: RejectionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RejectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn evidence(&self) -> &Assignment {
        &self.evidence
    }

    pub fn config(&self) -> &RejectionConfig {
        &self.config
    }

    /// Fail fast on evidence no forward sample can ever match.
    fn check_support(&self, net: &BayesNet) -> Result<()> {
        check_evidence(net, &self.evidence)?;
        for (name, value) in &self.evidence {
            let cpd = net.cpd(name.as_str())?;
            let impossible = match value {
                // Continuous draws never hit a fixed point.
                Value::Continuous(_) => true,
                Value::Discrete(_) if cpd.is_continuous() => true,
                Value::Discrete(k) => cpd.cardinality().is_some_and(|card| *k >= card),
            };
            if impossible {
                return Err(BayesNetError::DegenerateFactor {
                    evidence: self.evidence.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Sampler for RejectionSampler {
    type Sample = Assignment;

    fn sample_one<R: Rng + ?Sized>(&self, net: &BayesNet, rng: &mut R) -> Result<Assignment> {
        let mut samples = self.sample(net, 1, rng)?;
        samples.pop().ok_or_else(|| BayesNetError::RejectionLimit {
            attempts: 0,
            accepted: 0,
            requested: 1,
            evidence: self.evidence.clone(),
        })
    }

    fn sample<R: Rng + ?Sized>(
        &self,
        net: &BayesNet,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Assignment>> {
        self.check_support(net)?;
        let cpds = net.ordered_cpds()?;
        let empty = Assignment::new();

        let mut accepted = Vec::with_capacity(n);
        let mut attempts = 0;
        while accepted.len() < n {
            if attempts >= self.config.max_attempts {
                return Err(BayesNetError::RejectionLimit {
                    attempts,
                    accepted: accepted.len(),
                    requested: n,
                    evidence: self.evidence.clone(),
                });
            }
            attempts += 1;
            let (candidate, _) = forward_pass(&cpds, &empty, rng)?;
            if candidate.is_consistent_with(&self.evidence) {
                accepted.push(candidate);
            }
        }

        debug!(
            "rejection sampling accepted {} of {} attempts ({:.4})",
            n,
            attempts,
            n as f64 / attempts.max(1) as f64
        );
        Ok(accepted)
    }
}
