//! Choosing between exact and approximate inference.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::assignment::Assignment;
use crate::belief::{BeliefConfig, LoopyBelief};
use crate::elimination::{EliminationOrder, VariableElimination};
use crate::error::Result;
use crate::factor::Factor;
use crate::network::BayesNet;
use crate::sampling::{
    empirical_factor, weighted_factor, GibbsConfig, GibbsSampler, LikelihoodWeighting, Sampler,
};

/// How to compute `P(query | evidence)`.
///
/// # Example
///
/// ```rust
/// use bayesnets::{sprinkler_network, Assignment, InferenceMethod};
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let net = sprinkler_network().unwrap();
/// let evidence = Assignment::new().with("wet_grass", 1usize);
/// let mut rng = StdRng::seed_from_u64(42);
///
/// let exact = InferenceMethod::default().infer(&net, &["rain"], &evidence, &mut rng).unwrap();
/// let approx = InferenceMethod::LikelihoodWeighting { n_samples: 20_000 }
///     .infer(&net, &["rain"], &evidence, &mut rng)
///     .unwrap();
/// assert!(exact.approx_eq(&approx, 0.02));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InferenceMethod {
    /// Variable elimination; discrete networks only.
    Exact(EliminationOrder),
    LikelihoodWeighting { n_samples: usize },
    /// Sum-product message passing; discrete networks only, approximate
    /// when the network has loops.
    LoopyBelief { iterations: usize, tolerance: f64 },
    /// The config's own evidence is replaced by the evidence passed to `infer`.
    /// Use [`VariableOrder::Sweep`](crate::VariableOrder::Sweep) to change
    /// every node per iteration.
    Gibbs { config: GibbsConfig, n_samples: usize },
}

impl Default for InferenceMethod {
    fn default() -> Self {
        InferenceMethod::Exact(EliminationOrder::default())
    }
}

impl InferenceMethod {
    /// Posterior over the discrete `query` variables as a normalized factor.
    ///
    /// `rng` is only drawn from by the sampling methods.
    pub fn infer<N: AsRef<str>, R: Rng + ?Sized>(
        &self,
        net: &BayesNet,
        query: &[N],
        evidence: &Assignment,
        rng: &mut R,
    ) -> Result<Factor> {
        match self {
            InferenceMethod::Exact(order) => VariableElimination::new(net)
                .with_order(*order)
                .infer(query, evidence),
            InferenceMethod::LikelihoodWeighting { n_samples } => {
                let samples =
                    LikelihoodWeighting::new(evidence.clone()).sample(net, *n_samples, rng)?;
                weighted_factor(net, query, &samples)
            }
            InferenceMethod::LoopyBelief {
                iterations,
                tolerance,
            } => {
                let config = BeliefConfig::default()
                    .with_iterations(*iterations)
                    .with_tolerance(*tolerance);
                LoopyBelief::new(net).with_config(config).infer(query, evidence)
            }
            InferenceMethod::Gibbs { config, n_samples } => {
                let config = config.clone().with_evidence(evidence.clone());
                let samples = GibbsSampler::new(config).sample(net, *n_samples, rng)?;
                empirical_factor(net, query, &samples)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::sprinkler_network;
    use crate::sampling::VariableOrder;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_methods_agree() {
        let net = sprinkler_network().unwrap();
        let evidence = Assignment::new().with("wet_grass", 1usize);
        let mut rng = StdRng::seed_from_u64(17);

        let exact = InferenceMethod::default()
            .infer(&net, &["cloudy"], &evidence, &mut rng)
            .unwrap();
        for method in [
            InferenceMethod::LikelihoodWeighting { n_samples: 20_000 },
            InferenceMethod::Gibbs {
                config: GibbsConfig::default().with_burn_in(500).with_thinning(2),
                n_samples: 20_000,
            },
            InferenceMethod::Gibbs {
                config: GibbsConfig::default()
                    .with_burn_in(200)
                    .with_order(VariableOrder::Sweep),
                n_samples: 10_000,
            },
        ] {
            let approx = method.infer(&net, &["cloudy"], &evidence, &mut rng).unwrap();
            assert!(exact.approx_eq(&approx, 0.03), "{:?}: {:?}", method, approx);
        }
    }

    #[test]
    fn test_loopy_belief_method() {
        let net = sprinkler_network().unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let method = InferenceMethod::LoopyBelief {
            iterations: 100,
            tolerance: 1e-8,
        };

        // sprinkler observed: no loop left
        let evidence = Assignment::new().with("sprinkler", 1usize);
        for name in ["cloudy", "rain", "wet_grass"] {
            let exact = InferenceMethod::default()
                .infer(&net, &[name], &evidence, &mut rng)
                .unwrap();
            let approx = method.infer(&net, &[name], &evidence, &mut rng).unwrap();
            assert!(exact.approx_eq(&approx, 1e-6), "{}: {:?}", name, approx);
        }
    }

    #[test]
    fn test_method_from_json() {
        let method: InferenceMethod =
            serde_json::from_str(r#"{"LikelihoodWeighting": {"n_samples": 500}}"#).unwrap();
        assert_eq!(method, InferenceMethod::LikelihoodWeighting { n_samples: 500 });

        let method: InferenceMethod = serde_json::from_str(r#"{"Exact": "MinDegree"}"#).unwrap();
        assert_eq!(method, InferenceMethod::Exact(EliminationOrder::MinDegree));

        let method: InferenceMethod =
            serde_json::from_str(r#"{"LoopyBelief": {"iterations": 20, "tolerance": 1e-6}}"#).unwrap();
        assert_eq!(
            method,
            InferenceMethod::LoopyBelief {
                iterations: 20,
                tolerance: 1e-6
            }
        );
    }
}
