//! # Bayesnets - Discrete and Hybrid Bayesian Networks
//!
//! This crate represents a joint distribution over named random variables as
//! a directed acyclic graph of local conditional distributions, and answers
//! queries against it exactly (variable elimination) or approximately
//! (sampling, loopy belief propagation).
//!
//! ## Core Concepts
//!
//! - **A CPD is a kernel**: `P(target | parents)` maps parent values to a distribution
//! - **A network composes kernels along a DAG**: `P(x) = Π P(xᵢ | parents(xᵢ))`
//! - **Factors are unnormalized tables**: product, marginalize, restrict, normalize
//! - **Conditioning is restriction plus renormalization**, not plain composition
//! - **Sampling reads the network, never mutates it**; randomness comes from the caller's `Rng`
//!
//! ## Example: Two-Node Network
//!
//! ```rust
//! use bayesnets::{infer, Assignment, BayesNet, Cpd, Distribution};
//!
//! // a ~ Categorical([0.3, 0.7]); b | a from a 2x2 table (row = value of a)
//! let mut net = BayesNet::new();
//! net.add(Cpd::new_static("a", Distribution::categorical(vec![0.3, 0.7]).unwrap()).unwrap()).unwrap();
//! net.add(Cpd::discrete("b", &["a"], vec![2], vec![vec![0.1, 0.9], vec![0.8, 0.2]]).unwrap()).unwrap();
//!
//! // P(b) = [0.3·0.1 + 0.7·0.8, 0.3·0.9 + 0.7·0.2]
//! let pb = infer(&net, &["b"], &Assignment::new()).unwrap().to_probs().unwrap();
//! assert!((pb[0] - 0.59).abs() < 1e-9);
//!
//! // P(b | a = 0) is the first row
//! let given = infer(&net, &["b"], &Assignment::new().with("a", 0usize)).unwrap();
//! assert!((given.to_probs().unwrap()[1] - 0.9).abs() < 1e-9);
//! ```

mod assignment;
mod belief;
mod cpd;
mod distribution;
mod elimination;
mod error;
mod factor;
mod inference;
mod network;
pub mod sampling;

pub use assignment::{Assignment, Value, Variable};
pub use belief::{BeliefConfig, LoopyBelief};
pub use cpd::{
    CategoricalCpd, ConditionalLinearGaussian, Cpd, CpdFamily, CpdKind, FitOptions,
    LinearGaussian, ParentFn,
};
pub use distribution::{Distribution, DistributionFamily};
pub use elimination::{infer, probability_of_evidence, EliminationOrder, VariableElimination};
pub use error::{BayesNetError, Result};
pub use factor::Factor;
pub use inference::InferenceMethod;
pub use network::{sprinkler_network, BayesNet, Removal};
pub use sampling::{
    empirical_factor, weighted_factor, DirectSampler, GibbsConfig, GibbsSampler,
    LikelihoodWeighting, RejectionConfig, RejectionSampler, Sampler, VariableOrder,
    WeightedAssignment,
};

/// Tolerance for probability comparisons.
pub const PROB_TOLERANCE: f64 = 1e-6;
