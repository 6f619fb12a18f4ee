//! Loopy belief propagation.
//!
//! The evidence-reduced CPD factors form a bipartite factor graph with the
//! unobserved variables. Messages are passed in parallel rounds:
//!
//! ```text
//! m(f → v) = Σ_{scope(f) \ v} f · Π_{u ≠ v} m(u → f)
//! m(v → f) = Π_{g ∋ v, g ≠ f} m(g → v)
//! ```
//!
//! until the largest change in any factor-to-variable message drops below
//! the tolerance. On a tree the beliefs are exact; on a graph with loops they
//! are an approximation.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::assignment::{Assignment, Variable};
use crate::elimination::{evidence_factors, query_variables};
use crate::error::{BayesNetError, Result};
use crate::factor::Factor;
use crate::network::BayesNet;

/// Stopping rule for [`LoopyBelief`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeliefConfig {
    /// Maximum number of message rounds.
    pub iterations: usize,
    /// Convergence threshold on the largest message change.
    pub tolerance: f64,
}

impl Default for BeliefConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            tolerance: 1e-8,
        }
    }
}

impl BeliefConfig {
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Sum-product message passing over a discrete network.
pub struct LoopyBelief<'a> {
    net: &'a BayesNet,
    config: BeliefConfig,
}

/// Converged (or last-round) messages for one evidence set.
struct Messages {
    factors: Vec<Factor>,
    /// `(factor, variable)` for every variable in every factor's scope.
    edges: Vec<(usize, Variable)>,
    to_variable: Vec<Factor>,
    to_factor: Vec<Factor>,
    rounds: usize,
}

fn ones(name: &Variable, card: usize) -> Result<Factor> {
    Factor::new(vec![name.clone()], vec![card], vec![1.0; card])
}

fn largest_change(a: &Factor, b: &Factor) -> f64 {
    a.values()
        .iter()
        .zip(b.values())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

impl<'a> LoopyBelief<'a> {
    pub fn new(net: &'a BayesNet) -> Self {
        Self {
            net,
            config: BeliefConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BeliefConfig) -> Self {
        self.config = config;
        self
    }

    fn degenerate(evidence: &Assignment) -> impl Fn(BayesNetError) -> BayesNetError + '_ {
        move |e| match e {
            BayesNetError::DegenerateFactor { .. } => BayesNetError::DegenerateFactor {
                evidence: evidence.clone(),
            },
            other => other,
        }
    }

    fn propagate(&self, evidence: &Assignment) -> Result<Messages> {
        let mut factors = Vec::new();
        for f in evidence_factors(self.net, evidence)? {
            if !f.scope().is_empty() {
                factors.push(f);
            } else if !(f.sum() > 0.0) {
                // every variable of this CPD is observed
                return Err(BayesNetError::DegenerateFactor {
                    evidence: evidence.clone(),
                });
            }
        }

        let mut edges = Vec::new();
        for (i, f) in factors.iter().enumerate() {
            for v in f.scope() {
                edges.push((i, v.clone()));
            }
        }
        let mut to_variable = Vec::with_capacity(edges.len());
        for (i, v) in &edges {
            let card = factors[*i].cardinality(v.as_str()).unwrap_or(1);
            to_variable.push(ones(v, card)?.normalize()?);
        }
        let mut to_factor = to_variable.clone();
        let blame = Self::degenerate(evidence);

        let mut rounds = 0;
        let mut converged = false;
        while rounds < self.config.iterations && !converged {
            rounds += 1;

            let mut next = Vec::with_capacity(edges.len());
            let mut change: f64 = 0.0;
            for (e, (i, v)) in edges.iter().enumerate() {
                let mut msg = factors[*i].clone();
                for (e2, (j, _)) in edges.iter().enumerate() {
                    if j == i && e2 != e {
                        msg = msg.product(&to_factor[e2])?;
                    }
                }
                let others: Vec<&str> = msg
                    .scope()
                    .iter()
                    .filter(|u| *u != v)
                    .map(Variable::as_str)
                    .collect();
                let msg = msg.marginalize_all(&others)?.normalize().map_err(&blame)?;
                change = change.max(largest_change(&msg, &to_variable[e]));
                next.push(msg);
            }
            to_variable = next;

            for (e, (i, v)) in edges.iter().enumerate() {
                let card = factors[*i].cardinality(v.as_str()).unwrap_or(1);
                let mut msg = ones(v, card)?;
                for (e2, (_, u)) in edges.iter().enumerate() {
                    if u == v && e2 != e {
                        msg = msg.product(&to_variable[e2])?;
                    }
                }
                to_factor[e] = msg.normalize().map_err(&blame)?;
            }

            converged = change < self.config.tolerance;
        }

        if converged {
            debug!(
                "loopy belief propagation converged after {} rounds over {} messages",
                rounds,
                edges.len()
            );
        } else {
            warn!(
                "loopy belief propagation stopped after {} rounds without converging",
                rounds
            );
        }

        Ok(Messages {
            factors,
            edges,
            to_variable,
            to_factor,
            rounds,
        })
    }

    /// Approximate posterior over `query`.
    ///
    /// A single variable gets its belief from all incoming factor messages.
    /// Several variables are answered from the belief of a factor whose
    /// scope covers all of them; a query no single factor covers fails with
    /// [`BayesNetError::InvalidParameter`].
    pub fn infer<N: AsRef<str>>(&self, query: &[N], evidence: &Assignment) -> Result<Factor> {
        let query_vars = query_variables(self.net, query, evidence)?;
        let messages = self.propagate(evidence)?;
        let blame = Self::degenerate(evidence);

        if let [v] = query_vars.as_slice() {
            let card = self.net.cardinality(v.as_str())?;
            let mut belief = ones(v, card)?;
            for (e, (_, u)) in messages.edges.iter().enumerate() {
                if u == v {
                    belief = belief.product(&messages.to_variable[e])?;
                }
            }
            return belief.normalize().map_err(&blame);
        }

        let (i, f) = messages
            .factors
            .iter()
            .enumerate()
            .find(|(_, f)| query_vars.iter().all(|q| f.contains(q.as_str())))
            .ok_or_else(|| {
                BayesNetError::invalid(
                    "query",
                    "loopy belief propagation answers joint queries only within one factor",
                )
            })?;
        let mut belief = f.clone();
        for (e, (j, _)) in messages.edges.iter().enumerate() {
            if *j == i {
                belief = belief.product(&messages.to_factor[e])?;
            }
        }
        let others: Vec<&str> = belief
            .scope()
            .iter()
            .filter(|u| !query_vars.contains(*u))
            .map(Variable::as_str)
            .collect();
        belief
            .marginalize_all(&others)?
            .permute(&query_vars)?
            .normalize()
            .map_err(&blame)
    }

    /// Number of message rounds needed for `evidence`.
    pub fn rounds(&self, evidence: &Assignment) -> Result<usize> {
        Ok(self.propagate(evidence)?.rounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpd::Cpd;
    use crate::distribution::Distribution;
    use crate::elimination::infer;
    use crate::network::sprinkler_network;

    fn two_node() -> BayesNet {
        BayesNet::from_cpds([
            Cpd::new_static("a", Distribution::categorical(vec![0.3, 0.7]).unwrap()).unwrap(),
            Cpd::discrete("b", &["a"], vec![2], vec![vec![0.1, 0.9], vec![0.8, 0.2]]).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_exact_on_a_tree() {
        let net = two_node();
        let bp = LoopyBelief::new(&net);
        let pb = bp.infer(&["b"], &Assignment::new()).unwrap().to_probs().unwrap();
        assert!((pb[0] - 0.59).abs() < 1e-9);
        assert!((pb[1] - 0.41).abs() < 1e-9);

        let evidence = Assignment::new().with("b", 0usize);
        let exact = infer(&net, &["a"], &evidence).unwrap();
        assert!(bp.infer(&["a"], &evidence).unwrap().approx_eq(&exact, 1e-9));
    }

    #[test]
    fn test_joint_within_one_factor() {
        let net = two_node();
        let joint = LoopyBelief::new(&net)
            .infer(&["a", "b"], &Assignment::new())
            .unwrap();
        let exact = infer(&net, &["a", "b"], &Assignment::new()).unwrap();
        assert_eq!(joint.scope(), exact.scope());
        assert!(joint.approx_eq(&exact, 1e-9));
    }

    #[test]
    fn test_sprinkler_against_exact() {
        let net = sprinkler_network().unwrap();
        let bp = LoopyBelief::new(&net);

        // Observing rain cuts the only loop, so the beliefs are exact.
        let cut = Assignment::new().with("rain", 1usize).with("wet_grass", 1usize);
        for name in ["cloudy", "sprinkler"] {
            let exact = infer(&net, &[name], &cut).unwrap();
            assert!(bp.infer(&[name], &cut).unwrap().approx_eq(&exact, 1e-6), "{}", name);
        }

        // With the loop intact the beliefs are close but not exact.
        let wet = Assignment::new().with("wet_grass", 1usize);
        for name in ["cloudy", "sprinkler", "rain"] {
            let exact = infer(&net, &[name], &wet).unwrap();
            assert!(bp.infer(&[name], &wet).unwrap().approx_eq(&exact, 0.1), "{}", name);
        }
        assert!(bp.rounds(&wet).unwrap() < BeliefConfig::default().iterations);
    }

    #[test]
    fn test_round_budget() {
        let net = sprinkler_network().unwrap();
        let bp = LoopyBelief::new(&net).with_config(BeliefConfig::default().with_iterations(2));
        let wet = Assignment::new().with("wet_grass", 1usize);
        assert_eq!(bp.rounds(&wet).unwrap(), 2);
        let p = bp.infer(&["rain"], &wet).unwrap().to_probs().unwrap();
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_uncovered_joint_query() {
        let net = sprinkler_network().unwrap();
        let result = LoopyBelief::new(&net).infer(&["cloudy", "wet_grass"], &Assignment::new());
        assert!(matches!(result, Err(BayesNetError::InvalidParameter { .. })));
    }

    #[test]
    fn test_impossible_evidence() {
        let net = sprinkler_network().unwrap();
        let evidence = Assignment::new()
            .with("sprinkler", 0usize)
            .with("rain", 0usize)
            .with("wet_grass", 1usize);
        match LoopyBelief::new(&net).infer(&["cloudy"], &evidence) {
            Err(BayesNetError::DegenerateFactor { evidence: got }) => assert_eq!(got, evidence),
            other => panic!("unexpected {:?}", other),
        }
    }
}
