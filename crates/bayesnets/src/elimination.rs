//! Exact inference by variable elimination.
//!
//! Each discrete CPD becomes a factor over its node and parents. Evidence
//! restricts those factors, the remaining non-query variables are summed out
//! one at a time, and the product of what is left is normalized into the
//! posterior over the query.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::assignment::{Assignment, Variable};
use crate::error::{BayesNetError, Result};
use crate::factor::Factor;
use crate::network::BayesNet;

/// Policy for choosing the order in which hidden variables are summed out.
///
/// The order affects the size of intermediate factors, never the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EliminationOrder {
    /// Topological order of the hidden nodes.
    #[default]
    Topological,
    /// Greedy: always eliminate the variable with the fewest current neighbours.
    MinDegree,
}

/// One factor per node, restricted by the evidence.
pub(crate) fn evidence_factors(net: &BayesNet, evidence: &Assignment) -> Result<Vec<Factor>> {
    net.check_complete()?;
    for name in evidence.names() {
        if !net.contains(name.as_str()) {
            return Err(BayesNetError::UndefinedVariable { name: name.clone() });
        }
    }
    net.ordered_cpds()?
        .into_iter()
        .map(|cpd| cpd.to_factor()?.reduce(evidence))
        .collect()
}

/// Resolve query names, rejecting unknown, observed and repeated ones.
pub(crate) fn query_variables<N: AsRef<str>>(
    net: &BayesNet,
    query: &[N],
    evidence: &Assignment,
) -> Result<Vec<Variable>> {
    let mut query_vars: Vec<Variable> = Vec::with_capacity(query.len());
    for q in query {
        let name = q.as_ref();
        if !net.contains(name) {
            return Err(BayesNetError::UndefinedVariable {
                name: Variable::new(name),
            });
        }
        if evidence.contains(name) {
            return Err(BayesNetError::invalid(
                "query",
                format!("{} is also observed", name),
            ));
        }
        let v = Variable::new(name);
        if query_vars.contains(&v) {
            return Err(BayesNetError::invalid(
                "query",
                format!("{} listed twice", name),
            ));
        }
        query_vars.push(v);
    }
    Ok(query_vars)
}

/// Variable elimination over a fully discrete network.
pub struct VariableElimination<'a> {
    net: &'a BayesNet,
    order: EliminationOrder,
}

impl<'a> VariableElimination<'a> {
    pub fn new(net: &'a BayesNet) -> Self {
        Self {
            net,
            order: EliminationOrder::default(),
        }
    }

    pub fn with_order(mut self, order: EliminationOrder) -> Self {
        self.order = order;
        self
    }

    fn hidden_order(&self, hidden: Vec<Variable>, factors: &[Factor]) -> Vec<Variable> {
        match self.order {
            EliminationOrder::Topological => hidden,
            EliminationOrder::MinDegree => {
                let mut remaining = hidden;
                let mut scopes: Vec<Vec<Variable>> =
                    factors.iter().map(|f| f.scope().to_vec()).collect();
                let mut order = Vec::with_capacity(remaining.len());
                while !remaining.is_empty() {
                    let degree = |v: &Variable| {
                        let mut neighbours: Vec<&Variable> = Vec::new();
                        for scope in scopes.iter().filter(|s| s.contains(v)) {
                            for u in scope {
                                if u != v && !neighbours.contains(&u) {
                                    neighbours.push(u);
                                }
                            }
                        }
                        neighbours.len()
                    };
                    // min_by_key keeps the first minimum, so ties go to topological order
                    let pos = remaining
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, v)| degree(*v))
                        .map_or(0, |(i, _)| i);
                    let v = remaining.remove(pos);

                    let mut merged: Vec<Variable> = Vec::new();
                    scopes.retain(|s| {
                        if s.contains(&v) {
                            for u in s {
                                if *u != v && !merged.contains(u) {
                                    merged.push(u.clone());
                                }
                            }
                            false
                        } else {
                            true
                        }
                    });
                    scopes.push(merged);
                    order.push(v);
                }
                order
            }
        }
    }

    fn eliminate(&self, mut factors: Vec<Factor>, order: &[Variable]) -> Result<Vec<Factor>> {
        for v in order {
            let (touching, rest): (Vec<Factor>, Vec<Factor>) =
                factors.into_iter().partition(|f| f.contains(v.as_str()));
            factors = rest;
            if touching.is_empty() {
                continue;
            }
            let n = touching.len();
            let product = touching
                .iter()
                .try_fold(Factor::scalar(1.0)?, |acc, f| acc.product(f))?;
            let summed = product.marginalize(v.as_str())?;
            trace!(
                "eliminated {}: {} factors, intermediate table of {} entries",
                v,
                n,
                product.values().len()
            );
            factors.push(summed);
        }
        Ok(factors)
    }

    /// The posterior `P(query | evidence)` as a normalized factor whose scope
    /// is exactly `query`, in the given order.
    pub fn infer<N: AsRef<str>>(&self, query: &[N], evidence: &Assignment) -> Result<Factor> {
        let query_vars = query_variables(self.net, query, evidence)?;
        let factors = evidence_factors(self.net, evidence)?;
        let hidden: Vec<Variable> = self
            .net
            .topological_order()
            .into_iter()
            .filter(|v| !query_vars.contains(v) && !evidence.contains(v.as_str()))
            .collect();
        let order = self.hidden_order(hidden, &factors);
        debug!(
            "variable elimination: query {:?}, {} evidence, order {:?}",
            query_vars.iter().map(Variable::as_str).collect::<Vec<_>>(),
            evidence.len(),
            order.iter().map(Variable::as_str).collect::<Vec<_>>()
        );

        let remaining = self.eliminate(factors, &order)?;
        let joint = remaining
            .iter()
            .try_fold(Factor::scalar(1.0)?, |acc, f| acc.product(f))?;
        joint
            .permute(&query_vars)?
            .normalize()
            .map_err(|_| BayesNetError::DegenerateFactor {
                evidence: evidence.clone(),
            })
    }

    /// `P(evidence)`, summing out every unobserved variable.
    pub fn probability_of_evidence(&self, evidence: &Assignment) -> Result<f64> {
        let factors = evidence_factors(self.net, evidence)?;
        let hidden: Vec<Variable> = self
            .net
            .topological_order()
            .into_iter()
            .filter(|v| !evidence.contains(v.as_str()))
            .collect();
        let order = self.hidden_order(hidden, &factors);
        let remaining = self.eliminate(factors, &order)?;
        Ok(remaining.iter().map(Factor::sum).product())
    }
}

/// `P(query | evidence)` with the default elimination order.
pub fn infer<N: AsRef<str>>(net: &BayesNet, query: &[N], evidence: &Assignment) -> Result<Factor> {
    VariableElimination::new(net).infer(query, evidence)
}

/// `P(evidence)` with the default elimination order.
pub fn probability_of_evidence(net: &BayesNet, evidence: &Assignment) -> Result<f64> {
    VariableElimination::new(net).probability_of_evidence(evidence)
}
