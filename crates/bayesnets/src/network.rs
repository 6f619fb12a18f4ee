//! Bayesian networks as DAGs of conditional distributions.
//!
//! A Bayesian network is a directed acyclic graph where:
//! - Nodes are random variables
//! - Edges run from each parent to its child
//! - Each node carries a CPD over its value given its parents
//!
//! The joint distribution factorizes as `P(x) = Π P(xᵢ | parents(xᵢ))`.
//!
//! CPDs may name parents that have not been added yet. Such parents become
//! placeholder nodes without a CPD until their own CPD arrives, so a later
//! `add` can close a cycle and is rejected.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use log::warn;
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;

use crate::assignment::{Assignment, Value, Variable};
use crate::cpd::{count_table, Cpd, CpdFamily, FitOptions};
use crate::error::{BayesNetError, Result};
use crate::factor::Factor;

#[derive(Debug, Clone)]
struct Node {
    name: Variable,
    cpd: Option<Cpd>,
    /// Insertion rank; breaks ties in topological order.
    rank: usize,
}

/// What `remove` took out of the network.
#[derive(Debug, Clone)]
pub struct Removal {
    /// The removed CPD (`None` for a placeholder).
    pub cpd: Option<Cpd>,
    /// Nodes whose CPD still lists the removed variable as a parent.
    pub dependents: Vec<Variable>,
}

/// A Bayesian network over named variables.
///
/// # Example
///
/// ```rust
/// use bayesnets::{BayesNet, Cpd, Distribution};
///
/// let mut net = BayesNet::new();
/// net.add(Cpd::new_static("a", Distribution::categorical(vec![0.3, 0.7]).unwrap()).unwrap()).unwrap();
/// net.add(Cpd::discrete("b", &["a"], vec![2], vec![vec![0.1, 0.9], vec![0.8, 0.2]]).unwrap()).unwrap();
///
/// let order: Vec<String> = net.topological_order().iter().map(|v| v.to_string()).collect();
/// assert_eq!(order, ["a", "b"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BayesNet {
    graph: StableDiGraph<Node, ()>,
    index: HashMap<Variable, NodeIndex>,
    next_rank: usize,
}

impl BayesNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a network from CPDs, added in the given order.
    pub fn from_cpds<I: IntoIterator<Item = Cpd>>(cpds: I) -> Result<Self> {
        let mut net = Self::new();
        for cpd in cpds {
            net.add(cpd)?;
        }
        Ok(net)
    }

    fn node_for(&mut self, name: &Variable) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(Node {
            name: name.clone(),
            cpd: None,
            rank: self.next_rank,
        });
        self.next_rank += 1;
        self.index.insert(name.clone(), idx);
        idx
    }

    /// Insert a CPD, creating its node and the edges from its parents.
    ///
    /// Fails with [`BayesNetError::DuplicateName`] if the target already has a
    /// CPD, and with [`BayesNetError::Cycle`] if the new edges would close a
    /// directed cycle. A failed `add` leaves the network unchanged.
    pub fn add(&mut self, cpd: Cpd) -> Result<()> {
        let target = cpd.target().clone();
        let existing = self.index.get(&target).copied();
        if let Some(idx) = existing {
            if self.graph[idx].cpd.is_some() {
                return Err(BayesNetError::DuplicateName { name: target });
            }
        }

        // Nodes that will hang below the target: current out-edges of a
        // placeholder, plus CPDs still naming a removed variable.
        let mut below: Vec<NodeIndex> = existing
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Outgoing).collect())
            .unwrap_or_default();
        for idx in self.graph.node_indices() {
            let lists_target = self.graph[idx]
                .cpd
                .as_ref()
                .is_some_and(|c| c.parents().contains(&target));
            if lists_target && !below.contains(&idx) {
                below.push(idx);
            }
        }

        for parent in cpd.parents() {
            let Some(&p) = self.index.get(parent) else {
                continue;
            };
            let closes_cycle = below
                .iter()
                .any(|&child| child == p || has_path_connecting(&self.graph, child, p, None));
            if closes_cycle {
                return Err(BayesNetError::Cycle {
                    target,
                    parents: cpd.parents().to_vec(),
                });
            }
        }

        let idx = self.node_for(&target);
        for parent in cpd.parents() {
            let p = self.node_for(parent);
            self.graph.update_edge(p, idx, ());
        }
        for child in below {
            self.graph.update_edge(idx, child, ());
        }
        self.graph[idx].cpd = Some(cpd);
        Ok(())
    }

    /// Delete a node and its incident edges.
    ///
    /// If other CPDs still list `name` as a parent they are reported in
    /// [`Removal::dependents`]; the network is inconsistent until they are
    /// replaced or removed too.
    pub fn remove(&mut self, name: &str) -> Result<Removal> {
        let idx = self
            .index
            .remove(name)
            .ok_or_else(|| BayesNetError::UndefinedVariable {
                name: Variable::new(name),
            })?;
        let dependents = self.sorted(
            self.graph
                .neighbors_directed(idx, Direction::Outgoing)
                .collect(),
        );
        let node = self
            .graph
            .remove_node(idx)
            .ok_or_else(|| BayesNetError::UndefinedVariable {
                name: Variable::new(name),
            })?;
        if !dependents.is_empty() {
            warn!(
                "removed {} while {:?} still list it as a parent",
                name,
                dependents.iter().map(Variable::as_str).collect::<Vec<_>>()
            );
        }
        Ok(Removal {
            cpd: node.cpd,
            dependents,
        })
    }

    fn sorted(&self, mut nodes: Vec<NodeIndex>) -> Vec<Variable> {
        nodes.sort_by_key(|&i| self.graph[i].rank);
        nodes.into_iter().map(|i| self.graph[i].name.clone()).collect()
    }

    fn lookup(&self, name: &str) -> Result<NodeIndex> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| BayesNetError::UndefinedVariable {
                name: Variable::new(name),
            })
    }

    /// Variables consistent with the DAG, ties broken by insertion order.
    pub fn topological_order(&self) -> Vec<Variable> {
        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        let mut ready = BinaryHeap::new();
        let mut result = Vec::with_capacity(self.graph.node_count());

        for node in self.graph.node_indices() {
            let degree = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .count();
            in_degree.insert(node, degree);
            if degree == 0 {
                ready.push(Reverse((self.graph[node].rank, node)));
            }
        }

        while let Some(Reverse((_, node))) = ready.pop() {
            result.push(self.graph[node].name.clone());
            for successor in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(deg) = in_degree.get_mut(&successor) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(Reverse((self.graph[successor].rank, successor)));
                    }
                }
            }
        }

        result
    }

    /// The CPD of `name`.
    pub fn cpd(&self, name: &str) -> Result<&Cpd> {
        let idx = self.lookup(name)?;
        self.graph[idx]
            .cpd
            .as_ref()
            .ok_or_else(|| BayesNetError::MissingCpd {
                name: Variable::new(name),
            })
    }

    /// Every CPD in topological order. Fails unless the network is complete.
    pub fn ordered_cpds(&self) -> Result<Vec<&Cpd>> {
        self.check_complete()?;
        self.topological_order()
            .iter()
            .map(|name| self.cpd(name.as_str()))
            .collect()
    }

    /// All variables (placeholders included) in insertion order.
    pub fn names(&self) -> Vec<Variable> {
        self.sorted(self.graph.node_indices().collect())
    }

    /// Declared parents of `name`, in CPD order.
    pub fn parents(&self, name: &str) -> Result<Vec<Variable>> {
        let idx = self.lookup(name)?;
        Ok(self.graph[idx]
            .cpd
            .as_ref()
            .map(|c| c.parents().to_vec())
            .unwrap_or_default())
    }

    /// Children of `name`, in insertion order.
    pub fn children(&self, name: &str) -> Result<Vec<Variable>> {
        let idx = self.lookup(name)?;
        Ok(self.sorted(
            self.graph
                .neighbors_directed(idx, Direction::Outgoing)
                .collect(),
        ))
    }

    /// Parents, children and the children's other parents.
    pub fn markov_blanket(&self, name: &str) -> Result<Vec<Variable>> {
        let mut blanket = self.parents(name)?;
        for child in self.children(name)? {
            for co_parent in self.parents(child.as_str())? {
                if co_parent.as_str() != name && !blanket.contains(&co_parent) {
                    blanket.push(co_parent);
                }
            }
            if !blanket.contains(&child) {
                blanket.push(child);
            }
        }
        Ok(blanket)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of nodes, placeholders included.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Placeholder nodes still waiting for a CPD, in insertion order.
    pub fn missing_cpds(&self) -> Vec<Variable> {
        self.sorted(
            self.graph
                .node_indices()
                .filter(|&i| self.graph[i].cpd.is_none())
                .collect(),
        )
    }

    /// Every node has a CPD and every declared parent exists.
    pub fn is_complete(&self) -> bool {
        self.check_complete().is_ok()
    }

    pub(crate) fn check_complete(&self) -> Result<()> {
        if let Some(name) = self.missing_cpds().into_iter().next() {
            return Err(BayesNetError::MissingCpd { name });
        }
        for idx in self.graph.node_indices() {
            if let Some(cpd) = &self.graph[idx].cpd {
                if let Some(p) = cpd.parents().iter().find(|p| !self.contains(p.as_str())) {
                    return Err(BayesNetError::UndefinedVariable { name: p.clone() });
                }
            }
        }
        Ok(())
    }

    /// Number of categories of a discrete node.
    pub fn cardinality(&self, name: &str) -> Result<usize> {
        self.cpd(name)?
            .cardinality()
            .ok_or_else(|| BayesNetError::NotDiscrete {
                name: Variable::new(name),
            })
    }

    /// Total free parameters over all CPDs.
    pub fn n_params(&self) -> usize {
        self.graph
            .node_indices()
            .filter_map(|i| self.graph[i].cpd.as_ref())
            .map(Cpd::n_params)
            .sum()
    }

    /// `log P(assignment)` for a full assignment.
    pub fn log_density(&self, assignment: &Assignment) -> Result<f64> {
        self.ordered_cpds()?.into_iter().try_fold(0.0, |acc, cpd| {
            let value = assignment.require(cpd.target().as_str())?;
            Ok(acc + cpd.log_density(assignment, &value)?)
        })
    }

    pub fn density(&self, assignment: &Assignment) -> Result<f64> {
        Ok(self.log_density(assignment)?.exp())
    }

    /// Sum of `log_density` over the records.
    pub fn log_likelihood(&self, data: &[Assignment]) -> Result<f64> {
        data.iter()
            .try_fold(0.0, |acc, record| Ok(acc + self.log_density(record)?))
    }

    /// The node's CPD as a factor over its parents and itself.
    pub fn table(&self, name: &str) -> Result<Factor> {
        self.cpd(name)?.to_factor()
    }

    /// Observed counts of `(parents, name)` configurations in `data`.
    ///
    /// The factor has the same scope and layout as [`BayesNet::table`].
    pub fn counts(&self, name: &str, data: &[Assignment]) -> Result<Factor> {
        let cpd = self.cpd(name)?;
        let target = cpd.target().clone();
        let parents = cpd.parents().to_vec();
        let target_card = self.cardinality(name)?;
        let parent_cards = parents
            .iter()
            .map(|p| self.cardinality(p.as_str()))
            .collect::<Result<Vec<_>>>()?;

        let targets = data
            .iter()
            .map(|r| r.require(target.as_str()))
            .collect::<Result<Vec<Value>>>()?;
        let parent_values = data
            .iter()
            .map(|r| r.values_of(&parents))
            .collect::<Result<Vec<_>>>()?;
        let (cards, counts) = count_table(
            &target,
            &targets,
            &parents,
            &parent_values,
            Some(target_card),
            Some(&parent_cards),
        )?;

        let mut scope = parents;
        scope.push(target);
        let mut all_cards = cards;
        all_cards.push(target_card);
        let values = counts.into_iter().flatten().map(|c| c as f64).collect();
        Factor::new(scope, all_cards, values)
    }

    /// Fit every CPD of a network with the given structure.
    ///
    /// `edges` are `(parent, child)` pairs; every variable appearing in the
    /// first record or in an edge becomes a node. `family_for` picks the CPD
    /// family of each node.
    pub fn fit<N, F>(data: &[Assignment], edges: &[(N, N)], family_for: F) -> Result<Self>
    where
        N: Into<Variable> + Clone,
        F: Fn(&Variable) -> CpdFamily,
    {
        let first = data.first().ok_or_else(|| {
            BayesNetError::invalid("data", "cannot fit a network without records")
        })?;
        let edges: Vec<(Variable, Variable)> = edges
            .iter()
            .cloned()
            .map(|(p, c)| (p.into(), c.into()))
            .collect();

        let mut names: Vec<Variable> = first.names().cloned().collect();
        for (p, c) in &edges {
            for v in [p, c] {
                if !names.contains(v) {
                    names.push(v.clone());
                }
            }
        }

        let mut net = Self::new();
        for name in names {
            let parents: Vec<Variable> = edges
                .iter()
                .filter(|(_, c)| *c == name)
                .map(|(p, _)| p.clone())
                .collect();
            let family = family_for(&name);
            let cpd = Cpd::fit(&family, data, name, &parents, &FitOptions::default())?;
            net.add(cpd)?;
        }
        Ok(net)
    }
}

/// The classic "sprinkler" network.
///
/// ```text
///        cloudy
///       ↙     ↘
/// sprinkler   rain
///       ↘     ↙
///      wet_grass
/// ```
///
/// All variables are binary with `0 = false`, `1 = true`.
pub fn sprinkler_network() -> Result<BayesNet> {
    BayesNet::from_cpds([
        Cpd::discrete("cloudy", &[] as &[&str], vec![], vec![vec![0.5, 0.5]])?,
        Cpd::discrete(
            "sprinkler",
            &["cloudy"],
            vec![2],
            vec![
                vec![0.5, 0.5], // clear: 50% sprinkler
                vec![0.9, 0.1], // cloudy: 10% sprinkler
            ],
        )?,
        Cpd::discrete(
            "rain",
            &["cloudy"],
            vec![2],
            vec![
                vec![0.8, 0.2], // clear: 20% rain
                vec![0.2, 0.8], // cloudy: 80% rain
            ],
        )?,
        // Row-major over [sprinkler, rain]: s * 2 + r
        Cpd::discrete(
            "wet_grass",
            &["sprinkler", "rain"],
            vec![2, 2],
            vec![
                vec![1.0, 0.0],
                vec![0.2, 0.8],
                vec![0.1, 0.9],
                vec![0.01, 0.99],
            ],
        )?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Distribution;

    fn names(vars: &[Variable]) -> Vec<&str> {
        vars.iter().map(Variable::as_str).collect()
    }

    fn binary(target: &str, parents: &[&str]) -> Cpd {
        let rows = 1usize << parents.len();
        Cpd::discrete(target, parents, vec![2; parents.len()], vec![vec![0.5, 0.5]; rows]).unwrap()
    }

    #[test]
    fn test_sprinkler_structure() {
        let net = sprinkler_network().unwrap();
        assert_eq!(net.len(), 4);
        assert!(net.is_complete());
        assert_eq!(
            names(&net.topological_order()),
            ["cloudy", "sprinkler", "rain", "wet_grass"]
        );
        assert_eq!(names(&net.children("cloudy").unwrap()), ["sprinkler", "rain"]);
        assert_eq!(names(&net.parents("wet_grass").unwrap()), ["sprinkler", "rain"]);
        assert_eq!(
            names(&net.markov_blanket("sprinkler").unwrap()),
            ["cloudy", "rain", "wet_grass"]
        );
        // 1 + 2 + 2 + 4 free parameters
        assert_eq!(net.n_params(), 9);
    }

    #[test]
    fn test_joint_sums_to_one() {
        let net = sprinkler_network().unwrap();
        let mut total = 0.0;
        for idx in 0..16usize {
            let a = Assignment::new()
                .with("cloudy", (idx >> 3) & 1)
                .with("sprinkler", (idx >> 2) & 1)
                .with("rain", (idx >> 1) & 1)
                .with("wet_grass", idx & 1);
            total += net.density(&a).unwrap();
        }
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_duplicate_name() {
        let mut net = BayesNet::new();
        net.add(binary("a", &[])).unwrap();
        assert!(matches!(
            net.add(binary("a", &[])),
            Err(BayesNetError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_forward_reference_placeholder() {
        let mut net = BayesNet::new();
        net.add(binary("b", &["a"])).unwrap();
        assert_eq!(net.len(), 2);
        assert_eq!(names(&net.missing_cpds()), ["a"]);
        assert!(matches!(net.cpd("a"), Err(BayesNetError::MissingCpd { .. })));
        assert!(matches!(
            net.log_density(&Assignment::new()),
            Err(BayesNetError::MissingCpd { .. })
        ));

        net.add(binary("a", &[])).unwrap();
        assert!(net.is_complete());
        assert_eq!(names(&net.topological_order()), ["a", "b"]);
    }

    #[test]
    fn test_cycle_rejected_and_network_unchanged() {
        let mut net = BayesNet::new();
        net.add(binary("b", &["a"])).unwrap();
        net.add(binary("c", &["b"])).unwrap();
        let before = net.topological_order();

        let result = net.add(binary("a", &["c"]));
        assert!(matches!(result, Err(BayesNetError::Cycle { .. })));
        assert_eq!(net.len(), 3);
        assert_eq!(net.topological_order(), before);
        assert_eq!(names(&net.missing_cpds()), ["a"]);

        // The placeholder can still be filled without the offending edge.
        net.add(binary("a", &[])).unwrap();
        assert_eq!(names(&net.topological_order()), ["a", "b", "c"]);
    }

    #[test]
    fn test_remove_reports_dependents() {
        let mut net = sprinkler_network().unwrap();
        let removal = net.remove("rain").unwrap();
        assert_eq!(removal.cpd.unwrap().target().as_str(), "rain");
        assert_eq!(names(&removal.dependents), ["wet_grass"]);
        assert_eq!(net.len(), 3);
        assert!(!net.is_complete());
        assert_eq!(names(&net.children("cloudy").unwrap()), ["sprinkler"]);

        assert!(matches!(
            net.remove("rain"),
            Err(BayesNetError::UndefinedVariable { .. })
        ));
    }

    #[test]
    fn test_readd_reconnects_dependents() {
        let mut net = sprinkler_network().unwrap();
        let removal = net.remove("rain").unwrap();
        net.add(removal.cpd.unwrap()).unwrap();
        assert!(net.is_complete());
        assert_eq!(names(&net.children("rain").unwrap()), ["wet_grass"]);
        assert_eq!(names(&net.topological_order())[3], "wet_grass");
    }

    #[test]
    fn test_readd_cannot_close_cycle_through_dependents() {
        let mut net = BayesNet::new();
        net.add(binary("a", &[])).unwrap();
        net.add(binary("b", &["a"])).unwrap();
        net.remove("a").unwrap();
        // b still lists a as parent; a | b would be a two-cycle.
        assert!(matches!(
            net.add(binary("a", &["b"])),
            Err(BayesNetError::Cycle { .. })
        ));
    }

    #[test]
    fn test_counts_and_table() {
        let net = sprinkler_network().unwrap();
        let data = vec![
            Assignment::new().with("cloudy", 1usize).with("rain", 1usize),
            Assignment::new().with("cloudy", 1usize).with("rain", 1usize),
            Assignment::new().with("cloudy", 0usize).with("rain", 0usize),
        ];
        let counts = net.counts("rain", &data).unwrap();
        assert_eq!(names(counts.scope()), ["cloudy", "rain"]);
        assert_eq!(counts.values(), &[1.0, 0.0, 0.0, 2.0]);

        let table = net.table("rain").unwrap();
        assert_eq!(table.values(), &[0.8, 0.2, 0.2, 0.8]);
    }

    #[test]
    fn test_fit_network_from_structure() {
        let data: Vec<Assignment> = (0..40usize)
            .map(|i| {
                let a = i % 2;
                let b = if i % 4 == 0 { 1 - a } else { a };
                Assignment::new().with("a", a).with("b", b)
            })
            .collect();
        let net = BayesNet::fit(&data, &[("a", "b")], |_| CpdFamily::Categorical).unwrap();
        assert_eq!(names(&net.topological_order()), ["a", "b"]);

        let pa = net.cpd("a").unwrap().distribution_given(&Assignment::new()).unwrap();
        assert_eq!(pa, Distribution::Categorical { probs: vec![0.5, 0.5] });

        let given = Assignment::new().with("a", 0usize);
        let pb = net.cpd("b").unwrap().distribution_given(&given).unwrap();
        // a = 0 rows: i = 0, 2, 4, ...; b flips when i % 4 == 0
        assert_eq!(pb, Distribution::Categorical { probs: vec![0.5, 0.5] });
        assert!(net.log_likelihood(&data).unwrap() < 0.0);
    }

    #[test]
    fn test_mixed_network_log_density() {
        let mut net = BayesNet::new();
        net.add(Cpd::new_static("x", Distribution::normal(0.0, 1.0).unwrap()).unwrap())
            .unwrap();
        net.add(Cpd::linear_gaussian("y", &["x"], vec![2.0], 1.0, 0.5).unwrap())
            .unwrap();
        let a = Assignment::new().with("x", 0.0).with("y", 1.0);
        let expected = Distribution::normal(0.0, 1.0)
            .unwrap()
            .log_density(&Variable::new("x"), &Value::Continuous(0.0))
            .unwrap()
            + Distribution::normal(1.0, 0.5)
                .unwrap()
                .log_density(&Variable::new("y"), &Value::Continuous(1.0))
                .unwrap();
        assert!((net.log_density(&a).unwrap() - expected).abs() < 1e-12);
        assert!(matches!(net.cardinality("x"), Err(BayesNetError::NotDiscrete { .. })));
    }
}
