//! Conditional probability distributions.
//!
//! A [`Cpd`] is one node's local model `P(target | parents)`. Conditioning is
//! always explicit: every operation takes the assignment to condition on and
//! reads only the declared parents from it, so a CPD carries no hidden state
//! and can be shared freely across samplers.

mod categorical;
mod fit;
mod gaussian;

use std::fmt;
use std::sync::Arc;

use rand::Rng;

pub use categorical::CategoricalCpd;
pub use fit::{CpdFamily, FitOptions};
pub(crate) use fit::count_table;
pub use gaussian::{ConditionalLinearGaussian, LinearGaussian};

use crate::assignment::{Assignment, Value, Variable};
use crate::distribution::Distribution;
use crate::error::{BayesNetError, Result};
use crate::factor::Factor;

/// User-supplied mapping from parent values (in declared order) to a distribution.
pub type ParentFn = Arc<dyn Fn(&[Value]) -> Result<Distribution> + Send + Sync>;

/// The variants a CPD can take.
#[derive(Clone)]
pub enum CpdKind {
    /// No parents; a fixed distribution.
    Static(Distribution),
    /// Arbitrary mapping from parent values to a distribution.
    Functional(ParentFn),
    /// One discrete distribution per parent configuration.
    Categorical(CategoricalCpd),
    LinearGaussian(LinearGaussian),
    /// Discrete parents select a linear-Gaussian over the continuous ones.
    ConditionalLinearGaussian(ConditionalLinearGaussian),
}

impl CpdKind {
    pub fn name(&self) -> &'static str {
        match self {
            CpdKind::Static(_) => "static",
            CpdKind::Functional(_) => "functional",
            CpdKind::Categorical(_) => "categorical",
            CpdKind::LinearGaussian(_) => "linear-Gaussian",
            CpdKind::ConditionalLinearGaussian(_) => "conditional linear-Gaussian",
        }
    }
}

impl fmt::Debug for CpdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpdKind::Static(d) => f.debug_tuple("Static").field(d).finish(),
            CpdKind::Functional(_) => f.write_str("Functional(<fn>)"),
            CpdKind::Categorical(t) => f.debug_tuple("Categorical").field(t).finish(),
            CpdKind::LinearGaussian(lg) => f.debug_tuple("LinearGaussian").field(lg).finish(),
            CpdKind::ConditionalLinearGaussian(clg) => {
                f.debug_tuple("ConditionalLinearGaussian").field(clg).finish()
            }
        }
    }
}

/// A conditional probability distribution `P(target | parents)`.
///
/// The parent order is fixed at construction and used for all indexing.
/// The target never appears among its own parents.
///
/// # Example
///
/// ```rust
/// use bayesnets::{Assignment, Cpd, Distribution};
///
/// // b | a ~ N(2a + 3, 1)
/// let cpd = Cpd::linear_gaussian("b", &["a"], vec![2.0], 3.0, 1.0).unwrap();
/// let given = Assignment::new().with("a", 0.5);
/// assert_eq!(cpd.distribution_given(&given).unwrap(), Distribution::normal(4.0, 1.0).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct Cpd {
    target: Variable,
    parents: Vec<Variable>,
    kind: CpdKind,
}

fn names<N: Into<Variable> + Clone>(names: &[N]) -> Vec<Variable> {
    names.iter().cloned().map(Into::into).collect()
}

impl Cpd {
    /// Assemble a CPD from its parts, checking the parent list against the variant.
    pub fn from_kind(target: impl Into<Variable>, parents: Vec<Variable>, kind: CpdKind) -> Result<Self> {
        let target = target.into();
        if parents.contains(&target) {
            return Err(BayesNetError::invalid(
                "parents",
                format!("{} cannot be its own parent", target),
            ));
        }
        for (i, p) in parents.iter().enumerate() {
            if parents[..i].contains(p) {
                return Err(BayesNetError::invalid(
                    "parents",
                    format!("parent {} listed twice for {}", p, target),
                ));
            }
        }

        let expected = match &kind {
            CpdKind::Static(d) => {
                d.validate()?;
                Some(0)
            }
            CpdKind::Functional(_) => None,
            CpdKind::Categorical(t) => Some(t.parent_cardinalities().len()),
            CpdKind::LinearGaussian(lg) => Some(lg.weights.len()),
            CpdKind::ConditionalLinearGaussian(clg) => Some(clg.n_discrete() + clg.n_continuous()),
        };
        if let Some(expected) = expected {
            if expected != parents.len() {
                return Err(BayesNetError::ShapeMismatch {
                    expected,
                    got: parents.len(),
                });
            }
        }

        Ok(Self {
            target,
            parents,
            kind,
        })
    }

    /// A parentless CPD with a fixed distribution.
    pub fn new_static(target: impl Into<Variable>, distribution: Distribution) -> Result<Self> {
        Self::from_kind(target, Vec::new(), CpdKind::Static(distribution))
    }

    /// A CPD defined by an arbitrary function of its parents' values.
    pub fn functional<N, F>(target: impl Into<Variable>, parents: &[N], f: F) -> Result<Self>
    where
        N: Into<Variable> + Clone,
        F: Fn(&[Value]) -> Result<Distribution> + Send + Sync + 'static,
    {
        Self::from_kind(target, names(parents), CpdKind::Functional(Arc::new(f)))
    }

    /// A categorical CPD with one distribution per parent configuration.
    pub fn categorical<N: Into<Variable> + Clone>(
        target: impl Into<Variable>,
        parents: &[N],
        parent_cards: Vec<usize>,
        distributions: Vec<Distribution>,
    ) -> Result<Self> {
        let table = CategoricalCpd::new(parent_cards, distributions)?;
        Self::from_kind(target, names(parents), CpdKind::Categorical(table))
    }

    /// A categorical CPD from probability rows, one row per parent configuration.
    ///
    /// ```rust
    /// use bayesnets::Cpd;
    ///
    /// let b = Cpd::discrete("b", &["a"], vec![2], vec![vec![0.1, 0.9], vec![0.8, 0.2]]).unwrap();
    /// assert_eq!(b.cardinality(), Some(2));
    /// ```
    pub fn discrete<N: Into<Variable> + Clone>(
        target: impl Into<Variable>,
        parents: &[N],
        parent_cards: Vec<usize>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let table = CategoricalCpd::from_rows(parent_cards, rows)?;
        Self::from_kind(target, names(parents), CpdKind::Categorical(table))
    }

    /// A linear-Gaussian CPD `target ~ N(weights · parents + bias, std²)`.
    pub fn linear_gaussian<N: Into<Variable> + Clone>(
        target: impl Into<Variable>,
        parents: &[N],
        weights: Vec<f64>,
        bias: f64,
        std: f64,
    ) -> Result<Self> {
        let lg = LinearGaussian::new(weights, bias, std)?;
        Self::from_kind(target, names(parents), CpdKind::LinearGaussian(lg))
    }

    /// A conditional linear-Gaussian CPD. Its parent list is the discrete
    /// parents followed by the continuous ones.
    pub fn conditional_linear_gaussian<N: Into<Variable> + Clone>(
        target: impl Into<Variable>,
        discrete_parents: &[N],
        continuous_parents: &[N],
        clg: ConditionalLinearGaussian,
    ) -> Result<Self> {
        if clg.n_discrete() != discrete_parents.len() {
            return Err(BayesNetError::ShapeMismatch {
                expected: clg.n_discrete(),
                got: discrete_parents.len(),
            });
        }
        let mut parents = names(discrete_parents);
        parents.extend(names(continuous_parents));
        Self::from_kind(target, parents, CpdKind::ConditionalLinearGaussian(clg))
    }

    /// Estimate a CPD of the given family from records.
    ///
    /// Does not touch any network; returns a new CPD.
    pub fn fit<N: Into<Variable> + Clone>(
        family: &CpdFamily,
        data: &[Assignment],
        target: impl Into<Variable>,
        parents: &[N],
        options: &FitOptions,
    ) -> Result<Self> {
        fit::fit_cpd(family, data, target.into(), names(parents), options)
    }

    pub fn target(&self) -> &Variable {
        &self.target
    }

    pub fn parents(&self) -> &[Variable] {
        &self.parents
    }

    pub fn kind(&self) -> &CpdKind {
        &self.kind
    }

    /// The distribution of the target given the parent values in `given`.
    ///
    /// Only the declared parents are read; any other entries are ignored.
    pub fn distribution_given(&self, given: &Assignment) -> Result<Distribution> {
        let values = given.values_of(&self.parents)?;
        self.distribution_for(&values)
    }

    /// The distribution of the target given parent values in declared order.
    pub fn distribution_for(&self, values: &[Value]) -> Result<Distribution> {
        match &self.kind {
            CpdKind::Static(d) => Ok(d.clone()),
            CpdKind::Functional(f) => {
                let d = f(values)?;
                d.validate()?;
                Ok(d)
            }
            CpdKind::Categorical(t) => t.row(&self.parents, values).cloned(),
            CpdKind::LinearGaussian(lg) => lg.distribution(values),
            CpdKind::ConditionalLinearGaussian(clg) => clg.distribution(&self.parents, values),
        }
    }

    /// Draw a target value conditioned on `given`.
    pub fn sample<R: Rng + ?Sized>(&self, given: &Assignment, rng: &mut R) -> Result<Value> {
        self.distribution_given(given)?.sample(rng)
    }

    /// `log P(target = value | parents)` with parents read from `given`.
    pub fn log_density(&self, given: &Assignment, value: &Value) -> Result<f64> {
        self.distribution_given(given)?
            .log_density(&self.target, value)
    }

    pub fn density(&self, given: &Assignment, value: &Value) -> Result<f64> {
        Ok(self.log_density(given, value)?.exp())
    }

    /// Log-likelihood of the target column of `data` (each record also
    /// supplies the parent values).
    pub fn log_likelihood(&self, data: &[Assignment]) -> Result<f64> {
        data.iter().try_fold(0.0, |acc, record| {
            let value = record.require(self.target.as_str())?;
            Ok(acc + self.log_density(record, &value)?)
        })
    }

    /// Number of free parameters. Functional CPDs report zero.
    pub fn n_params(&self) -> usize {
        match &self.kind {
            CpdKind::Static(d) => d.n_params(),
            CpdKind::Functional(_) => 0,
            CpdKind::Categorical(t) => t.n_params(),
            CpdKind::LinearGaussian(lg) => lg.n_params(),
            CpdKind::ConditionalLinearGaussian(clg) => clg.n_params(),
        }
    }

    /// Number of target categories for tabular discrete CPDs.
    pub fn cardinality(&self) -> Option<usize> {
        match &self.kind {
            CpdKind::Static(d) => d.cardinality(),
            CpdKind::Categorical(t) => Some(t.target_cardinality()),
            _ => None,
        }
    }

    /// Whether this CPD can be turned into a factor.
    pub fn is_discrete(&self) -> bool {
        self.cardinality().is_some()
    }

    /// Whether the target always takes continuous values. Functional CPDs
    /// are never reported as continuous.
    pub fn is_continuous(&self) -> bool {
        match &self.kind {
            CpdKind::Static(d) => !d.is_discrete(),
            CpdKind::LinearGaussian(_) | CpdKind::ConditionalLinearGaussian(_) => true,
            CpdKind::Functional(_) | CpdKind::Categorical(_) => false,
        }
    }

    /// The CPD as a factor over `parents ∪ {target}`.
    ///
    /// Scope order is the parents in declared order followed by the target.
    pub fn to_factor(&self) -> Result<Factor> {
        let not_discrete = || BayesNetError::NotDiscrete {
            name: self.target.clone(),
        };
        match &self.kind {
            CpdKind::Static(d) => {
                let probs = d.probs().ok_or_else(not_discrete)?;
                Factor::new(vec![self.target.clone()], vec![probs.len()], probs)
            }
            CpdKind::Categorical(t) => {
                let mut scope = self.parents.clone();
                scope.push(self.target.clone());
                let mut cards = t.parent_cardinalities().to_vec();
                cards.push(t.target_cardinality());
                Factor::new(scope, cards, t.table())
            }
            _ => Err(not_discrete()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_target_not_parent() {
        let result = Cpd::linear_gaussian("a", &["a"], vec![1.0], 0.0, 1.0);
        assert!(matches!(result, Err(BayesNetError::InvalidParameter { .. })));
    }

    #[test]
    fn test_negative_table_entry() {
        let result = Cpd::discrete("b", &["a"], vec![2], vec![vec![-1e-9, 1.0 + 1e-9], vec![0.5, 0.5]]);
        assert!(matches!(result, Err(BayesNetError::NegativeWeight)));
    }

    #[test]
    fn test_value_kinds() {
        let cat = Cpd::discrete("b", &["a"], vec![2], vec![vec![0.1, 0.9], vec![0.8, 0.2]]).unwrap();
        let lg = Cpd::linear_gaussian("y", &["x"], vec![1.0], 0.0, 1.0).unwrap();
        let poisson = Cpd::new_static("n", Distribution::poisson(2.0).unwrap()).unwrap();
        assert!(!cat.is_continuous());
        assert!(lg.is_continuous());
        assert!(!poisson.is_continuous());
    }

    #[test]
    fn test_parent_count_must_match() {
        let result = Cpd::linear_gaussian("b", &["a", "c"], vec![1.0], 0.0, 1.0);
        assert!(matches!(
            result,
            Err(BayesNetError::ShapeMismatch {
                expected: 1,
                got: 2
            })
        ));
    }

    #[test]
    fn test_distribution_given_reads_only_parents() {
        let cpd = Cpd::discrete("b", &["a"], vec![2], vec![vec![0.1, 0.9], vec![0.8, 0.2]]).unwrap();
        let given = Assignment::from_pairs([("a", Value::Discrete(1)), ("zzz", Value::Continuous(7.0))]);
        assert_eq!(
            cpd.distribution_given(&given).unwrap(),
            Distribution::Categorical { probs: vec![0.8, 0.2] }
        );
        assert!(matches!(
            cpd.distribution_given(&Assignment::new()),
            Err(BayesNetError::UndefinedVariable { .. })
        ));
    }

    #[test]
    fn test_log_density_domain_error() {
        let cpd = Cpd::discrete("b", &["a"], vec![2], vec![vec![0.1, 0.9], vec![0.8, 0.2]]).unwrap();
        let given = Assignment::new().with("a", 0usize);
        let lp = cpd.log_density(&given, &Value::Discrete(1)).unwrap();
        assert!((lp - 0.9f64.ln()).abs() < 1e-12);
        assert!(matches!(
            cpd.log_density(&given, &Value::Discrete(5)),
            Err(BayesNetError::Domain { .. })
        ));
    }

    #[test]
    fn test_functional_cpd() {
        let happy = Cpd::functional("happy", &["sighted"], |values: &[Value]| {
            let p = if values[0] == Value::Discrete(2) { 0.95 } else { 0.2 };
            Distribution::bernoulli(p)
        })
        .unwrap();
        let given = Assignment::new().with("sighted", 2usize);
        assert_eq!(happy.distribution_given(&given).unwrap(), Distribution::Bernoulli { p: 0.95 });
        assert!(happy.to_factor().is_err());
        assert_eq!(happy.n_params(), 0);
    }

    #[test]
    fn test_sample_is_reproducible() {
        let cpd = Cpd::linear_gaussian("b", &["a"], vec![2.0], 3.0, 1.0).unwrap();
        let given = Assignment::new().with("a", 1.0);
        let mut r1 = StdRng::seed_from_u64(3);
        let mut r2 = StdRng::seed_from_u64(3);
        assert_eq!(cpd.sample(&given, &mut r1).unwrap(), cpd.sample(&given, &mut r2).unwrap());
    }

    #[test]
    fn test_to_factor_layout() {
        let cpd = Cpd::discrete("b", &["a"], vec![2], vec![vec![0.1, 0.9], vec![0.8, 0.2]]).unwrap();
        let f = cpd.to_factor().unwrap();
        assert_eq!(f.scope(), &[Variable::new("a"), Variable::new("b")]);
        assert_eq!(f.values(), &[0.1, 0.9, 0.8, 0.2]);

        let prior = Cpd::new_static("a", Distribution::categorical(vec![0.3, 0.7]).unwrap()).unwrap();
        assert_eq!(prior.to_factor().unwrap().values(), &[0.3, 0.7]);

        let gauss = Cpd::new_static("x", Distribution::normal(0.0, 1.0).unwrap()).unwrap();
        assert!(matches!(gauss.to_factor(), Err(BayesNetError::NotDiscrete { .. })));
    }

    #[test]
    fn test_log_likelihood() {
        let cpd = Cpd::new_static("a", Distribution::categorical(vec![0.25, 0.75]).unwrap()).unwrap();
        let data = vec![
            Assignment::new().with("a", 0usize),
            Assignment::new().with("a", 1usize),
        ];
        let ll = cpd.log_likelihood(&data).unwrap();
        assert!((ll - (0.25f64.ln() + 0.75f64.ln())).abs() < 1e-12);
    }
}
