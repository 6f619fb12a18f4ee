//! Discrete factors: unnormalized tables over finite variables.
//!
//! A factor assigns a non-negative weight to every joint configuration of
//! its scope. Tables are stored row-major with the last scope variable
//! varying fastest, the same mixed-radix layout used by categorical CPDs:
//!
//! ```text
//! scope = [a, b], cards = [2, 3]
//! index(a, b) = a * 3 + b
//! ```
//!
//! Every operation is pure and returns a new factor.

use serde::{Deserialize, Serialize};

use crate::assignment::{Assignment, Value, Variable};
use crate::error::{BayesNetError, Result};

/// An unnormalized function over a set of discrete variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    scope: Vec<Variable>,
    cards: Vec<usize>,
    values: Vec<f64>,
}

impl Factor {
    /// Create a factor, checking the table size and entries.
    ///
    /// ```rust
    /// use bayesnets::Factor;
    ///
    /// let f = Factor::new(vec!["a".into()], vec![2], vec![0.3, 0.7]).unwrap();
    /// assert!((f.sum() - 1.0).abs() < 1e-12);
    /// ```
    pub fn new(scope: Vec<Variable>, cards: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        if scope.len() != cards.len() {
            return Err(BayesNetError::ShapeMismatch {
                expected: scope.len(),
                got: cards.len(),
            });
        }
        for (i, v) in scope.iter().enumerate() {
            if scope[..i].contains(v) {
                return Err(BayesNetError::invalid(
                    "scope",
                    format!("{} appears more than once", v),
                ));
            }
        }
        if let Some(pos) = cards.iter().position(|&c| c == 0) {
            return Err(BayesNetError::invalid(
                "cards",
                format!("{} has no categories", scope[pos]),
            ));
        }
        let size: usize = cards.iter().product();
        if values.len() != size {
            return Err(BayesNetError::ShapeMismatch {
                expected: size,
                got: values.len(),
            });
        }
        if values.iter().any(|v| !(v.is_finite() && *v >= 0.0)) {
            return Err(BayesNetError::NegativeWeight);
        }
        Ok(Self {
            scope,
            cards,
            values,
        })
    }

    /// A factor with empty scope holding a single weight.
    pub fn scalar(value: f64) -> Result<Self> {
        Self::new(Vec::new(), Vec::new(), vec![value])
    }

    pub fn scope(&self) -> &[Variable] {
        &self.scope
    }

    pub fn cardinalities(&self) -> &[usize] {
        &self.cards
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Position of `name` in the scope.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.scope.iter().position(|v| v.as_str() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Cardinality of `name`, if it is in scope.
    pub fn cardinality(&self, name: &str) -> Option<usize> {
        self.position(name).map(|i| self.cards[i])
    }

    fn strides(cards: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; cards.len()];
        for i in (0..cards.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * cards[i + 1];
        }
        strides
    }

    /// Decode a flat index into per-variable values.
    fn config(cards: &[usize], mut idx: usize) -> Vec<usize> {
        let mut config = vec![0; cards.len()];
        for i in (0..cards.len()).rev() {
            config[i] = idx % cards[i];
            idx /= cards[i];
        }
        config
    }

    /// The weight of the configuration in `assignment` (extra entries are ignored).
    pub fn value(&self, assignment: &Assignment) -> Result<f64> {
        let strides = Self::strides(&self.cards);
        let mut idx = 0;
        for ((name, &card), stride) in self.scope.iter().zip(&self.cards).zip(&strides) {
            let k = assignment.discrete(name.as_str())?;
            if k >= card {
                return Err(BayesNetError::Domain {
                    variable: name.clone(),
                    value: k.to_string(),
                    reason: format!("factor axis has {} categories", card),
                });
            }
            idx += k * stride;
        }
        Ok(self.values[idx])
    }

    /// Total weight.
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Pointwise product over the union of both scopes.
    ///
    /// The result scope is this factor's scope followed by the variables
    /// only `other` contains.
    pub fn product(&self, other: &Factor) -> Result<Factor> {
        let mut scope = self.scope.clone();
        let mut cards = self.cards.clone();
        for (v, &c) in other.scope.iter().zip(&other.cards) {
            match self.position(v.as_str()) {
                Some(i) if self.cards[i] != c => {
                    return Err(BayesNetError::CardinalityMismatch {
                        variable: v.clone(),
                        expected: self.cards[i],
                        got: c,
                    })
                }
                Some(_) => {}
                None => {
                    scope.push(v.clone());
                    cards.push(c);
                }
            }
        }

        // Stride of each output axis inside each input (zero when absent).
        let project = |f: &Factor| -> Vec<usize> {
            let strides = Self::strides(&f.cards);
            scope
                .iter()
                .map(|v| f.position(v.as_str()).map_or(0, |i| strides[i]))
                .collect()
        };
        let sa = project(self);
        let sb = project(other);

        let size: usize = cards.iter().product();
        let mut values = Vec::with_capacity(size);
        let mut config = vec![0usize; cards.len()];
        let (mut ia, mut ib) = (0usize, 0usize);
        for _ in 0..size {
            values.push(self.values[ia] * other.values[ib]);
            // Odometer increment, last axis fastest.
            for axis in (0..cards.len()).rev() {
                config[axis] += 1;
                ia += sa[axis];
                ib += sb[axis];
                if config[axis] < cards[axis] {
                    break;
                }
                ia -= sa[axis] * cards[axis];
                ib -= sb[axis] * cards[axis];
                config[axis] = 0;
            }
        }

        Ok(Factor {
            scope,
            cards,
            values,
        })
    }

    /// Sum out `name`, removing it from the scope.
    pub fn marginalize(&self, name: &str) -> Result<Factor> {
        let pos = self
            .position(name)
            .ok_or_else(|| BayesNetError::UndefinedVariable {
                name: Variable::new(name),
            })?;

        let mut scope = self.scope.clone();
        let mut cards = self.cards.clone();
        scope.remove(pos);
        cards.remove(pos);

        let out_strides = Self::strides(&cards);
        let size: usize = cards.iter().product();
        let mut values = vec![0.0; size];
        for (idx, &w) in self.values.iter().enumerate() {
            let config = Self::config(&self.cards, idx);
            let out: usize = config
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != pos)
                .zip(&out_strides)
                .map(|((_, k), s)| k * s)
                .sum();
            values[out] += w;
        }

        Ok(Factor {
            scope,
            cards,
            values,
        })
    }

    /// Sum out every variable in `names`.
    pub fn marginalize_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Factor> {
        names
            .iter()
            .try_fold(self.clone(), |f, name| f.marginalize(name.as_ref()))
    }

    /// Fix `name` to `value` and drop it from the scope.
    pub fn restrict(&self, name: &str, value: usize) -> Result<Factor> {
        let pos = self
            .position(name)
            .ok_or_else(|| BayesNetError::UndefinedVariable {
                name: Variable::new(name),
            })?;
        if value >= self.cards[pos] {
            return Err(BayesNetError::Domain {
                variable: self.scope[pos].clone(),
                value: value.to_string(),
                reason: format!("factor axis has {} categories", self.cards[pos]),
            });
        }

        let mut scope = self.scope.clone();
        let mut cards = self.cards.clone();
        scope.remove(pos);
        cards.remove(pos);

        let values = self
            .values
            .iter()
            .enumerate()
            .filter(|&(idx, _)| Self::config(&self.cards, idx)[pos] == value)
            .map(|(_, &w)| w)
            .collect();

        Ok(Factor {
            scope,
            cards,
            values,
        })
    }

    /// Restrict by every entry of `evidence` that is in scope.
    pub fn reduce(&self, evidence: &Assignment) -> Result<Factor> {
        let mut f = self.clone();
        for (name, value) in evidence {
            if f.contains(name.as_str()) {
                let k = evidence.discrete(name.as_str())?;
                f = f.restrict(name.as_str(), k).map_err(|e| match e {
                    BayesNetError::Domain { reason, .. } => BayesNetError::Domain {
                        variable: name.clone(),
                        value: value.to_string(),
                        reason,
                    },
                    other => other,
                })?;
            }
        }
        Ok(f)
    }

    /// Divide by the total weight so the table sums to one.
    ///
    /// A zero-sum factor fails with [`BayesNetError::DegenerateFactor`].
    pub fn normalize(&self) -> Result<Factor> {
        let total = self.sum();
        if !(total > 0.0) {
            return Err(BayesNetError::DegenerateFactor {
                evidence: Assignment::new(),
            });
        }
        Ok(Factor {
            scope: self.scope.clone(),
            cards: self.cards.clone(),
            values: self.values.iter().map(|w| w / total).collect(),
        })
    }

    /// Reorder the axes to follow `order`, which must name the same variables.
    pub fn permute(&self, order: &[Variable]) -> Result<Factor> {
        if order.len() != self.scope.len() {
            return Err(BayesNetError::ShapeMismatch {
                expected: self.scope.len(),
                got: order.len(),
            });
        }
        let mapping = order
            .iter()
            .map(|v| {
                self.position(v.as_str())
                    .ok_or_else(|| BayesNetError::UndefinedVariable { name: v.clone() })
            })
            .collect::<Result<Vec<_>>>()?;

        let cards: Vec<usize> = mapping.iter().map(|&i| self.cards[i]).collect();
        let src_strides = Self::strides(&self.cards);
        let size = self.values.len();
        let mut values = Vec::with_capacity(size);
        for idx in 0..size {
            let config = Self::config(&cards, idx);
            let src: usize = config
                .iter()
                .zip(&mapping)
                .map(|(k, &i)| k * src_strides[i])
                .sum();
            values.push(self.values[src]);
        }

        Factor::new(order.to_vec(), cards, values)
    }

    /// Equality up to scope order, with absolute tolerance `tol`.
    pub fn approx_eq(&self, other: &Factor, tol: f64) -> bool {
        let aligned = match other.permute(&self.scope) {
            Ok(f) => f,
            Err(_) => return false,
        };
        aligned.cards == self.cards
            && aligned
                .values
                .iter()
                .zip(&self.values)
                .all(|(a, b)| (a - b).abs() <= tol)
    }

    /// Every configuration with its weight, in table order.
    pub fn rows(&self) -> Vec<(Assignment, f64)> {
        self.values
            .iter()
            .enumerate()
            .map(|(idx, &w)| {
                let config = Self::config(&self.cards, idx);
                let assignment = self
                    .scope
                    .iter()
                    .cloned()
                    .zip(config.into_iter().map(Value::Discrete))
                    .collect();
                (assignment, w)
            })
            .collect()
    }

    /// The table of a single-variable factor.
    pub fn to_probs(&self) -> Result<Vec<f64>> {
        if self.scope.len() != 1 {
            return Err(BayesNetError::ShapeMismatch {
                expected: 1,
                got: self.scope.len(),
            });
        }
        Ok(self.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Variable {
        Variable::new(name)
    }

    fn ab() -> Factor {
        // scope [a, b], a outer
        Factor::new(vec![var("a"), var("b")], vec![2, 2], vec![0.1, 0.9, 0.8, 0.2]).unwrap()
    }

    #[test]
    fn test_new_validates() {
        assert!(matches!(
            Factor::new(vec![var("a")], vec![2], vec![1.0]),
            Err(BayesNetError::ShapeMismatch { expected: 2, got: 1 })
        ));
        assert!(matches!(
            Factor::new(vec![var("a")], vec![2], vec![1.0, -0.5]),
            Err(BayesNetError::NegativeWeight)
        ));
        assert!(Factor::new(vec![var("a"), var("a")], vec![2, 2], vec![1.0; 4]).is_err());
    }

    #[test]
    fn test_value_layout() {
        let f = ab();
        let at = |a: usize, b: usize| f.value(&Assignment::new().with("a", a).with("b", b)).unwrap();
        assert_eq!(at(0, 0), 0.1);
        assert_eq!(at(0, 1), 0.9);
        assert_eq!(at(1, 0), 0.8);
        assert_eq!(at(1, 1), 0.2);
    }

    #[test]
    fn test_product_broadcasts() {
        let pa = Factor::new(vec![var("a")], vec![2], vec![0.3, 0.7]).unwrap();
        let joint = pa.product(&ab()).unwrap();
        assert_eq!(joint.scope(), &[var("a"), var("b")]);
        let expected = [0.03, 0.27, 0.56, 0.14];
        for (got, want) in joint.values().iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn test_product_cardinality_mismatch() {
        let f = Factor::new(vec![var("a")], vec![3], vec![1.0; 3]).unwrap();
        assert!(matches!(
            f.product(&ab()),
            Err(BayesNetError::CardinalityMismatch { .. })
        ));
    }

    #[test]
    fn test_marginalize() {
        let pa = Factor::new(vec![var("a")], vec![2], vec![0.3, 0.7]).unwrap();
        let pb = pa.product(&ab()).unwrap().marginalize("a").unwrap();
        let probs = pb.to_probs().unwrap();
        assert!((probs[0] - 0.59).abs() < 1e-12);
        assert!((probs[1] - 0.41).abs() < 1e-12);

        assert!(matches!(
            pb.marginalize("a"),
            Err(BayesNetError::UndefinedVariable { .. })
        ));
    }

    #[test]
    fn test_marginalize_inner_axis() {
        let f = Factor::new(
            vec![var("a"), var("b"), var("c")],
            vec![2, 3, 2],
            (0..12).map(f64::from).collect(),
        )
        .unwrap();
        let g = f.marginalize("b").unwrap();
        assert_eq!(g.scope(), &[var("a"), var("c")]);
        // a=0,c=0: 0+2+4, a=0,c=1: 1+3+5, a=1,c=0: 6+8+10, a=1,c=1: 7+9+11
        assert_eq!(g.values(), &[6.0, 9.0, 24.0, 27.0]);
        assert_eq!(f.marginalize_all(&["a", "b", "c"]).unwrap().values(), &[66.0]);
    }

    #[test]
    fn test_restrict() {
        let f = ab().restrict("a", 1).unwrap();
        assert_eq!(f.scope(), &[var("b")]);
        assert_eq!(f.values(), &[0.8, 0.2]);

        let g = ab().restrict("b", 0).unwrap();
        assert_eq!(g.values(), &[0.1, 0.8]);

        assert!(matches!(ab().restrict("a", 2), Err(BayesNetError::Domain { .. })));
        assert!(matches!(
            ab().restrict("z", 0),
            Err(BayesNetError::UndefinedVariable { .. })
        ));
    }

    #[test]
    fn test_reduce_skips_out_of_scope() {
        let evidence = Assignment::new().with("a", 0usize).with("z", 4usize);
        let f = ab().reduce(&evidence).unwrap();
        assert_eq!(f.values(), &[0.1, 0.9]);
    }

    #[test]
    fn test_normalize_degenerate() {
        let f = Factor::new(vec![var("a")], vec![2], vec![0.0, 0.0]).unwrap();
        assert!(matches!(
            f.normalize(),
            Err(BayesNetError::DegenerateFactor { .. })
        ));
        let g = Factor::new(vec![var("a")], vec![2], vec![1.0, 3.0]).unwrap();
        assert_eq!(g.normalize().unwrap().values(), &[0.25, 0.75]);
    }

    #[test]
    fn test_permute() {
        let f = ab().permute(&[var("b"), var("a")]).unwrap();
        assert_eq!(f.values(), &[0.1, 0.8, 0.9, 0.2]);
        assert!(f.approx_eq(&ab(), 1e-12));
        assert!(ab().permute(&[var("a"), var("z")]).is_err());
    }

    #[test]
    fn test_rows() {
        let rows = ab().rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2].0, Assignment::new().with("a", 1usize).with("b", 0usize));
        assert_eq!(rows[2].1, 0.8);
    }

    #[test]
    fn test_scalar_product() {
        let s = Factor::scalar(2.0).unwrap();
        let f = s.product(&ab()).unwrap();
        assert!((f.sum() - 4.0).abs() < 1e-12);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    const NAMES: [&str; 4] = ["a", "b", "c", "d"];
    const CARDS: [usize; 4] = [2, 3, 2, 3];

    /// A factor over a random subset of a fixed variable pool, so any two
    /// generated factors agree on shared cardinalities.
    fn factor() -> impl Strategy<Value = Factor> {
        proptest::collection::vec(any::<bool>(), 4)
            .prop_flat_map(|mask| {
                let scope: Vec<usize> = (0..4).filter(|&i| mask[i]).collect();
                let size: usize = scope.iter().map(|&i| CARDS[i]).product();
                (Just(scope), proptest::collection::vec(0.0f64..10.0, size))
            })
            .prop_map(|(idx, values)| {
                let scope = idx.iter().map(|&i| Variable::new(NAMES[i])).collect();
                let cards = idx.iter().map(|&i| CARDS[i]).collect();
                Factor::new(scope, cards, values).unwrap()
            })
    }

    proptest! {
        #[test]
        fn prop_product_commutes(f in factor(), g in factor()) {
            let fg = f.product(&g).unwrap();
            let gf = g.product(&f).unwrap();
            prop_assert!(fg.approx_eq(&gf, 1e-9));
        }

        #[test]
        fn prop_product_associates(f in factor(), g in factor(), h in factor()) {
            let left = f.product(&g).unwrap().product(&h).unwrap();
            let right = f.product(&g.product(&h).unwrap()).unwrap();
            prop_assert!(left.approx_eq(&right, 1e-6));
        }

        /// Summing out a variable only `g` mentions commutes with the product.
        #[test]
        fn prop_marginalize_distributes(f in factor(), g in factor()) {
            for name in g.scope().iter().filter(|v| !f.contains(v.as_str())) {
                let left = f.product(&g).unwrap().marginalize(name.as_str()).unwrap();
                let right = f.product(&g.marginalize(name.as_str()).unwrap()).unwrap();
                prop_assert!(left.approx_eq(&right, 1e-6));
            }
        }

        #[test]
        fn prop_normalize_sums_to_one(f in factor()) {
            prop_assume!(f.sum() > 1e-9);
            let n = f.normalize().unwrap();
            prop_assert!((n.sum() - 1.0).abs() < 1e-9);
        }

        #[test]
        fn prop_marginalize_preserves_mass(f in factor()) {
            let total = f.sum();
            let names: Vec<String> = f.scope().iter().map(|v| v.to_string()).collect();
            let all = f.marginalize_all(&names).unwrap();
            prop_assert!((all.sum() - total).abs() < 1e-6 * total.max(1.0));
        }
    }
}
