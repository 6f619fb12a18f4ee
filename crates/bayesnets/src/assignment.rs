//! Variables, values and (partial) assignments.
//!
//! An [`Assignment`] maps variable names to values. Samplers produce full
//! assignments, evidence is a partial one, and a dataset is simply a slice of
//! assignments (one per record).

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BayesNetError, Result};

/// The name of a random variable.
///
/// Cheap to clone; compares and hashes by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variable(Arc<str>);

impl Variable {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Variable {
    fn from(name: &str) -> Self {
        Variable::new(name)
    }
}

impl From<String> for Variable {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&Variable> for Variable {
    fn from(v: &Variable) -> Self {
        v.clone()
    }
}

impl Borrow<str> for Variable {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The value taken by a variable.
///
/// Discrete values are zero-based category indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Discrete(usize),
    Continuous(f64),
}

impl Value {
    /// The value as a real number (discrete indices are widened).
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Discrete(k) => k as f64,
            Value::Continuous(x) => x,
        }
    }

    pub fn as_discrete(&self) -> Option<usize> {
        match *self {
            Value::Discrete(k) => Some(k),
            Value::Continuous(_) => None,
        }
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self, Value::Discrete(_))
    }
}

impl From<usize> for Value {
    fn from(k: usize) -> Self {
        Value::Discrete(k)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Continuous(x)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Discrete(k) => write!(f, "{}", k),
            Value::Continuous(x) => write!(f, "{}", x),
        }
    }
}

/// A mapping from variables to values, holding at most one value per variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assignment {
    values: BTreeMap<Variable, Value>,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an assignment from `(name, value)` pairs; later pairs win.
    ///
    /// ```rust
    /// use bayesnets::{Assignment, Value};
    ///
    /// let a = Assignment::from_pairs([("rain", Value::Discrete(1)), ("temp", Value::Continuous(12.5))]);
    /// assert_eq!(a.discrete("rain").unwrap(), 1);
    /// ```
    pub fn from_pairs<N, V, I>(pairs: I) -> Self
    where
        N: Into<Variable>,
        V: Into<Value>,
        I: IntoIterator<Item = (N, V)>,
    {
        pairs
            .into_iter()
            .map(|(n, v)| (n.into(), v.into()))
            .collect()
    }

    /// Set a value, returning the previous one if any.
    pub fn insert(&mut self, name: impl Into<Variable>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    /// Builder-style `insert`.
    pub fn with(mut self, name: impl Into<Variable>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// The value of `name`, failing if it is unassigned.
    pub fn require(&self, name: &str) -> Result<Value> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| BayesNetError::UndefinedVariable {
                name: Variable::new(name),
            })
    }

    /// The discrete value of `name`.
    pub fn discrete(&self, name: &str) -> Result<usize> {
        let value = self.require(name)?;
        value.as_discrete().ok_or_else(|| BayesNetError::Domain {
            variable: Variable::new(name),
            value: value.to_string(),
            reason: "expected a discrete value".to_string(),
        })
    }

    /// The value of `name` as a real number.
    pub fn continuous(&self, name: &str) -> Result<f64> {
        Ok(self.require(name)?.as_f64())
    }

    /// Values of `names`, in order. Fails on the first missing name.
    pub fn values_of(&self, names: &[Variable]) -> Result<Vec<Value>> {
        names.iter().map(|n| self.require(n.as_str())).collect()
    }

    /// Restrict to `names`, skipping those that are unassigned.
    pub fn project(&self, names: &[Variable]) -> Assignment {
        names
            .iter()
            .filter_map(|n| self.values.get(n).map(|v| (n.clone(), *v)))
            .collect()
    }

    /// Overwrite with every entry of `other`.
    pub fn merge(&mut self, other: &Assignment) {
        for (name, value) in other.iter() {
            self.values.insert(name.clone(), *value);
        }
    }

    /// True if every entry of `evidence` is present here with an equal value.
    pub fn is_consistent_with(&self, evidence: &Assignment) -> bool {
        evidence
            .iter()
            .all(|(name, value)| self.values.get(name) == Some(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Value)> {
        self.values.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &Variable> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(Variable, Value)> for Assignment {
    fn from_iter<I: IntoIterator<Item = (Variable, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Assignment {
    type Item = (&'a Variable, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, Variable, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str("}")
    }
}
