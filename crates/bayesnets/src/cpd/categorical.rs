//! Conditional probability tables over finite, integer-coded parents.

use serde::{Deserialize, Serialize};

use crate::assignment::{Value, Variable};
use crate::distribution::Distribution;
use crate::error::{BayesNetError, Result};

/// One discrete distribution per parent configuration.
///
/// `distributions[encode_parents(values)]` is `P(target | parents = values)`.
/// Parent configurations are encoded row-major: for parents with
/// cardinalities `[s0, s1]`, values `[v0, v1]` map to `v0 * s1 + v1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalCpd {
    parent_cards: Vec<usize>,
    distributions: Vec<Distribution>,
}

impl CategoricalCpd {
    /// Create a table from per-configuration distributions.
    ///
    /// Every distribution must be finite-discrete with the same cardinality,
    /// and there must be exactly one per parent configuration.
    pub fn new(parent_cards: Vec<usize>, distributions: Vec<Distribution>) -> Result<Self> {
        if parent_cards.iter().any(|&c| c == 0) {
            return Err(BayesNetError::invalid(
                "parent_cards",
                "every parent needs at least one category",
            ));
        }
        let n_configs: usize = parent_cards.iter().product();
        if distributions.len() != n_configs {
            return Err(BayesNetError::ShapeMismatch {
                expected: n_configs,
                got: distributions.len(),
            });
        }

        let mut target_card = None;
        for d in &distributions {
            d.validate()?;
            let card = d.cardinality().ok_or_else(|| {
                BayesNetError::invalid(
                    "distributions",
                    format!("{} is not a finite discrete family", d.family_name()),
                )
            })?;
            match target_card {
                None => target_card = Some(card),
                Some(expected) if expected != card => {
                    return Err(BayesNetError::ShapeMismatch {
                        expected,
                        got: card,
                    })
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            parent_cards,
            distributions,
        })
    }

    /// Create a table from probability rows (one row per parent configuration).
    pub fn from_rows(parent_cards: Vec<usize>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let distributions = rows
            .into_iter()
            .map(Distribution::categorical)
            .collect::<Result<Vec<_>>>()?;
        Self::new(parent_cards, distributions)
    }

    pub fn parent_cardinalities(&self) -> &[usize] {
        &self.parent_cards
    }

    pub fn target_cardinality(&self) -> usize {
        self.distributions
            .first()
            .and_then(Distribution::cardinality)
            .unwrap_or(0)
    }

    pub fn distributions(&self) -> &[Distribution] {
        &self.distributions
    }

    /// Encode parent values into a single row index.
    pub fn encode_parents(&self, parents: &[Variable], values: &[Value]) -> Result<usize> {
        if values.len() != self.parent_cards.len() {
            return Err(BayesNetError::ShapeMismatch {
                expected: self.parent_cards.len(),
                got: values.len(),
            });
        }

        let mut idx = 0;
        for ((value, &card), name) in values.iter().zip(&self.parent_cards).zip(parents) {
            let k = match value {
                Value::Discrete(k) if *k < card => *k,
                other => {
                    return Err(BayesNetError::Domain {
                        variable: name.clone(),
                        value: other.to_string(),
                        reason: format!("parent takes values in 0..{}", card),
                    })
                }
            };
            idx = idx * card + k;
        }
        Ok(idx)
    }

    /// Decode a row index into individual parent values.
    pub fn decode_parents(&self, mut idx: usize) -> Vec<usize> {
        let mut values = vec![0; self.parent_cards.len()];
        for i in (0..self.parent_cards.len()).rev() {
            values[i] = idx % self.parent_cards[i];
            idx /= self.parent_cards[i];
        }
        values
    }

    /// The distribution selected by `values`.
    pub fn row(&self, parents: &[Variable], values: &[Value]) -> Result<&Distribution> {
        let idx = self.encode_parents(parents, values)?;
        Ok(&self.distributions[idx])
    }

    /// Flattened table, parent configuration major and target value minor.
    pub fn table(&self) -> Vec<f64> {
        self.distributions
            .iter()
            .flat_map(|d| d.probs().unwrap_or_default())
            .collect()
    }

    pub fn n_params(&self) -> usize {
        self.distributions.iter().map(Distribution::n_params).sum()
    }
}
