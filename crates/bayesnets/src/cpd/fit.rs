//! Maximum-likelihood fitting of CPDs from tabular records.

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::categorical::CategoricalCpd;
use super::gaussian::{ConditionalLinearGaussian, LinearGaussian};
use super::{Cpd, CpdKind};
use crate::assignment::{Assignment, Value, Variable};
use crate::distribution::{Distribution, DistributionFamily};
use crate::error::{BayesNetError, Result};

/// Options controlling CPD estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Number of target categories; inferred from the data when `None`.
    pub target_cardinality: Option<usize>,
    /// Cardinalities of the parents, one per declared parent. For a
    /// conditional linear-Gaussian the entries of continuous parents are
    /// ignored, and a list with one entry per discrete parent is accepted too.
    pub parent_cardinalities: Option<Vec<usize>>,
    /// Floor applied to fitted standard deviations.
    pub min_std: f64,
    /// Pseudo-count added to every category (Dirichlet smoothing).
    pub pseudocount: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            target_cardinality: None,
            parent_cardinalities: None,
            min_std: 1e-6,
            pseudocount: 0.0,
        }
    }
}

impl FitOptions {
    pub fn with_target_cardinality(mut self, n: usize) -> Self {
        self.target_cardinality = Some(n);
        self
    }

    pub fn with_parent_cardinalities(mut self, cards: Vec<usize>) -> Self {
        self.parent_cardinalities = Some(cards);
        self
    }

    pub fn with_min_std(mut self, min_std: f64) -> Self {
        self.min_std = min_std;
        self
    }

    pub fn with_pseudocount(mut self, pseudocount: f64) -> Self {
        self.pseudocount = pseudocount;
        self
    }
}

/// Which CPD variant to estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpdFamily {
    /// Parentless; delegates to the distribution family.
    Static(DistributionFamily),
    /// Categorical table over integer-coded parents.
    Categorical,
    LinearGaussian,
    /// Discrete parents (those with discrete values in the data) select a
    /// linear-Gaussian over the remaining parents.
    ConditionalLinearGaussian,
}

pub(crate) fn fit_cpd(
    family: &CpdFamily,
    data: &[Assignment],
    target: Variable,
    parents: Vec<Variable>,
    options: &FitOptions,
) -> Result<Cpd> {
    if data.is_empty() {
        return Err(BayesNetError::InsufficientData {
            name: target,
            reason: "no records".to_string(),
        });
    }
    let targets = column(data, &target)?;

    let cpd = match family {
        CpdFamily::Static(dist_family) => {
            if !parents.is_empty() {
                return Err(BayesNetError::invalid(
                    "parents",
                    format!("static CPD for {} cannot have parents", target),
                ));
            }
            let dist = dist_family.fit(&target, &targets, options)?;
            Cpd::new_static(target, dist)?
        }
        CpdFamily::Categorical => {
            let table = fit_categorical(data, &target, &targets, &parents, options)?;
            Cpd::from_kind(target, parents, CpdKind::Categorical(table))?
        }
        CpdFamily::LinearGaussian => {
            let regressors = rows(data, &parents)?;
            let ys: Vec<f64> = targets.iter().map(Value::as_f64).collect();
            let lg = fit_linear_gaussian(&target, &regressors, &ys, options.min_std)?;
            Cpd::from_kind(target, parents, CpdKind::LinearGaussian(lg))?
        }
        CpdFamily::ConditionalLinearGaussian => {
            let first = &data[0];
            let (discrete, continuous): (Vec<Variable>, Vec<Variable>) = parents
                .iter()
                .cloned()
                .partition(|p| first.get(p.as_str()).is_some_and(Value::is_discrete));
            let cards = discrete_cardinalities(&parents, &discrete, options)?;
            let clg = fit_clg(
                data,
                &target,
                &targets,
                &discrete,
                &continuous,
                cards.as_ref(),
                options.min_std,
            )?;
            Cpd::conditional_linear_gaussian(target, &discrete, &continuous, clg)?
        }
    };

    debug!(
        "fitted {} CPD for {} from {} records ({} parameters)",
        cpd.kind().name(),
        cpd.target(),
        data.len(),
        cpd.n_params()
    );
    Ok(cpd)
}

fn column(data: &[Assignment], name: &Variable) -> Result<Vec<Value>> {
    data.iter().map(|r| r.require(name.as_str())).collect()
}

fn rows(data: &[Assignment], names: &[Variable]) -> Result<Vec<Vec<Value>>> {
    data.iter().map(|r| r.values_of(names)).collect()
}

fn discrete_column(name: &Variable, values: &[Value]) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|v| {
            v.as_discrete().ok_or_else(|| BayesNetError::Domain {
                variable: name.clone(),
                value: v.to_string(),
                reason: "expected a discrete value".to_string(),
            })
        })
        .collect()
}

/// Resolve cardinalities from options or the largest observed index.
fn cardinalities(
    names: &[Variable],
    columns: &[Vec<usize>],
    given: Option<&Vec<usize>>,
) -> Result<Vec<usize>> {
    let observed: Vec<usize> = columns
        .iter()
        .map(|c| c.iter().max().map_or(1, |m| m + 1))
        .collect();
    match given {
        None => Ok(observed),
        Some(cards) => {
            if cards.len() != names.len() {
                return Err(BayesNetError::ShapeMismatch {
                    expected: names.len(),
                    got: cards.len(),
                });
            }
            for ((name, &card), &seen) in names.iter().zip(cards).zip(&observed) {
                if seen > card {
                    return Err(BayesNetError::CardinalityMismatch {
                        variable: name.clone(),
                        expected: card,
                        got: seen,
                    });
                }
            }
            Ok(cards.clone())
        }
    }
}

/// Counts of each target value per parent configuration; returned as rows.
pub(crate) fn count_table(
    target: &Variable,
    targets: &[Value],
    parents: &[Variable],
    parent_values: &[Vec<Value>],
    target_card: Option<usize>,
    parent_cards: Option<&Vec<usize>>,
) -> Result<(Vec<usize>, Vec<Vec<usize>>)> {
    let target_idx = discrete_column(target, targets)?;
    let parent_columns: Vec<Vec<usize>> = parents
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let col: Vec<Value> = parent_values.iter().map(|row| row[j]).collect();
            discrete_column(name, &col)
        })
        .collect::<Result<_>>()?;

    let cards = cardinalities(parents, &parent_columns, parent_cards)?;
    let observed_target = target_idx.iter().max().map_or(1, |m| m + 1);
    let n_target = target_card.unwrap_or(observed_target);
    if observed_target > n_target {
        return Err(BayesNetError::CardinalityMismatch {
            variable: target.clone(),
            expected: n_target,
            got: observed_target,
        });
    }

    let n_configs: usize = cards.iter().product();
    let mut counts = vec![vec![0usize; n_target]; n_configs];
    for (i, &t) in target_idx.iter().enumerate() {
        let mut idx = 0;
        for (col, &card) in parent_columns.iter().zip(&cards) {
            idx = idx * card + col[i];
        }
        counts[idx][t] += 1;
    }
    Ok((cards, counts))
}

fn fit_categorical(
    data: &[Assignment],
    target: &Variable,
    targets: &[Value],
    parents: &[Variable],
    options: &FitOptions,
) -> Result<CategoricalCpd> {
    let parent_values = rows(data, parents)?;
    let (cards, counts) = count_table(
        target,
        targets,
        parents,
        &parent_values,
        options.target_cardinality,
        options.parent_cardinalities.as_ref(),
    )?;

    let distributions = counts
        .into_iter()
        .map(|row| {
            let weights: Vec<f64> = row.iter().map(|&c| c as f64 + options.pseudocount).collect();
            if weights.iter().sum::<f64>() > 0.0 {
                Distribution::from_weights(weights)
            } else {
                // unseen parent configuration
                Distribution::uniform_categorical(weights.len())
            }
        })
        .collect::<Result<Vec<_>>>()?;
    CategoricalCpd::new(cards, distributions)
}

/// Ordinary least squares of `ys` on `regressors` plus an intercept.
pub(crate) fn fit_linear_gaussian(
    target: &Variable,
    regressors: &[Vec<Value>],
    ys: &[f64],
    min_std: f64,
) -> Result<LinearGaussian> {
    let n = ys.len();
    if n == 0 {
        return Err(BayesNetError::InsufficientData {
            name: target.clone(),
            reason: "no records".to_string(),
        });
    }
    let k = regressors.first().map_or(0, Vec::len);

    let x = DMatrix::from_fn(n, k + 1, |i, j| {
        if j < k {
            regressors[i][j].as_f64()
        } else {
            1.0
        }
    });
    let y = DVector::from_column_slice(ys);

    let beta = x
        .clone()
        .svd(true, true)
        .solve(&y, 1e-12)
        .map_err(|e| BayesNetError::InsufficientData {
            name: target.clone(),
            reason: e.to_string(),
        })?;

    let residuals = &y - &x * &beta;
    let variance = residuals.norm_squared() / n as f64;
    let std = variance.sqrt().max(min_std);

    let weights: Vec<f64> = beta.iter().take(k).copied().collect();
    LinearGaussian::new(weights, beta[k], std)
}

/// The given cardinalities of the discrete parents of a CLG.
fn discrete_cardinalities(
    parents: &[Variable],
    discrete: &[Variable],
    options: &FitOptions,
) -> Result<Option<Vec<usize>>> {
    let Some(cards) = &options.parent_cardinalities else {
        return Ok(None);
    };
    if cards.len() == discrete.len() {
        return Ok(Some(cards.clone()));
    }
    if cards.len() != parents.len() {
        return Err(BayesNetError::ShapeMismatch {
            expected: parents.len(),
            got: cards.len(),
        });
    }
    Ok(Some(
        parents
            .iter()
            .zip(cards)
            .filter(|(p, _)| discrete.contains(p))
            .map(|(_, &c)| c)
            .collect(),
    ))
}

fn fit_clg(
    data: &[Assignment],
    target: &Variable,
    targets: &[Value],
    discrete: &[Variable],
    continuous: &[Variable],
    parent_cards: Option<&Vec<usize>>,
    min_std: f64,
) -> Result<ConditionalLinearGaussian> {
    let discrete_values = rows(data, discrete)?;
    let continuous_values = rows(data, continuous)?;
    let ys: Vec<f64> = targets.iter().map(Value::as_f64).collect();

    let columns: Vec<Vec<usize>> = discrete
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let col: Vec<Value> = discrete_values.iter().map(|r| r[j]).collect();
            discrete_column(name, &col)
        })
        .collect::<Result<_>>()?;
    let cards = cardinalities(discrete, &columns, parent_cards)?;
    let n_configs: usize = cards.iter().product();

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n_configs];
    for i in 0..data.len() {
        let mut idx = 0;
        for (col, &card) in columns.iter().zip(&cards) {
            idx = idx * card + col[i];
        }
        groups[idx].push(i);
    }

    let pooled = fit_linear_gaussian(target, &continuous_values, &ys, min_std)?;
    let models = groups
        .iter()
        .map(|rows| {
            if rows.is_empty() {
                return Ok(pooled.clone());
            }
            let xs: Vec<Vec<Value>> = rows.iter().map(|&i| continuous_values[i].clone()).collect();
            let sub_ys: Vec<f64> = rows.iter().map(|&i| ys[i]).collect();
            fit_linear_gaussian(target, &xs, &sub_ys, min_std)
        })
        .collect::<Result<Vec<_>>>()?;

    ConditionalLinearGaussian::new(cards, models)
}
