//! Gibbs sampling.
//!
//! The chain state is one full assignment with the evidence clamped. Each
//! iteration picks one unobserved variable and redraws it from its full
//! conditional, which is proportional to its own CPD density times the
//! densities of its children:
//!
//! ```text
//! P(x | rest) ∝ P(x | parents(x)) · Π_c P(c | parents(c))
//! ```
//!
//! Discrete variables enumerate that product in log-space. Variables whose
//! domain cannot be enumerated take an independence Metropolis step that
//! proposes from their own CPD and accepts on the children's likelihood ratio.

use std::time::{Duration, Instant};

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::direct::forward_pass;
use super::{check_evidence, normalize_log, Sampler};
use crate::assignment::{Assignment, Value, Variable};
use crate::cpd::Cpd;
use crate::distribution::sample_index;
use crate::error::{BayesNetError, Result};
use crate::network::BayesNet;

/// How the variable to update is chosen each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VariableOrder {
    /// Cycle through the unobserved variables in topological order.
    #[default]
    Sequential,
    /// Pick an unobserved variable uniformly at random.
    Random,
    /// Update every unobserved variable, in topological order, within a
    /// single iteration.
    Sweep,
}

/// Configuration for [`GibbsSampler`].
///
/// One iteration updates a single variable, or all of them under
/// [`VariableOrder::Sweep`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GibbsConfig {
    pub evidence: Assignment,
    /// Iterations discarded before the first sample.
    pub burn_in: usize,
    /// Iterations skipped between collected samples.
    pub thinning: usize,
    /// Starting state; evidence entries override it.
    pub initial_sample: Option<Assignment>,
    pub order: VariableOrder,
    /// Wall-clock budget for one chain.
    pub time_limit: Option<Duration>,
    /// Forward passes tried when looking for a starting state with non-zero
    /// probability under the evidence.
    pub max_init_attempts: usize,
}

impl Default for GibbsConfig {
    fn default() -> Self {
        Self {
            evidence: Assignment::new(),
            burn_in: 100,
            thinning: 0,
            initial_sample: None,
            order: VariableOrder::Sequential,
            time_limit: None,
            max_init_attempts: 10_000,
        }
    }
}

impl GibbsConfig {
    pub fn with_evidence(mut self, evidence: Assignment) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_burn_in(mut self, burn_in: usize) -> Self {
        self.burn_in = burn_in;
        self
    }

    pub fn with_thinning(mut self, thinning: usize) -> Self {
        self.thinning = thinning;
        self
    }

    pub fn with_initial_sample(mut self, initial: Assignment) -> Self {
        self.initial_sample = Some(initial);
        self
    }

    pub fn with_order(mut self, order: VariableOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_max_init_attempts(mut self, attempts: usize) -> Self {
        self.max_init_attempts = attempts;
        self
    }
}

/// Markov-chain sampler; see the module docs.
#[derive(Debug, Clone, Default)]
pub struct GibbsSampler {
    config: GibbsConfig,
}

impl GibbsSampler {
    pub fn new(config: GibbsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GibbsConfig {
        &self.config
    }

    /// Forward passes with the evidence clamped until one has non-zero
    /// weight; fails with [`BayesNetError::RejectionLimit`] once
    /// `max_init_attempts` passes have all had zero weight.
    fn initial_state<R: Rng + ?Sized>(&self, cpds: &[&Cpd], rng: &mut R) -> Result<Assignment> {
        let evidence = &self.config.evidence;
        for attempt in 1..=self.config.max_init_attempts {
            let (state, log_weight) = forward_pass(cpds, evidence, rng)?;
            if log_weight > f64::NEG_INFINITY {
                if attempt > 1 {
                    debug!("gibbs start found after {} forward passes", attempt);
                }
                return Ok(state);
            }
        }
        Err(BayesNetError::RejectionLimit {
            attempts: self.config.max_init_attempts,
            accepted: 0,
            requested: 1,
            evidence: evidence.clone(),
        })
    }

    /// Start a fresh chain from the configured initial state.
    ///
    /// Each call restarts from scratch; the chain borrows `rng` for its lifetime.
    pub fn chain<'a, R: Rng + ?Sized>(
        &'a self,
        net: &'a BayesNet,
        rng: &'a mut R,
    ) -> Result<GibbsChain<'a, R>> {
        let evidence = &self.config.evidence;
        check_evidence(net, evidence)?;
        let cpds = net.ordered_cpds()?;

        let mut targets = Vec::new();
        for &cpd in &cpds {
            let name = cpd.target();
            if evidence.contains(name.as_str()) {
                continue;
            }
            let children = net
                .children(name.as_str())?
                .iter()
                .map(|c| net.cpd(c.as_str()))
                .collect::<Result<Vec<_>>>()?;
            targets.push(Target {
                name: name.clone(),
                cpd,
                children,
            });
        }

        let state = match &self.config.initial_sample {
            Some(initial) => {
                let mut state = initial.clone();
                state.merge(evidence);
                if let Some(cpd) = cpds.iter().find(|c| !state.contains(c.target().as_str())) {
                    return Err(BayesNetError::UndefinedVariable {
                        name: cpd.target().clone(),
                    });
                }
                state
            }
            None => self.initial_state(&cpds, &mut *rng)?,
        };

        debug!(
            "gibbs chain over {} unobserved of {} variables, burn-in {}, thinning {}",
            targets.len(),
            cpds.len(),
            self.config.burn_in,
            self.config.thinning
        );

        Ok(GibbsChain {
            config: &self.config,
            targets,
            state,
            rng,
            cursor: 0,
            burned_in: false,
            collected: 0,
            started: Instant::now(),
            done: false,
        })
    }
}

impl Sampler for GibbsSampler {
    type Sample = Assignment;

    fn sample_one<R: Rng + ?Sized>(&self, net: &BayesNet, rng: &mut R) -> Result<Assignment> {
        let mut samples = self.sample(net, 1, rng)?;
        Ok(samples.remove(0))
    }

    /// `n` consecutive samples of a single chain.
    fn sample<R: Rng + ?Sized>(
        &self,
        net: &BayesNet,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Assignment>> {
        self.chain(net, rng)?.take(n).collect()
    }
}

struct Target<'a> {
    name: Variable,
    cpd: &'a Cpd,
    children: Vec<&'a Cpd>,
}

/// A running Gibbs chain. Yields one sample per `next`, forever, unless the
/// time limit is hit or an update fails; the error is yielded once and the
/// chain ends.
pub struct GibbsChain<'a, R: Rng + ?Sized> {
    config: &'a GibbsConfig,
    targets: Vec<Target<'a>>,
    state: Assignment,
    rng: &'a mut R,
    cursor: usize,
    burned_in: bool,
    collected: usize,
    started: Instant,
    done: bool,
}

impl<'a, R: Rng + ?Sized> GibbsChain<'a, R> {
    /// The current chain state.
    pub fn state(&self) -> &Assignment {
        &self.state
    }

    fn children_log_density(&self, target: &Target<'_>) -> Result<f64> {
        target.children.iter().try_fold(0.0, |acc, child| {
            let value = self.state.require(child.target().as_str())?;
            Ok(acc + child.log_density(&self.state, &value)?)
        })
    }

    fn update(&mut self, idx: usize) -> Result<()> {
        let target = &self.targets[idx];
        let name = target.name.clone();
        match target.cpd.cardinality() {
            Some(card) => {
                let mut log_weights = Vec::with_capacity(card);
                for k in 0..card {
                    self.state.insert(name.clone(), Value::Discrete(k));
                    let own = target.cpd.log_density(&self.state, &Value::Discrete(k))?;
                    let lw = if own == f64::NEG_INFINITY {
                        own
                    } else {
                        own + self.children_log_density(target)?
                    };
                    log_weights.push(lw);
                }
                let probs = normalize_log(&log_weights).ok_or_else(|| {
                    BayesNetError::DegenerateFactor {
                        evidence: self.config.evidence.clone(),
                    }
                })?;
                let k = sample_index(&probs, self.rng.gen());
                self.state.insert(name, Value::Discrete(k));
            }
            None => {
                let current = self.state.require(name.as_str())?;
                let current_ll = self.children_log_density(target)?;
                let proposal = target.cpd.sample(&self.state, &mut *self.rng)?;
                self.state.insert(name.clone(), proposal);
                let proposal_ll = self.children_log_density(target)?;
                let log_ratio = proposal_ll - current_ll;
                let accept = log_ratio >= 0.0 || self.rng.gen::<f64>().ln() < log_ratio;
                if !accept {
                    self.state.insert(name, current);
                }
            }
        }
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        if let Some(limit) = self.config.time_limit {
            let elapsed = self.started.elapsed();
            if elapsed > limit {
                return Err(BayesNetError::TimeLimit {
                    elapsed_ms: elapsed.as_millis(),
                    collected: self.collected,
                });
            }
        }
        if self.targets.is_empty() {
            return Ok(());
        }
        match self.config.order {
            VariableOrder::Sequential => {
                let idx = self.cursor;
                self.cursor = (self.cursor + 1) % self.targets.len();
                self.update(idx)
            }
            VariableOrder::Random => {
                let idx = self.rng.gen_range(0..self.targets.len());
                self.update(idx)
            }
            VariableOrder::Sweep => (0..self.targets.len()).try_for_each(|idx| self.update(idx)),
        }
    }

    fn advance(&mut self) -> Result<Assignment> {
        if !self.burned_in {
            for _ in 0..self.config.burn_in {
                self.step()?;
            }
            self.burned_in = true;
        }
        for _ in 0..=self.config.thinning {
            self.step()?;
        }
        self.collected += 1;
        Ok(self.state.clone())
    }
}

impl<'a, R: Rng + ?Sized> Iterator for GibbsChain<'a, R> {
    type Item = Result<Assignment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.advance();
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}
