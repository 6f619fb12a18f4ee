//! Error types for network construction, inference and sampling.

use thiserror::Error;

use crate::assignment::{Assignment, Variable};

/// Errors that can occur while building, querying or sampling a network.
///
/// Every variant carries enough context (variable names, offending values,
/// the evidence in play) to diagnose the failure without re-deriving state.
#[derive(Debug, Clone, Error)]
pub enum BayesNetError {
    /// Adding the CPD's parent edges would close a directed cycle.
    #[error("Adding {target} with parents {parents:?} would create a cycle")]
    Cycle {
        target: Variable,
        parents: Vec<Variable>,
    },

    /// A CPD for this variable is already in the network.
    #[error("Variable {name} already has a CPD in the network")]
    DuplicateName { name: Variable },

    /// A query, evidence or parent name is absent from the network.
    #[error("Variable {name} is not defined in the network")]
    UndefinedVariable { name: Variable },

    /// The node exists (it is referenced as a parent) but has no CPD yet.
    #[error("Variable {name} is referenced as a parent but has no CPD")]
    MissingCpd { name: Variable },

    /// The evidence has zero probability under the model.
    #[error("Evidence has zero probability: {evidence}")]
    DegenerateFactor { evidence: Assignment },

    /// A value lies outside the support of a distribution.
    #[error("Value {value} is outside the support of {variable}: {reason}")]
    Domain {
        variable: Variable,
        value: String,
        reason: String,
    },

    /// Two factors disagree on the cardinality of a shared variable.
    #[error("Cardinality mismatch for {variable}: expected {expected}, got {got}")]
    CardinalityMismatch {
        variable: Variable,
        expected: usize,
        got: usize,
    },

    /// A table or parameter vector has the wrong length.
    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    /// A factor table contains a negative or non-finite entry.
    #[error("Factor tables must contain finite non-negative weights")]
    NegativeWeight,

    /// Exact inference requires a discrete CPD at this node.
    #[error("Variable {name} does not have a discrete CPD")]
    NotDiscrete { name: Variable },

    /// Invalid parameter for a distribution, CPD or configuration.
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Rejection sampling exhausted its attempt budget.
    #[error(
        "Rejection sampling accepted {accepted} of {requested} samples after {attempts} attempts (evidence: {evidence})"
    )]
    RejectionLimit {
        attempts: usize,
        accepted: usize,
        requested: usize,
        evidence: Assignment,
    },

    /// Gibbs sampling ran past its configured wall-clock budget.
    #[error("Gibbs sampling exceeded its time limit after {elapsed_ms} ms ({collected} samples collected)")]
    TimeLimit { elapsed_ms: u128, collected: usize },

    /// Not enough records to estimate the requested parameters.
    #[error("Cannot fit {name}: {reason}")]
    InsufficientData { name: Variable, reason: String },
}

impl BayesNetError {
    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        BayesNetError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BayesNetError>;
