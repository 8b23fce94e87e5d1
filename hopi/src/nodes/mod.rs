//! Factor nodes.
//!
//! Every factor has one child and a fixed list of parents. The inference loop only uses the
//! operations of [`FactorNode`]: listing the neighbors, computing the message toward one of
//! them, and computing the factor's term of the variational free energy.

mod categorical;

pub use categorical::{CategoricalNode, Param};

use ndarray::{Array1, ArrayView1};
use thiserror::Error;

use crate::distribution::Beliefs;
use crate::factor_graph::VarId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    #[error("Parent index {index} out of range for a factor with {arity} parent(s).")]
    ParentOutOfRange { index: usize, arity: usize },
    #[error("Variable {target} is not a neighbor of this factor.")]
    InvalidTarget { target: VarId },
    #[error("The factor has no parameter node.")]
    NoParent,
    #[error("No belief for variable {0}.")]
    MissingBelief(VarId),
    #[error("Wrong belief kind for variable {var}: got {got}, expected {expected}.")]
    WrongBeliefKind {
        var: VarId,
        got: &'static str,
        expected: &'static str,
    },
    #[error("Shape mismatch for variable {var}: got {got} categories, expected {expected}.")]
    Shape {
        var: VarId,
        expected: usize,
        got: usize,
    },
}

/// A message from a factor to a variable, in the natural parameter space of the variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Unnormalized log-probabilities, sent to a categorical var.
    LogProbabilities(Array1<f64>),
    /// Pseudo-counts added to the concentrations of a Dirichlet var.
    PseudoCounts(Array1<f64>),
}

impl Message {
    pub fn values(&self) -> ArrayView1<'_, f64> {
        match self {
            Self::LogProbabilities(v) | Self::PseudoCounts(v) => v.view(),
        }
    }
    pub fn into_values(self) -> Array1<f64> {
        match self {
            Self::LogProbabilities(v) | Self::PseudoCounts(v) => v,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FactorNode {
    Categorical(CategoricalNode),
}

impl FactorNode {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Categorical(_) => "categorical",
        }
    }
    pub fn parents(&self) -> &[VarId] {
        match self {
            Self::Categorical(n) => n.parents(),
        }
    }
    /// The `i`-th parent. Asking for a parent the factor does not have is a wiring bug.
    pub fn parent(&self, i: usize) -> Result<VarId, NodeError> {
        let parents = self.parents();
        parents
            .get(i)
            .copied()
            .ok_or(NodeError::ParentOutOfRange {
                index: i,
                arity: parents.len(),
            })
    }
    /// The var generated by the factor.
    pub fn child(&self) -> VarId {
        match self {
            Self::Categorical(n) => n.child(),
        }
    }
    /// Child first, then parents.
    pub fn neighbors(&self) -> impl Iterator<Item = VarId> + '_ {
        std::iter::once(self.child()).chain(self.parents().iter().copied())
    }
    pub fn message(&self, to: VarId, beliefs: &Beliefs) -> Result<Message, NodeError> {
        match self {
            Self::Categorical(n) => n.message(to, beliefs),
        }
    }
    /// Contribution of the factor to the evidence lower bound: E_q[ln P(child | parents)].
    pub fn vfe(&self, beliefs: &Beliefs) -> Result<f64, NodeError> {
        match self {
            Self::Categorical(n) => n.vfe(beliefs),
        }
    }
}

/// Probabilities of the categorical var `var`, checked against `nc`.
pub(crate) fn categorical_belief(
    beliefs: &Beliefs,
    var: VarId,
    nc: usize,
) -> Result<ArrayView1<'_, f64>, NodeError> {
    let belief = beliefs.get(var).ok_or(NodeError::MissingBelief(var))?;
    let p = belief.as_categorical().ok_or(NodeError::WrongBeliefKind {
        var,
        got: belief.kind_name(),
        expected: "categorical",
    })?;
    check_len(var, p, nc)
}

/// Concentrations of the Dirichlet var `var`, checked against `nc`.
pub(crate) fn dirichlet_belief(
    beliefs: &Beliefs,
    var: VarId,
    nc: usize,
) -> Result<ArrayView1<'_, f64>, NodeError> {
    let belief = beliefs.get(var).ok_or(NodeError::MissingBelief(var))?;
    let alpha = belief.as_dirichlet().ok_or(NodeError::WrongBeliefKind {
        var,
        got: belief.kind_name(),
        expected: "dirichlet",
    })?;
    check_len(var, alpha, nc)
}

fn check_len(var: VarId, x: ArrayView1<f64>, nc: usize) -> Result<ArrayView1<f64>, NodeError> {
    if x.len() != nc {
        Err(NodeError::Shape {
            var,
            expected: nc,
            got: x.len(),
        })
    } else {
        Ok(x)
    }
}
