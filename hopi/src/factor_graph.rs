//! Arena holding the variable nodes and factor nodes of a graph.
//!
//! Nodes are addressed by their index and never change once created. Each var keeps the list
//! of its incident factors, each factor knows its neighbors. Beliefs are not stored here, see
//! [`crate::VmpState`].

use indexmap::IndexMap;
use ndarray::{Array1, ArrayView1};
use thiserror::Error;

use crate::distribution::{Belief, BeliefError};
use crate::nodes::{CategoricalNode, FactorNode};

pub type VarId = usize;
pub type FactorId = usize;

type NamedList<T> = IndexMap<String, T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Categorical,
    Dirichlet,
}

impl VarKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Categorical => "categorical",
            Self::Dirichlet => "dirichlet",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Var {
    kind: VarKind,
    nc: usize,
    // Only for Dirichlet vars.
    prior: Option<Array1<f64>>,
    factors: Vec<FactorId>,
}

impl Var {
    pub fn kind(&self) -> VarKind {
        self.kind
    }
    /// Number of categories.
    pub fn nc(&self) -> usize {
        self.nc
    }
    /// Prior concentration parameters of a Dirichlet var.
    pub fn prior(&self) -> Option<ArrayView1<'_, f64>> {
        self.prior.as_ref().map(|p| p.view())
    }
    /// Incident factors, in insertion order.
    pub fn factors(&self) -> impl Iterator<Item = FactorId> + '_ {
        self.factors.iter().copied()
    }
    /// Belief of the var before any message is received.
    pub(crate) fn initial_belief(&self) -> Belief {
        match &self.prior {
            Some(prior) => Belief::Dirichlet(prior.clone()),
            None => Belief::uniform(self.nc),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphBuildError {
    #[error("Variable {0} declared multiple times.")]
    MultipleVarDecl(String),
    #[error("No variable named {0}.")]
    NoVar(String),
    #[error("No variable with id {0}.")]
    UnknownVar(VarId),
    #[error("Variable {0} must have at least one category.")]
    ZeroCardinality(String),
    #[error("Invalid prior for variable {0}: {1}")]
    InvalidPrior(String, #[source] BeliefError),
    #[error("Invalid fixed parameter: {0}")]
    InvalidParam(#[source] BeliefError),
    #[error("Variable {0} is generated by a categorical factor, it must be categorical.")]
    ChildNotCategorical(String),
    #[error("Variable {0} parametrizes a categorical factor, it must be Dirichlet.")]
    ParentNotDirichlet(String),
    #[error("Variable {0} is both the child and the parent of a factor.")]
    SelfLoop(String),
    #[error("Variable {0} already has a generating factor.")]
    MultipleGenerators(String),
    #[error("Child has {child} categories but its parameter has {parent}.")]
    CardinalityMismatch { child: usize, parent: usize },
}

#[derive(Debug, Clone, Default)]
pub struct FactorGraph {
    vars: NamedList<Var>,
    factors: Vec<FactorNode>,
}

impl FactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_var(&mut self, name: String, var: Var) -> Result<VarId, GraphBuildError> {
        if self.vars.contains_key(&name) {
            return Err(GraphBuildError::MultipleVarDecl(name));
        }
        tracing::trace!(var = %name, kind = var.kind.name(), nc = var.nc, "add var");
        Ok(self.vars.insert_full(name, var).0)
    }

    pub fn add_categorical_var(
        &mut self,
        name: impl Into<String>,
        nc: usize,
    ) -> Result<VarId, GraphBuildError> {
        let name = name.into();
        if nc == 0 {
            return Err(GraphBuildError::ZeroCardinality(name));
        }
        self.add_var(
            name,
            Var {
                kind: VarKind::Categorical,
                nc,
                prior: None,
                factors: Vec::new(),
            },
        )
    }

    /// Add a Dirichlet var whose prior concentrations are `prior`.
    pub fn add_dirichlet_var(
        &mut self,
        name: impl Into<String>,
        prior: Array1<f64>,
    ) -> Result<VarId, GraphBuildError> {
        let name = name.into();
        if prior.is_empty() {
            return Err(GraphBuildError::ZeroCardinality(name));
        }
        if let Err(e) = Belief::Dirichlet(prior.clone()).validate() {
            return Err(GraphBuildError::InvalidPrior(name, e));
        }
        self.add_var(
            name,
            Var {
                kind: VarKind::Dirichlet,
                nc: prior.len(),
                prior: Some(prior),
                factors: Vec::new(),
            },
        )
    }

    /// Add the factor P(child | param), or P(child) with a uniform parameter if `param` is
    /// `None`.
    pub fn add_categorical(
        &mut self,
        child: VarId,
        param: Option<VarId>,
    ) -> Result<FactorId, GraphBuildError> {
        let nc = self.check_child(child)?;
        let node = match param {
            Some(param) => {
                let (name, var) = self
                    .vars
                    .get_index(param)
                    .ok_or(GraphBuildError::UnknownVar(param))?;
                if param == child {
                    return Err(GraphBuildError::SelfLoop(name.clone()));
                }
                if var.kind != VarKind::Dirichlet {
                    return Err(GraphBuildError::ParentNotDirichlet(name.clone()));
                }
                if var.nc != nc {
                    return Err(GraphBuildError::CardinalityMismatch {
                        child: nc,
                        parent: var.nc,
                    });
                }
                CategoricalNode::with_dirichlet(child, param, nc)
            }
            None => CategoricalNode::new(child, nc),
        };
        Ok(self.add_factor(FactorNode::Categorical(node)))
    }

    /// Add the factor P(child) with the fixed parameter vector `probs`.
    pub fn add_categorical_fixed(
        &mut self,
        child: VarId,
        probs: Array1<f64>,
    ) -> Result<FactorId, GraphBuildError> {
        let nc = self.check_child(child)?;
        if probs.len() != nc {
            return Err(GraphBuildError::CardinalityMismatch {
                child: nc,
                parent: probs.len(),
            });
        }
        Belief::categorical(probs.clone()).map_err(GraphBuildError::InvalidParam)?;
        let node = CategoricalNode::with_fixed(child, probs.view());
        Ok(self.add_factor(FactorNode::Categorical(node)))
    }

    /// Check that `child` can be generated by a categorical factor, returns its cardinality.
    fn check_child(&self, child: VarId) -> Result<usize, GraphBuildError> {
        let (name, var) = self
            .vars
            .get_index(child)
            .ok_or(GraphBuildError::UnknownVar(child))?;
        if var.kind != VarKind::Categorical {
            return Err(GraphBuildError::ChildNotCategorical(name.clone()));
        }
        if var
            .factors()
            .any(|f| self.factors[f].child() == child)
        {
            return Err(GraphBuildError::MultipleGenerators(name.clone()));
        }
        Ok(var.nc)
    }

    fn add_factor(&mut self, node: FactorNode) -> FactorId {
        let factor_id = self.factors.len();
        for var_id in node.neighbors() {
            self.vars[var_id].factors.push(factor_id);
        }
        tracing::trace!(factor = factor_id, kind = node.kind_name(), "add factor");
        self.factors.push(node);
        factor_id
    }

    pub fn var_id(&self, name: &str) -> Result<VarId, GraphBuildError> {
        self.vars
            .get_index_of(name)
            .ok_or_else(|| GraphBuildError::NoVar(name.to_owned()))
    }
    pub fn var_name(&self, var: VarId) -> Option<&str> {
        self.vars.get_index(var).map(|(name, _)| name.as_str())
    }
    pub fn var(&self, var: VarId) -> &Var {
        &self.vars[var]
    }
    pub fn factor(&self, factor: FactorId) -> &FactorNode {
        &self.factors[factor]
    }
    pub fn nvars(&self) -> usize {
        self.vars.len()
    }
    pub fn nfactors(&self) -> usize {
        self.factors.len()
    }
    pub fn vars(&self) -> impl Iterator<Item = (VarId, &str, &Var)> {
        self.vars
            .iter()
            .enumerate()
            .map(|(i, (name, var))| (i, name.as_str(), var))
    }
    pub fn factors(&self) -> impl Iterator<Item = (FactorId, &FactorNode)> {
        self.factors.iter().enumerate()
    }
}
