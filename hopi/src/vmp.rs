//! Variational message passing.
//!
//! The state owns one belief per variable. Updating a variable gathers the messages of all its
//! incident factors, computed against the current beliefs, and replaces its belief with the
//! resulting posterior:
//! - a categorical var gets softmax(sum of the log-probability messages),
//! - a Dirichlet var gets its prior concentrations plus the sum of the pseudo-counts.
//!
//! Free energy convention: every factor reports E_q[ln P(child | parents)] through
//! [`crate::FactorNode::vfe`], every categorical var reports its entropy H[q] and every
//! Dirichlet var reports -KL(q || prior). The variational free energy is minus the sum of these
//! terms, and is minimized by the updates.

use std::sync::Arc;

use ndarray::Array1;
use rayon::prelude::*;

use crate::distribution::{
    categorical_entropy, dirichlet_kl, softmax, Belief, BeliefError, Beliefs,
};
use crate::factor_graph::{FactorGraph, VarId, VarKind};
use crate::nodes::{Message, NodeError};
use crate::{Config, HopiError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    /// Number of sweeps done.
    pub iterations: usize,
    pub free_energy: f64,
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub struct VmpState {
    graph: Arc<FactorGraph>,
    beliefs: Beliefs,
    // observed value of each categorical var
    observed: Vec<Option<usize>>,
}

impl VmpState {
    pub fn new(graph: Arc<FactorGraph>) -> Self {
        let beliefs = graph.vars().map(|(_, _, v)| v.initial_belief()).collect();
        let observed = vec![None; graph.nvars()];
        Self {
            graph,
            beliefs,
            observed,
        }
    }
    pub fn graph(&self) -> &Arc<FactorGraph> {
        &self.graph
    }
    pub fn beliefs(&self) -> &Beliefs {
        &self.beliefs
    }
    pub fn belief(&self, var: VarId) -> &Belief {
        &self.beliefs[var]
    }
    fn check_belief(&self, var: VarId, belief: &Belief) -> std::result::Result<(), BeliefError> {
        let v = self.graph.var(var);
        let expected = v.kind().name();
        if belief.kind_name() != expected {
            return Err(BeliefError::WrongKind {
                got: belief.kind_name(),
                expected,
            });
        }
        if belief.nc() != v.nc() {
            return Err(BeliefError::WrongNc {
                got: belief.nc(),
                expected: v.nc(),
            });
        }
        belief.validate()
    }
    /// Overwrite the belief of `var`. Observed vars stay clamped, drop the observation first.
    pub fn set_belief(&mut self, var: VarId, belief: Belief) -> Result<()> {
        if self.observed[var].is_some() {
            return Err(HopiError::Observed(
                self.graph.var_name(var).unwrap_or_default().to_owned(),
            ));
        }
        self.check_belief(var, &belief)?;
        self.beliefs.set(var, belief);
        Ok(())
    }

    /// Clamp the categorical var `var` to `value`.
    pub fn observe(&mut self, var: VarId, value: usize) -> Result<()> {
        let v = self.graph.var(var);
        if v.kind() != VarKind::Categorical {
            return Err(HopiError::NotObservable(
                self.graph.var_name(var).unwrap_or_default().to_owned(),
            ));
        }
        if value >= v.nc() {
            return Err(HopiError::ObservationOutOfBound { value, nc: v.nc() });
        }
        let belief = Belief::one_hot(v.nc(), value)?;
        self.observed[var] = Some(value);
        self.beliefs.set(var, belief);
        Ok(())
    }
    pub fn drop_observation(&mut self, var: VarId) {
        if self.observed[var].take().is_some() {
            self.beliefs.set(var, self.graph.var(var).initial_belief());
        }
    }
    pub fn observed(&self, var: VarId) -> Option<usize> {
        self.observed[var]
    }

    /// Messages sent to `var` by all its incident factors.
    pub fn messages_to(&self, var: VarId) -> std::result::Result<Vec<Message>, NodeError> {
        self.graph
            .var(var)
            .factors()
            .map(|f| self.graph.factor(f).message(var, &self.beliefs))
            .collect()
    }

    /// Belief of `var` obtained by combining its incoming messages.
    pub fn posterior(&self, var: VarId) -> std::result::Result<Belief, NodeError> {
        if self.observed[var].is_some() {
            return Ok(self.beliefs[var].clone());
        }
        let v = self.graph.var(var);
        let messages = self.messages_to(var)?;
        Ok(match v.prior() {
            None => {
                let mut logits = Array1::zeros(v.nc());
                for m in messages.iter() {
                    logits += &m.values();
                }
                Belief::Categorical(softmax(logits.view()))
            }
            Some(prior) => {
                let mut alpha = prior.to_owned();
                for m in messages.iter() {
                    alpha += &m.values();
                }
                Belief::Dirichlet(alpha)
            }
        })
    }

    pub fn update_var(&mut self, var: VarId) -> Result<()> {
        let posterior = self.posterior(var)?;
        self.beliefs.set(var, posterior);
        Ok(())
    }

    /// Update every var once. Jacobi updates (all posteriors computed from the same beliefs,
    /// in parallel) if `parallel`, Gauss-Seidel in var order otherwise.
    pub fn sweep(&mut self, parallel: bool) -> Result<()> {
        if parallel {
            let posteriors = (0..self.graph.nvars())
                .into_par_iter()
                .map(|var| self.posterior(var))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for (var, posterior) in posteriors.into_iter().enumerate() {
                self.beliefs.set(var, posterior);
            }
        } else {
            for var in 0..self.graph.nvars() {
                self.update_var(var)?;
            }
        }
        Ok(())
    }

    /// Sum of the factor terms, E_q[ln P(child | parents)] over all factors.
    pub fn factor_terms(&self) -> std::result::Result<f64, NodeError> {
        let terms = (0..self.graph.nfactors())
            .into_par_iter()
            .map(|f| self.graph.factor(f).vfe(&self.beliefs))
            .collect::<std::result::Result<Vec<f64>, _>>()?;
        Ok(terms.iter().sum())
    }

    /// Sum of the var terms: entropies of the categorical vars, minus the KL divergences from
    /// the priors of the Dirichlet vars.
    pub fn var_terms(&self) -> std::result::Result<f64, NodeError> {
        self.graph
            .vars()
            .zip(self.beliefs.iter())
            .map(|((id, _, var), belief)| match (var.prior(), belief) {
                (None, Belief::Categorical(p)) => Ok(categorical_entropy(p.view())),
                (Some(prior), Belief::Dirichlet(alpha)) => Ok(-dirichlet_kl(alpha.view(), prior)),
                _ => Err(NodeError::WrongBeliefKind {
                    var: id,
                    got: belief.kind_name(),
                    expected: var.kind().name(),
                }),
            })
            .sum()
    }

    pub fn free_energy(&self) -> Result<f64> {
        Ok(-(self.factor_terms()? + self.var_terms()?))
    }
    /// Evidence lower bound, i.e. minus the free energy.
    pub fn elbo(&self) -> Result<f64> {
        Ok(-self.free_energy()?)
    }

    /// Sweep until the free energy changes by less than the tolerance, or the maximum number
    /// of iterations is reached.
    pub fn run(&mut self, config: &Config) -> Result<RunReport> {
        let initial = self.free_energy()?;
        crate::utils::with_sweep_progress(
            |progress| -> Result<RunReport> {
                let mut prev = initial;
                for it in 1..=config.max_iterations {
                    self.sweep(config.parallel)?;
                    let free_energy = self.free_energy()?;
                    progress.sweep_done(free_energy);
                    tracing::debug!(iteration = it, free_energy, "vmp sweep");
                    if (prev - free_energy).abs() < config.tolerance {
                        tracing::info!(iterations = it, free_energy, "vmp converged");
                        return Ok(RunReport {
                            iterations: it,
                            free_energy,
                            converged: true,
                        });
                    }
                    prev = free_energy;
                }
                tracing::warn!(
                    iterations = config.max_iterations,
                    free_energy = prev,
                    "vmp did not converge"
                );
                Ok(RunReport {
                    iterations: config.max_iterations,
                    free_energy: prev,
                    converged: false,
                })
            },
            config.max_iterations as u64,
            initial,
            config,
        )
    }
}
