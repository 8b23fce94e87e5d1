//! Variational message passing on factor graphs.
//!
//! A graph is made of random-variable nodes (Categorical or Dirichlet) and factor nodes that
//! link them. Factors compute messages toward their neighbors and report their contribution to
//! the variational free energy; [`vmp::VmpState`] drives the updates.

pub mod distribution;
pub mod factor_graph;
pub mod nodes;
pub(crate) mod utils;
pub mod vmp;

pub use distribution::{Belief, BeliefError, Beliefs};
pub use factor_graph::{FactorGraph, FactorId, GraphBuildError, VarId, VarKind};
pub use nodes::{CategoricalNode, FactorNode, Message, NodeError, Param};
pub use vmp::{RunReport, VmpState};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HopiError>;

#[derive(Error, Debug)]
pub enum HopiError {
    #[error("Invalid graph: {0}")]
    GraphBuild(#[from] GraphBuildError),
    #[error("Factor error: {0}")]
    Node(#[from] NodeError),
    #[error("Invalid belief: {0}")]
    Belief(#[from] BeliefError),
    #[error("Variable {0} is not categorical, it cannot be observed.")]
    NotObservable(String),
    #[error("Observed value {value} out of range for variable with {nc} categories.")]
    ObservationOutOfBound { value: usize, nc: usize },
    #[error("Variable {0} is observed, its belief cannot be overwritten.")]
    Observed(String),
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Computation time after which a progress bar is displayed.
    /// This avoids showing progress bars for negligible amounts of time.
    progress_min_time: std::time::Duration,
    show_progress: bool,
    /// Maximum number of sweeps over the graph.
    max_iterations: usize,
    /// Stop when the free energy moves by less than this between two sweeps.
    tolerance: f64,
    /// Jacobi (parallel) updates instead of Gauss-Seidel.
    parallel: bool,
}

impl Config {
    pub fn with_default_timing() -> Self {
        Self {
            progress_min_time: std::time::Duration::from_millis(500),
            show_progress: true,
            max_iterations: 100,
            tolerance: 1e-9,
            parallel: false,
        }
    }
    pub fn no_progress() -> Self {
        Self {
            show_progress: false,
            ..Self::with_default_timing()
        }
    }
    pub fn progress_min_time(mut self, t: std::time::Duration) -> Self {
        self.progress_min_time = t;
        self
    }
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }
    pub fn tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_default_timing()
    }
}
