use ndarray::{Array1, ArrayView1};

use super::{categorical_belief, dirichlet_belief, Message, NodeError};
use crate::distribution::{categorical_log, dirichlet_expected_log, log_uniform, Beliefs};
use crate::factor_graph::VarId;

/// Parameter of a categorical factor.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Random parameter vector, held by a Dirichlet var.
    Dirichlet(VarId),
    /// Fixed parameter vector, stored as log-probabilities.
    Fixed(Array1<f64>),
}

/// Factor P(child | d): the child is categorical with parameter d, d is either a Dirichlet var
/// or a fixed probability vector.
#[derive(Debug, Clone)]
pub struct CategoricalNode {
    child: VarId,
    param: Param,
    nc: usize,
}

impl CategoricalNode {
    /// P(child) with a uniform parameter over `nc` categories.
    pub fn new(child: VarId, nc: usize) -> Self {
        Self {
            child,
            param: Param::Fixed(log_uniform(nc)),
            nc,
        }
    }
    /// P(child | d) with d ~ Dirichlet held by var `param`.
    pub fn with_dirichlet(child: VarId, param: VarId, nc: usize) -> Self {
        Self {
            child,
            param: Param::Dirichlet(param),
            nc,
        }
    }
    /// P(child) with the fixed parameter `probs`.
    pub fn with_fixed(child: VarId, probs: ArrayView1<f64>) -> Self {
        Self {
            child,
            param: Param::Fixed(categorical_log(probs)),
            nc: probs.len(),
        }
    }

    pub fn child(&self) -> VarId {
        self.child
    }
    pub fn param(&self) -> &Param {
        &self.param
    }
    /// Number of categories.
    pub fn nc(&self) -> usize {
        self.nc
    }
    pub fn parents(&self) -> &[VarId] {
        match &self.param {
            Param::Dirichlet(d) => std::slice::from_ref(d),
            Param::Fixed(_) => &[],
        }
    }

    pub fn message(&self, to: VarId, beliefs: &Beliefs) -> Result<Message, NodeError> {
        if to == self.child {
            self.child_message(beliefs)
        } else if matches!(self.param, Param::Dirichlet(d) if d == to) {
            self.d_message(beliefs)
        } else {
            Err(NodeError::InvalidTarget { target: to })
        }
    }

    /// E_q[ln P(child | d)] = sum_k q(child = k) E[ln d_k].
    pub fn vfe(&self, beliefs: &Beliefs) -> Result<f64, NodeError> {
        let q = categorical_belief(beliefs, self.child, self.nc)?;
        Ok(q.dot(&self.log_d(beliefs)?))
    }

    /// Expected logarithm of the parameter if it is a Dirichlet var, logarithm of the fixed
    /// parameter otherwise.
    pub fn log_d(&self, beliefs: &Beliefs) -> Result<Array1<f64>, NodeError> {
        match &self.param {
            Param::Dirichlet(d) => Ok(dirichlet_expected_log(dirichlet_belief(
                beliefs, *d, self.nc,
            )?)),
            Param::Fixed(log_d) => Ok(log_d.clone()),
        }
    }

    fn child_message(&self, beliefs: &Beliefs) -> Result<Message, NodeError> {
        Ok(Message::LogProbabilities(self.log_d(beliefs)?))
    }

    fn d_message(&self, beliefs: &Beliefs) -> Result<Message, NodeError> {
        match self.param {
            Param::Dirichlet(_) => {
                let q = categorical_belief(beliefs, self.child, self.nc)?;
                Ok(Message::PseudoCounts(q.to_owned()))
            }
            Param::Fixed(_) => Err(NodeError::NoParent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Belief;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn no_parent() {
        let node = CategoricalNode::new(0, 3);
        let beliefs = Beliefs::new(vec![Belief::categorical(array![0.2, 0.3, 0.5]).unwrap()]);
        assert!(node.parents().is_empty());
        assert_eq!(node.d_message(&beliefs), Err(NodeError::NoParent));
        assert_eq!(
            node.message(1, &beliefs),
            Err(NodeError::InvalidTarget { target: 1 })
        );
        assert_abs_diff_eq!(node.vfe(&beliefs).unwrap(), -(3f64.ln()), epsilon = 1e-12);
    }

    #[test]
    fn fixed_param() {
        let node = CategoricalNode::with_fixed(0, array![0.5, 0.25, 0.25].view());
        let beliefs = Beliefs::new(vec![Belief::one_hot(3, 1).unwrap()]);
        assert_abs_diff_eq!(
            node.message(0, &beliefs).unwrap().into_values(),
            array![0.5f64.ln(), 0.25f64.ln(), 0.25f64.ln()],
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(node.vfe(&beliefs).unwrap(), 0.25f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn dirichlet_messages() {
        let node = CategoricalNode::with_dirichlet(0, 1, 2);
        let beliefs = Beliefs::new(vec![
            Belief::categorical(array![0.1, 0.9]).unwrap(),
            Belief::Dirichlet(array![1.0, 1.0]),
        ]);
        assert_eq!(node.parents(), &[1]);
        assert_eq!(
            node.message(1, &beliefs),
            Ok(Message::PseudoCounts(array![0.1, 0.9]))
        );
        // psi(1) - psi(2) = -1
        assert_abs_diff_eq!(
            node.message(0, &beliefs).unwrap().into_values(),
            array![-1.0, -1.0],
            epsilon = 1e-12
        );
    }

    #[test]
    fn wrong_beliefs() {
        let node = CategoricalNode::with_dirichlet(0, 1, 2);
        let swapped = Beliefs::new(vec![
            Belief::Dirichlet(array![1.0, 1.0]),
            Belief::uniform(2),
        ]);
        assert_eq!(
            node.vfe(&swapped),
            Err(NodeError::WrongBeliefKind {
                var: 0,
                got: "dirichlet",
                expected: "categorical"
            })
        );
        let short = Beliefs::new(vec![Belief::uniform(2), Belief::Dirichlet(array![1.0])]);
        assert_eq!(
            node.message(0, &short),
            Err(NodeError::Shape {
                var: 1,
                expected: 2,
                got: 1
            })
        );
        assert_eq!(
            node.message(0, &Beliefs::new(vec![Belief::uniform(2)])),
            Err(NodeError::MissingBelief(1))
        );
    }
}
