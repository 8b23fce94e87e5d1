//! Beliefs held by variable nodes, and the closed-form quantities of the Categorical and
//! Dirichlet families that factors and the inference loop need.

use crate::factor_graph::VarId;
use ndarray::{Array1, ArrayView1, Zip};
use statrs::function::gamma::{digamma, ln_gamma};
use thiserror::Error;

type Proba = f64;

/// The minimum non-zero probability (to avoid -inf when taking logarithms).
pub(crate) const MIN_PROBA: Proba = 1e-40;

/// Accepted deviation from one for the sum of a categorical belief.
const NORM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BeliefError {
    #[error("A belief needs at least one category.")]
    Empty,
    #[error("Wrong number of categories: got {got}, expected {expected}.")]
    WrongNc { got: usize, expected: usize },
    #[error("Wrong belief kind: got {got}, expected {expected}.")]
    WrongKind {
        got: &'static str,
        expected: &'static str,
    },
    #[error("Categorical probabilities must be non-negative and sum to one (sum is {sum}).")]
    NotNormalized { sum: f64 },
    #[error("Dirichlet concentrations must be finite and strictly positive.")]
    NonPositiveConcentration,
    #[error("Value {value} out of range for {nc} categories.")]
    ValueOutOfRange { value: usize, nc: usize },
}

/// Current belief about a random variable, tagged by its distribution family.
#[derive(Debug, Clone, PartialEq)]
pub enum Belief {
    /// Probability of each category.
    Categorical(Array1<Proba>),
    /// Concentration parameters of a Dirichlet.
    Dirichlet(Array1<f64>),
}

impl Belief {
    pub fn uniform(nc: usize) -> Self {
        Self::Categorical(Array1::from_elem(nc, 1.0 / nc as f64))
    }
    /// Categorical belief certain of `value`.
    pub fn one_hot(nc: usize, value: usize) -> Result<Self, BeliefError> {
        if value >= nc {
            return Err(BeliefError::ValueOutOfRange { value, nc });
        }
        let mut p = Array1::zeros(nc);
        p[value] = 1.0;
        Ok(Self::Categorical(p))
    }
    /// Checked constructor for a categorical belief.
    pub fn categorical(probs: Array1<Proba>) -> Result<Self, BeliefError> {
        let res = Self::Categorical(probs);
        res.validate()?;
        Ok(res)
    }
    /// Checked constructor for a Dirichlet belief.
    pub fn dirichlet(alpha: Array1<f64>) -> Result<Self, BeliefError> {
        let res = Self::Dirichlet(alpha);
        res.validate()?;
        Ok(res)
    }
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Categorical(_) => "categorical",
            Self::Dirichlet(_) => "dirichlet",
        }
    }
    /// Number of categories.
    pub fn nc(&self) -> usize {
        self.values().len()
    }
    pub fn values(&self) -> ArrayView1<'_, f64> {
        match self {
            Self::Categorical(v) | Self::Dirichlet(v) => v.view(),
        }
    }
    pub fn as_categorical(&self) -> Option<ArrayView1<'_, Proba>> {
        if let Self::Categorical(p) = self {
            Some(p.view())
        } else {
            None
        }
    }
    pub fn as_dirichlet(&self) -> Option<ArrayView1<'_, f64>> {
        if let Self::Dirichlet(alpha) = self {
            Some(alpha.view())
        } else {
            None
        }
    }
    /// Check that the parameters are a valid member of the family.
    pub fn validate(&self) -> Result<(), BeliefError> {
        if self.nc() == 0 {
            return Err(BeliefError::Empty);
        }
        match self {
            Self::Categorical(p) => {
                let sum = p.sum();
                if p.iter().any(|x| !x.is_finite() || *x < 0.0)
                    || (sum - 1.0).abs() > NORM_TOLERANCE
                {
                    return Err(BeliefError::NotNormalized { sum });
                }
            }
            Self::Dirichlet(alpha) => {
                if alpha.iter().any(|a| !a.is_finite() || *a <= 0.0) {
                    return Err(BeliefError::NonPositiveConcentration);
                }
            }
        }
        Ok(())
    }
}

/// Snapshot of the beliefs of every variable of a graph, indexed by [`VarId`].
///
/// Factors only ever get a shared reference to it, hence they cannot modify a belief while
/// computing a message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Beliefs {
    values: Vec<Belief>,
}

impl Beliefs {
    pub fn new(values: Vec<Belief>) -> Self {
        Self { values }
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn get(&self, var: VarId) -> Option<&Belief> {
        self.values.get(var)
    }
    pub fn iter(&self) -> impl Iterator<Item = &Belief> {
        self.values.iter()
    }
    pub(crate) fn set(&mut self, var: VarId, belief: Belief) {
        self.values[var] = belief;
    }
}

impl std::ops::Index<VarId> for Beliefs {
    type Output = Belief;
    fn index(&self, var: VarId) -> &Belief {
        &self.values[var]
    }
}

impl FromIterator<Belief> for Beliefs {
    fn from_iter<I: IntoIterator<Item = Belief>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// E[ln d_k] for d ~ Dir(alpha): psi(alpha_k) - psi(sum(alpha)).
pub fn dirichlet_expected_log(alpha: ArrayView1<f64>) -> Array1<f64> {
    let psi_sum = digamma(alpha.sum());
    alpha.mapv(|a| digamma(a) - psi_sum)
}

/// Elementwise logarithm of a probability vector, clipped at `MIN_PROBA`.
pub fn categorical_log(p: ArrayView1<Proba>) -> Array1<f64> {
    p.mapv(|x| x.max(MIN_PROBA).ln())
}

/// Logarithm of the uniform distribution over `nc` categories.
pub fn log_uniform(nc: usize) -> Array1<f64> {
    Array1::from_elem(nc, -(nc as f64).ln())
}

/// Entropy of a categorical distribution, with 0 ln 0 = 0.
pub fn categorical_entropy(p: ArrayView1<Proba>) -> f64 {
    -p.iter()
        .filter(|x| **x > 0.0)
        .map(|x| x * x.ln())
        .sum::<f64>()
}

fn ln_beta(alpha: ArrayView1<f64>) -> f64 {
    alpha.iter().map(|a| ln_gamma(*a)).sum::<f64>() - ln_gamma(alpha.sum())
}

/// KL(Dir(q) || Dir(p)).
pub fn dirichlet_kl(q: ArrayView1<f64>, p: ArrayView1<f64>) -> f64 {
    assert_eq!(q.len(), p.len());
    let e_log = dirichlet_expected_log(q);
    let cross = Zip::from(&q)
        .and(&p)
        .and(&e_log)
        .fold(0.0, |acc, q, p, e| acc + (q - p) * e);
    ln_beta(p) - ln_beta(q) + cross
}

/// Normalized exponential, shifted by the maximum for stability.
pub fn softmax(logits: ArrayView1<f64>) -> Array1<Proba> {
    let max = logits.fold(f64::NEG_INFINITY, |m, x| m.max(*x));
    let mut res = logits.mapv(|x| (x - max).exp());
    let sum = res.sum();
    res /= sum;
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

    #[test]
    fn expected_log_uniform_prior() {
        // psi(1) - psi(3) = -(1 + 1/2)
        let e = dirichlet_expected_log(array![1.0, 1.0, 1.0].view());
        for x in e.iter() {
            assert_abs_diff_eq!(*x, -1.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn expected_log_half_integer() {
        // psi(0.5) = -gamma - 2 ln 2, psi(1.5) = psi(0.5) + 2
        let e = dirichlet_expected_log(array![0.5, 1.0].view());
        let psi_half = -EULER_GAMMA - 2.0 * 2f64.ln();
        let psi_three_half = psi_half + 2.0;
        assert_abs_diff_eq!(e[0], psi_half - psi_three_half, epsilon = 1e-10);
        assert_abs_diff_eq!(e[1], -EULER_GAMMA - psi_three_half, epsilon = 1e-10);
    }

    #[test]
    fn log_clipped() {
        let l = categorical_log(array![0.0, 1.0].view());
        assert!(l[0].is_finite());
        assert_eq!(l[1], 0.0);
    }

    #[test]
    fn entropy() {
        assert_abs_diff_eq!(
            categorical_entropy(array![0.25, 0.25, 0.25, 0.25].view()),
            4f64.ln(),
            epsilon = 1e-12
        );
        assert_eq!(categorical_entropy(array![0.0, 1.0].view()), 0.0);
    }

    #[test]
    fn kl() {
        let a = array![1.0, 2.0, 3.0];
        assert_abs_diff_eq!(dirichlet_kl(a.view(), a.view()), 0.0, epsilon = 1e-12);
        let b = array![2.0, 2.0, 2.0];
        assert!(dirichlet_kl(a.view(), b.view()) > 0.0);
        // KL(Dir(2,1) || Dir(1,1)) = ln 2 - 1/2, Beta(2,1) vs uniform on [0,1].
        assert_abs_diff_eq!(
            dirichlet_kl(array![2.0, 1.0].view(), array![1.0, 1.0].view()),
            2f64.ln() - 0.5,
            epsilon = 1e-10
        );
    }

    #[test]
    fn softmax_shift() {
        let p = softmax(array![1000.0, 1000.0].view());
        assert_abs_diff_eq!(p, array![0.5, 0.5], epsilon = 1e-12);
        let p = softmax(array![0.0, 2f64.ln()].view());
        assert_abs_diff_eq!(p, array![1.0 / 3.0, 2.0 / 3.0], epsilon = 1e-12);
    }

    #[test]
    fn validation() {
        assert!(Belief::categorical(array![0.2, 0.8]).is_ok());
        assert_eq!(
            Belief::categorical(array![0.2, 0.7]),
            Err(BeliefError::NotNormalized { sum: 0.2 + 0.7 })
        );
        assert!(Belief::categorical(array![-0.2, 1.2]).is_err());
        assert_eq!(
            Belief::dirichlet(array![1.0, 0.0]),
            Err(BeliefError::NonPositiveConcentration)
        );
        assert_eq!(
            Belief::dirichlet(Array1::zeros(0)),
            Err(BeliefError::Empty)
        );
    }

    #[test]
    fn one_hot() {
        assert_eq!(
            Belief::one_hot(3, 2),
            Ok(Belief::Categorical(array![0.0, 0.0, 1.0]))
        );
        assert_eq!(
            Belief::one_hot(3, 3),
            Err(BeliefError::ValueOutOfRange { value: 3, nc: 3 })
        );
        assert_eq!(
            Belief::one_hot(0, 0),
            Err(BeliefError::ValueOutOfRange { value: 0, nc: 0 })
        );
    }
}
