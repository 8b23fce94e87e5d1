use std::sync::Arc;

use approx::assert_abs_diff_eq;
use hopi::{Belief, Config, FactorGraph, VmpState};
use ndarray::{array, Array1};
use statrs::function::gamma::ln_gamma;

fn ln_beta(alpha: &Array1<f64>) -> f64 {
    alpha.iter().map(|a| ln_gamma(*a)).sum::<f64>() - ln_gamma(alpha.sum())
}

/// d ~ Dir(prior), one categorical child of d per entry of `obs`, all observed.
fn observed_model(prior: Array1<f64>, obs: &[usize]) -> (VmpState, usize) {
    let nc = prior.len();
    let mut g = FactorGraph::new();
    let d = g.add_dirichlet_var("d", prior).unwrap();
    let xs: Vec<_> = obs
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let x = g.add_categorical_var(format!("x{}", i), nc).unwrap();
            g.add_categorical(x, Some(d)).unwrap();
            x
        })
        .collect();
    let mut state = VmpState::new(Arc::new(g));
    for (x, v) in xs.iter().zip(obs.iter()) {
        state.observe(*x, *v).unwrap();
    }
    (state, d)
}

#[test]
fn conjugate_posterior_is_exact() {
    let prior = array![0.5, 1.0, 2.0];
    let obs = [0, 2, 2, 1, 2, 0];
    for parallel in [false, true] {
        let (mut state, d) = observed_model(prior.clone(), &obs);
        let report = state
            .run(&Config::no_progress().parallel(parallel))
            .unwrap();
        assert!(report.converged);
        let posterior = array![2.5, 2.0, 5.0];
        assert_abs_diff_eq!(
            state.belief(d).values(),
            posterior.view(),
            epsilon = 1e-12
        );
        // The mean-field posterior is exact, hence the ELBO is the log-evidence of the
        // observed sequence.
        let log_evidence = ln_beta(&posterior) - ln_beta(&prior);
        assert_abs_diff_eq!(state.elbo().unwrap(), log_evidence, epsilon = 1e-9);
        assert_abs_diff_eq!(report.free_energy, -log_evidence, epsilon = 1e-9);
    }
}

#[test]
fn latent_child_follows_parameter() {
    let mut g = FactorGraph::new();
    let d = g.add_dirichlet_var("d", array![1.0, 1.0]).unwrap();
    let mut observed = Vec::new();
    for i in 0..20 {
        let x = g.add_categorical_var(format!("x{}", i), 2).unwrap();
        g.add_categorical(x, Some(d)).unwrap();
        observed.push(x);
    }
    let z = g.add_categorical_var("z", 2).unwrap();
    g.add_categorical(z, Some(d)).unwrap();
    let mut state = VmpState::new(Arc::new(g));
    for (i, x) in observed.iter().enumerate() {
        state.observe(*x, usize::from(i % 4 == 0)).unwrap();
    }
    let report = state.run(&Config::no_progress()).unwrap();
    assert!(report.converged);
    let q = state.belief(z).as_categorical().unwrap().to_owned();
    // 15 zeros against 5 ones.
    assert!(q[0] > 0.65);
    let alpha = state.belief(d).values().to_owned();
    assert_abs_diff_eq!(alpha.sum(), 2.0 + 21.0, epsilon = 1e-9);
    assert_abs_diff_eq!(alpha[0], 1.0 + 15.0 + q[0], epsilon = 1e-4);
}

#[test]
fn fixed_parameter_prior() {
    let mut g = FactorGraph::new();
    let x = g.add_categorical_var("x", 3).unwrap();
    let probs = array![0.7, 0.2, 0.1];
    g.add_categorical_fixed(x, probs.clone()).unwrap();
    let mut state = VmpState::new(Arc::new(g));
    state.run(&Config::no_progress()).unwrap();
    assert_abs_diff_eq!(
        state.belief(x).values(),
        probs.view(),
        epsilon = 1e-12
    );
    assert_abs_diff_eq!(state.free_energy().unwrap(), 0.0, epsilon = 1e-12);
    state.observe(x, 1).unwrap();
    assert_abs_diff_eq!(state.elbo().unwrap(), 0.2f64.ln(), epsilon = 1e-12);
    assert_eq!(state.posterior(x), Ok(Belief::one_hot(3, 1).unwrap()));
}
