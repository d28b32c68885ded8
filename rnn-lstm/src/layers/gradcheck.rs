//! Central-difference gradient checks shared by the layer tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Layer;
use crate::tensor::Tensor;

pub(crate) const STEP: f32 = 1e-2;

pub(crate) fn uniform(shape: &[usize], seed: u64) -> Tensor {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut t = Tensor::zeros(shape);
    for x in t.data_mut() {
        *x = rng.gen_range(-1.0..1.0);
    }
    t
}

/// `sum(out * weights)`: a scalar whose gradient w.r.t. `out` is `weights`.
pub(crate) fn weighted_sum(out: &Tensor, weights: &Tensor) -> f64 {
    out.data().iter().zip(weights.data()).map(|(&o, &w)| o as f64 * w as f64).sum()
}

pub(crate) fn assert_grad_close(analytic: f32, numeric: f64, what: &str) {
    let analytic = analytic as f64;
    let tol = 1e-4 + 1e-3 * analytic.abs().max(numeric.abs());
    assert!(
        (analytic - numeric).abs() <= tol,
        "{what}: analytic {analytic:.6} vs numeric {numeric:.6}"
    );
}

/// Checks every element of every parameter against `analytic`, which must be
/// a snapshot of the gradients taken right after backward.
pub(crate) fn check_params<L: Layer>(
    layer: &mut L,
    analytic: &[Tensor],
    mut loss: impl FnMut(&mut L) -> f64,
) {
    for (p, expected) in analytic.iter().enumerate() {
        let name = layer.params()[p].name().to_string();
        for k in 0..expected.len() {
            let orig = layer.params()[p].value().data()[k];
            layer.params_mut()[p].value_mut().data_mut()[k] = orig + STEP;
            let plus = loss(layer);
            layer.params_mut()[p].value_mut().data_mut()[k] = orig - STEP;
            let minus = loss(layer);
            layer.params_mut()[p].value_mut().data_mut()[k] = orig;
            let numeric = (plus - minus) / (2.0 * STEP as f64);
            assert_grad_close(expected.data()[k], numeric, &format!("{name}[{k}]"));
        }
    }
}

/// Checks the gradient w.r.t. a float input.
pub(crate) fn check_input(input: &Tensor, analytic: &Tensor, mut loss: impl FnMut(Tensor) -> f64) {
    assert_eq!(input.shape(), analytic.shape());
    for k in 0..input.len() {
        let mut plus = input.clone();
        plus.data_mut()[k] += STEP;
        let mut minus = input.clone();
        minus.data_mut()[k] -= STEP;
        let numeric = (loss(plus) - loss(minus)) / (2.0 * STEP as f64);
        assert_grad_close(analytic.data()[k], numeric, &format!("input[{k}]"));
    }
}

pub(crate) fn grads_of<L: Layer>(layer: &L) -> Vec<Tensor> {
    layer.params().iter().map(|p| p.grad().clone()).collect()
}
