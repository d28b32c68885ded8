//! Gradient clipping and the boundary an update rule plugs into.

use crate::ops::vec_scale_inplace;
use crate::param::Parameter;
use crate::tensor::Tensor;

const CLIP_EPS: f64 = 1e-6;

/// An update rule applied in place to the model's flat parameter list.
///
/// The list always arrives in the model's construction order, so per-slot
/// state (moments, velocities) can be kept by index.
pub trait Optimizer {
    fn update(&mut self, params: &mut [&mut Parameter]);
}

/// Joint L2 norm of all gradients, accumulated in f64.
pub fn grad_norm(grads: &[&mut Tensor]) -> f32 {
    grads.iter().map(|g| g.sum_squares()).sum::<f64>().sqrt() as f32
}

/// Rescales `grads` as one vector so its L2 norm is at most `max_norm`.
///
/// Returns the norm before clipping. Tensors are untouched when the norm
/// is already below the bound.
pub fn clip_grads(grads: &mut [&mut Tensor], max_norm: f32) -> f32 {
    let total = grads.iter().map(|g| g.sum_squares()).sum::<f64>().sqrt();
    if total >= max_norm as f64 {
        let rate = (max_norm as f64 / (total + CLIP_EPS)) as f32;
        for g in grads.iter_mut() {
            vec_scale_inplace(g.data_mut(), rate);
        }
    }
    total as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn large_gradients_are_scaled_jointly() {
        let mut a = Tensor::from_vec(&[2], vec![3.0, 0.0]).unwrap();
        let mut b = Tensor::from_vec(&[1, 1], vec![4.0]).unwrap();
        let mut grads = vec![&mut a, &mut b];
        let before = clip_grads(&mut grads, 1.0);
        assert_relative_eq!(before, 5.0);
        assert_relative_eq!(grad_norm(&grads), 1.0, max_relative = 1e-5);
        // direction is preserved across tensors
        assert_relative_eq!(a.data()[0] / b.data()[0], 0.75, max_relative = 1e-6);
    }

    #[test]
    fn small_gradients_are_untouched() {
        let mut a = Tensor::from_vec(&[3], vec![0.1, -0.2, 0.05]).unwrap();
        let orig = a.clone();
        let before = clip_grads(&mut [&mut a], 1.0);
        assert!(before < 1.0);
        assert_eq!(a, orig);
    }

    #[test]
    fn zero_gradients_stay_zero() {
        let mut a = Tensor::zeros(&[4]);
        assert_eq!(clip_grads(&mut [&mut a], 0.25), 0.0);
        assert!(a.data().iter().all(|&g| g == 0.0));
    }
}
