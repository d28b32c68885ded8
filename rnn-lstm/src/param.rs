// ============================================================================
// PARAMETERS
// A weight tensor and its gradient travel together; they cannot drift apart.
// ============================================================================

use rand::Rng;
use rand_distr::StandardNormal;

use crate::tensor::Tensor;

#[derive(Clone, Debug)]
pub struct Parameter {
    name: String,
    value: Tensor,
    grad: Tensor,
}

impl Parameter {
    /// Wraps `value` with a zeroed gradient of the same shape.
    pub fn new(name: impl Into<String>, value: Tensor) -> Self {
        let grad = Tensor::zeros(value.shape());
        Parameter { name: name.into(), value, grad }
    }

    /// Debug label only; persistence is positional.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    pub fn value(&self) -> &Tensor {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Tensor {
        &mut self.value
    }

    pub fn grad(&self) -> &Tensor {
        &self.grad
    }

    pub fn grad_mut(&mut self) -> &mut Tensor {
        &mut self.grad
    }

    /// Value and gradient at once, for optimizers.
    pub fn value_and_grad(&mut self) -> (&mut Tensor, &Tensor) {
        (&mut self.value, &self.grad)
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Replaces the gradient wholesale; backward passes overwrite, not add.
    pub(crate) fn set_grad(&mut self, data: &[f32]) {
        self.grad.data_mut().copy_from_slice(data);
    }
}

/// Gaussian tensor with standard deviation `scale`.
pub fn rand_normal(shape: &[usize], scale: f32, rng: &mut impl Rng) -> Tensor {
    let mut t = Tensor::zeros(shape);
    for x in t.data_mut() {
        let z: f32 = rng.sample(StandardNormal);
        *x = z * scale;
    }
    t
}
