//! Shared helpers for integration tests.

#![allow(dead_code)]

use rnn_lstm::{IdTensor, ModelConfig, Optimizer, Parameter};

pub const VOCAB: usize = 8;

/// Small model, fast enough for debug-build tests.
pub fn tiny_config(seed: u64) -> ModelConfig {
    ModelConfig::new(VOCAB, 6, 10).with_seed(seed)
}

/// `0, 1, ..., period - 1, 0, 1, ...` of length `len`.
pub fn cyclic_corpus(len: usize, period: usize) -> Vec<i32> {
    (0..len).map(|i| (i % period) as i32).collect()
}

pub fn ids(batch: usize, time: usize, data: &[i32]) -> IdTensor {
    IdTensor::from_vec(batch, time, data.to_vec()).expect("id grid")
}

/// Columns `from..to` of a `(batch, time)` id grid.
pub fn time_slice(xs: &IdTensor, from: usize, to: usize) -> IdTensor {
    let mut data = Vec::new();
    for b in 0..xs.batch() {
        for t in from..to {
            data.push(xs.get(b, t));
        }
    }
    IdTensor::from_vec(xs.batch(), to - from, data).expect("slice")
}

/// Plain gradient descent.
pub struct Sgd {
    pub lr: f32,
}

impl Optimizer for Sgd {
    fn update(&mut self, params: &mut [&mut Parameter]) {
        for p in params.iter_mut() {
            let (value, grad) = p.value_and_grad();
            for (w, g) in value.data_mut().iter_mut().zip(grad.data()) {
                *w -= self.lr * g;
            }
        }
    }
}
