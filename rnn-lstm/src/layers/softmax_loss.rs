use rayon::prelude::*;

use super::{Layer, Mode};
use crate::config::Backend;
use crate::error::{LmError, Result};
use crate::ops::{vec_max, vec_scale_inplace};
use crate::param::Parameter;
use crate::tensor::{IdTensor, Tensor};

#[derive(Debug)]
struct SoftmaxCache {
    shape: Vec<usize>,
    /// Row-wise softmax, `(N*T, V)`.
    probs: Vec<f32>,
    /// Target column per row, `None` where ignored.
    targets: Vec<Option<usize>>,
    valid: usize,
}

/// Mean cross-entropy of per-timestep scores against target ids.
#[derive(Debug, Default)]
pub struct TimeSoftmaxWithLoss {
    ignore_label: Option<i32>,
    backend: Backend,
    cache: Option<SoftmaxCache>,
}

/// Softmax of `row` in place; returns `-log p[target]` computed via log-sum-exp.
#[inline]
fn softmax_row(row: &mut [f32], target: Option<usize>) -> f64 {
    let max = vec_max(row);
    let shifted_target = target.map(|k| row[k] - max);
    let mut sum = 0.0f32;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }
    vec_scale_inplace(row, 1.0 / sum);
    // log p[k] = (s[k] - max) - ln(sum)
    shifted_target.map_or(0.0, |s| sum.ln() as f64 - s as f64)
}

impl TimeSoftmaxWithLoss {
    pub fn new(ignore_label: Option<i32>, backend: Backend) -> Self {
        TimeSoftmaxWithLoss { ignore_label, backend, cache: None }
    }

    pub fn ignore_label(&self) -> Option<i32> {
        self.ignore_label
    }

    /// Drops the cached probabilities so the next backward fails.
    pub fn clear_cache(&mut self) {
        self.cache = None;
    }

    /// Checks target ids without computing anything.
    pub fn check_targets(&self, ts: &IdTensor, vocab: usize) -> Result<()> {
        self.resolve_targets(ts, vocab).map(drop)
    }

    fn resolve_targets(&self, ts: &IdTensor, vocab: usize) -> Result<Vec<Option<usize>>> {
        ts.data()
            .iter()
            .map(|&id| {
                if Some(id) == self.ignore_label {
                    Ok(None)
                } else if id < 0 || id as usize >= vocab {
                    Err(LmError::OutOfVocabulary { id, vocab_size: vocab })
                } else {
                    Ok(Some(id as usize))
                }
            })
            .collect()
    }
}

impl Layer for TimeSoftmaxWithLoss {
    type Input = (Tensor, IdTensor);
    type Output = f32;
    /// Upstream scalar gradient, normally 1.
    type OutputGrad = f32;
    type InputGrad = Tensor;

    fn forward(&mut self, (scores, ts): (Tensor, IdTensor), mode: Mode) -> Result<f32> {
        self.cache = None;
        let (n, t, v) = scores.dims3("TimeSoftmaxWithLoss::forward")?;
        if v == 0 {
            return Err(LmError::shape("TimeSoftmaxWithLoss::forward", (n, t, "vocab > 0"), scores.shape()));
        }
        if ts.dims() != (n, t) {
            return Err(LmError::shape("TimeSoftmaxWithLoss targets", (n, t), ts.dims()));
        }
        let targets = self.resolve_targets(&ts, v)?;
        let valid = targets.iter().filter(|k| k.is_some()).count();
        let shape = scores.shape().to_vec();
        let mut probs = scores.into_vec();

        let total: f64 = match self.backend {
            Backend::Serial => probs
                .chunks_mut(v)
                .zip(&targets)
                .map(|(row, &k)| softmax_row(row, k))
                .sum(),
            Backend::Parallel => probs
                .par_chunks_mut(v)
                .zip(targets.par_iter())
                .map(|(row, &k)| softmax_row(row, k))
                .sum(),
        };

        let loss = if valid == 0 { 0.0 } else { (total / valid as f64) as f32 };
        self.cache = if mode.is_train() {
            Some(SoftmaxCache { shape, probs, targets, valid })
        } else {
            None
        };
        Ok(loss)
    }

    fn backward(&mut self, dout: f32) -> Result<Tensor> {
        let cache = self.cache.as_ref().ok_or(LmError::MissingCache("TimeSoftmaxWithLoss"))?;
        let v = cache.shape[2];
        let mut dx = cache.probs.clone();
        let scale = if cache.valid == 0 { 0.0 } else { dout / cache.valid as f32 };
        for (row, target) in dx.chunks_mut(v).zip(&cache.targets) {
            match *target {
                Some(k) => {
                    row[k] -= 1.0;
                    vec_scale_inplace(row, scale);
                }
                None => row.fill(0.0),
            }
        }
        Tensor::from_vec(&cache.shape, dx)
    }

    fn params(&self) -> &[Parameter] {
        &[]
    }

    fn params_mut(&mut self) -> &mut [Parameter] {
        &mut []
    }
}
