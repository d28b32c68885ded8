//! Dense row-major tensors: `f32` activations/weights and `i32` token ids.

use crate::error::{LmError, Result};
use crate::ops::sum_squares;

#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Tensor { shape: shape.to_vec(), data: vec![0.0; len] }
    }

    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let len: usize = shape.iter().product();
        if len != data.len() {
            return Err(LmError::shape("Tensor::from_vec", len, data.len()));
        }
        Ok(Tensor { shape: shape.to_vec(), data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// `(batch, time, dim)` of a rank-3 tensor.
    pub fn dims3(&self, context: &'static str) -> Result<(usize, usize, usize)> {
        match *self.shape.as_slice() {
            [n, t, d] => Ok((n, t, d)),
            _ => Err(LmError::shape(context, "(batch, time, dim)", &self.shape)),
        }
    }

    pub fn reshape(self, shape: &[usize]) -> Result<Self> {
        Tensor::from_vec(shape, self.data)
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    pub fn sum_squares(&self) -> f64 {
        sum_squares(&self.data)
    }

    pub(crate) fn expect_shape(&self, context: &'static str, shape: &[usize]) -> Result<()> {
        if self.shape != shape {
            return Err(LmError::shape(context, shape, &self.shape));
        }
        Ok(())
    }
}

/// A `(batch, time)` grid of token ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdTensor {
    batch: usize,
    time: usize,
    data: Vec<i32>,
}

impl IdTensor {
    pub fn from_vec(batch: usize, time: usize, data: Vec<i32>) -> Result<Self> {
        if batch * time != data.len() {
            return Err(LmError::shape("IdTensor::from_vec", (batch, time), data.len()));
        }
        Ok(IdTensor { batch, time, data })
    }

    pub fn zeros(batch: usize, time: usize) -> Self {
        IdTensor { batch, time, data: vec![0; batch * time] }
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn time(&self) -> usize {
        self.time
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.batch, self.time)
    }

    pub fn get(&self, b: usize, t: usize) -> i32 {
        self.data[b * self.time + t]
    }

    pub fn set(&mut self, b: usize, t: usize, id: i32) {
        self.data[b * self.time + t] = id;
    }

    pub fn data(&self) -> &[i32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
