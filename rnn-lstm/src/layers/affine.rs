use super::{Layer, Mode};
use crate::error::{LmError, Result};
use crate::ops::{add_row_sums, sgemm, Layout};
use crate::param::Parameter;
use crate::tensor::Tensor;

const W: usize = 0;
const B: usize = 1;

/// Shared projection applied at every timestep: `(N, T, H) -> (N, T, V)`.
///
/// Batch and time fold into one `N*T` row axis, so each pass is a single gemm.
#[derive(Debug)]
pub struct TimeAffine {
    params: Vec<Parameter>,
    in_dim: usize,
    out_dim: usize,
    xs: Option<Tensor>,
}

impl TimeAffine {
    /// `w: (H, V)`, `b: (V)`.
    pub fn new(w: Tensor, b: Tensor) -> Result<Self> {
        let (in_dim, out_dim) = match *w.shape() {
            [h, v] if h > 0 && v > 0 => (h, v),
            _ => return Err(LmError::shape("TimeAffine::new W", "(H, V)", w.shape())),
        };
        b.expect_shape("TimeAffine::new b", &[out_dim])?;
        Ok(TimeAffine {
            params: vec![Parameter::new("affine.W", w), Parameter::new("affine.b", b)],
            in_dim,
            out_dim,
            xs: None,
        })
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }
}

impl Layer for TimeAffine {
    type Input = Tensor;
    type Output = Tensor;
    type OutputGrad = Tensor;
    type InputGrad = Tensor;

    fn forward(&mut self, xs: Tensor, mode: Mode) -> Result<Tensor> {
        self.xs = None;
        let (n, t, h) = xs.dims3("TimeAffine::forward")?;
        if h != self.in_dim {
            return Err(LmError::shape("TimeAffine::forward", (n, t, self.in_dim), xs.shape()));
        }
        let (rows, v) = (n * t, self.out_dim);
        let bias = self.params[B].value().data();
        let mut out = Vec::with_capacity(rows * v);
        for _ in 0..rows {
            out.extend_from_slice(bias);
        }
        sgemm(
            rows, h, v, 1.0,
            xs.data(), Layout::row_major(h),
            self.params[W].value().data(), Layout::row_major(v),
            1.0, &mut out, Layout::row_major(v),
        );
        self.xs = if mode.is_train() { Some(xs) } else { None };
        Tensor::from_vec(&[n, t, v], out)
    }

    fn backward(&mut self, dout: Tensor) -> Result<Tensor> {
        let xs = self.xs.as_ref().ok_or(LmError::MissingCache("TimeAffine"))?;
        let (n, t, h) = xs.dims3("TimeAffine cache")?;
        let (rows, v) = (n * t, self.out_dim);
        dout.expect_shape("TimeAffine::backward", &[n, t, v])?;

        let mut dx = vec![0.0f32; rows * h];
        sgemm(
            rows, v, h, 1.0,
            dout.data(), Layout::row_major(v),
            self.params[W].value().data(), Layout::transposed(v),
            0.0, &mut dx, Layout::row_major(h),
        );
        let mut dw = vec![0.0f32; h * v];
        sgemm(
            h, rows, v, 1.0,
            xs.data(), Layout::transposed(h),
            dout.data(), Layout::row_major(v),
            0.0, &mut dw, Layout::row_major(v),
        );
        let mut db = vec![0.0f32; v];
        add_row_sums(&mut db, dout.data(), v);

        self.params[W].set_grad(&dw);
        self.params[B].set_grad(&db);
        Tensor::from_vec(&[n, t, h], dx)
    }

    fn params(&self) -> &[Parameter] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }
}
