// ============================================================================
// TIME LSTM
// One LSTM cell unrolled over the time axis, batch-major (batch, time, dim).
// Fused gate layout along the 4H axis: [forget | input | output | candidate].
// ============================================================================

use rayon::prelude::*;

use super::{Layer, Mode};
use crate::config::Backend;
use crate::error::{LmError, Result};
use crate::ops::{add_row_sums, sgemm, sigmoid, Layout};
use crate::param::Parameter;
use crate::tensor::Tensor;

const WX: usize = 0;
const WH: usize = 1;
const B: usize = 2;

/// Hidden and cell vectors, each `(batch, hidden)`.
#[derive(Clone, Debug, PartialEq)]
pub struct RecurrentState {
    pub h: Tensor,
    pub c: Tensor,
}

/// Activations of one timestep kept for backward.
#[derive(Debug)]
struct StepCache {
    h_prev: Vec<f32>,
    c_prev: Vec<f32>,
    c_next: Vec<f32>,
    /// Activated gates, `(batch, 4H)`.
    gates: Vec<f32>,
}

#[derive(Debug)]
struct LstmCache {
    xs: Tensor,
    steps: Vec<StepCache>,
}

#[derive(Debug)]
pub struct TimeLstm {
    params: Vec<Parameter>,
    input_dim: usize,
    hidden_dim: usize,
    stateful: bool,
    backend: Backend,
    state: Option<RecurrentState>,
    cache: Option<LstmCache>,
    dh0: Option<Tensor>,
}

impl TimeLstm {
    /// `wx: (D, 4H)`, `wh: (H, 4H)`, `b: (4H)`.
    pub fn new(wx: Tensor, wh: Tensor, b: Tensor, stateful: bool, backend: Backend) -> Result<Self> {
        let hidden_dim = match *wh.shape() {
            [h, h4] if h > 0 && h4 == 4 * h => h,
            _ => return Err(LmError::shape("TimeLstm::new Wh", "(H, 4H)", wh.shape())),
        };
        let input_dim = match *wx.shape() {
            [d, h4] if d > 0 && h4 == 4 * hidden_dim => d,
            _ => return Err(LmError::shape("TimeLstm::new Wx", ("D", 4 * hidden_dim), wx.shape())),
        };
        b.expect_shape("TimeLstm::new b", &[4 * hidden_dim])?;
        Ok(TimeLstm {
            params: vec![
                Parameter::new("lstm.Wx", wx),
                Parameter::new("lstm.Wh", wh),
                Parameter::new("lstm.b", b),
            ],
            input_dim,
            hidden_dim,
            stateful,
            backend,
            state: None,
            cache: None,
            dh0: None,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    pub fn is_stateful(&self) -> bool {
        self.stateful
    }

    pub fn state(&self) -> Option<&RecurrentState> {
        self.state.as_ref()
    }

    /// Forget carried context; the next forward starts from zeros.
    ///
    /// Must be called between unrelated streams; nothing detects a missing reset.
    pub fn reset_state(&mut self) {
        self.state = None;
    }

    /// Seeds the state the next stateful forward starts from.
    pub fn set_state(&mut self, h: Tensor, c: Tensor) -> Result<()> {
        let n = match *h.shape() {
            [n, hd] if hd == self.hidden_dim => n,
            _ => return Err(LmError::shape("TimeLstm::set_state h", ("batch", self.hidden_dim), h.shape())),
        };
        c.expect_shape("TimeLstm::set_state c", &[n, self.hidden_dim])?;
        self.state = Some(RecurrentState { h, c });
        Ok(())
    }

    /// Gradient w.r.t. the initial hidden state from the last backward.
    /// Truncated BPTT drops it; it is exposed for callers that chain models.
    pub fn carried_hidden_grad(&self) -> Option<&Tensor> {
        self.dh0.as_ref()
    }

    fn initial_state(&self, n: usize) -> Result<(Vec<f32>, Vec<f32>)> {
        let hd = self.hidden_dim;
        match (&self.state, self.stateful) {
            (Some(s), true) => {
                s.h.expect_shape("TimeLstm carried state", &[n, hd])?;
                Ok((s.h.data().to_vec(), s.c.data().to_vec()))
            }
            _ => Ok((vec![0.0; n * hd], vec![0.0; n * hd])),
        }
    }
}

/// Activates one row of fused pre-activations in place and advances the cell.
#[inline]
fn cell_forward_row(gates: &mut [f32], bias: &[f32], c_prev: &[f32], c_next: &mut [f32], h_next: &mut [f32]) {
    let hd = c_prev.len();
    for (g, b) in gates.iter_mut().zip(bias) {
        *g += b;
    }
    let (sig, cand) = gates.split_at_mut(3 * hd);
    sig.iter_mut().for_each(|g| *g = sigmoid(*g));
    cand.iter_mut().for_each(|g| *g = g.tanh());
    for j in 0..hd {
        let (f, i, o, g) = (sig[j], sig[hd + j], sig[2 * hd + j], cand[j]);
        let c = f * c_prev[j] + i * g;
        c_next[j] = c;
        h_next[j] = o * c.tanh();
    }
}

/// Gate pre-activation gradients for one row. `dc` enters as the gradient
/// w.r.t. this step's cell and leaves as the gradient w.r.t. the previous one.
#[inline]
fn cell_backward_row(gates: &[f32], c_prev: &[f32], c_next: &[f32], dh_out: &[f32], dh_carry: &[f32], dc: &mut [f32], da: &mut [f32]) {
    let hd = c_prev.len();
    for j in 0..hd {
        let (f, i, o, g) = (gates[j], gates[hd + j], gates[2 * hd + j], gates[3 * hd + j]);
        let dh = dh_out[j] + dh_carry[j];
        let tc = c_next[j].tanh();
        let ds = dc[j] + dh * o * (1.0 - tc * tc);
        dc[j] = ds * f;
        da[j] = ds * c_prev[j] * f * (1.0 - f);
        da[hd + j] = ds * g * i * (1.0 - i);
        da[2 * hd + j] = dh * tc * o * (1.0 - o);
        da[3 * hd + j] = ds * i * (1.0 - g * g);
    }
}

impl Layer for TimeLstm {
    type Input = Tensor;
    type Output = Tensor;
    type OutputGrad = Tensor;
    type InputGrad = Tensor;

    fn forward(&mut self, xs: Tensor, mode: Mode) -> Result<Tensor> {
        self.cache = None;
        let (n, t_len, d) = xs.dims3("TimeLstm::forward")?;
        if d != self.input_dim {
            return Err(LmError::shape("TimeLstm::forward", (n, t_len, self.input_dim), xs.shape()));
        }
        let hd = self.hidden_dim;
        let h4 = 4 * hd;
        let (mut h, mut c) = self.initial_state(n)?;
        let wx = self.params[WX].value().data();
        let wh = self.params[WH].value().data();
        let bias = self.params[B].value().data();

        let mut hs = vec![0.0f32; n * t_len * hd];
        let mut steps = Vec::with_capacity(if mode.is_train() { t_len } else { 0 });

        for t in 0..t_len {
            // a = x_t @ Wx + h_{t-1} @ Wh   (bias added per row)
            let mut a = vec![0.0f32; n * h4];
            let lx = Layout { offset: t * d, row_stride: t_len * d, col_stride: 1 };
            sgemm(n, d, h4, 1.0, xs.data(), lx, wx, Layout::row_major(h4), 0.0, &mut a, Layout::row_major(h4));
            sgemm(n, hd, h4, 1.0, &h, Layout::row_major(hd), wh, Layout::row_major(h4), 1.0, &mut a, Layout::row_major(h4));

            let mut c_next = vec![0.0f32; n * hd];
            let mut h_next = vec![0.0f32; n * hd];
            match self.backend {
                Backend::Serial => {
                    for (((g, cp), cn), hn) in a.chunks_mut(h4).zip(c.chunks(hd)).zip(c_next.chunks_mut(hd)).zip(h_next.chunks_mut(hd)) {
                        cell_forward_row(g, bias, cp, cn, hn);
                    }
                }
                Backend::Parallel => {
                    a.par_chunks_mut(h4)
                        .zip(c.par_chunks(hd))
                        .zip(c_next.par_chunks_mut(hd))
                        .zip(h_next.par_chunks_mut(hd))
                        .for_each(|(((g, cp), cn), hn)| cell_forward_row(g, bias, cp, cn, hn));
                }
            }

            for (r, row) in h_next.chunks(hd).enumerate() {
                let off = (r * t_len + t) * hd;
                hs[off..off + hd].copy_from_slice(row);
            }

            let h_prev = std::mem::replace(&mut h, h_next);
            let c_prev = std::mem::replace(&mut c, c_next);
            if mode.is_train() {
                steps.push(StepCache { h_prev, c_prev, c_next: c.clone(), gates: a });
            }
        }

        if self.stateful {
            self.state = Some(RecurrentState {
                h: Tensor::from_vec(&[n, hd], h)?,
                c: Tensor::from_vec(&[n, hd], c)?,
            });
        }
        self.cache = if mode.is_train() { Some(LstmCache { xs, steps }) } else { None };
        Tensor::from_vec(&[n, t_len, hd], hs)
    }

    fn backward(&mut self, dhs: Tensor) -> Result<Tensor> {
        let cache = self.cache.as_ref().ok_or(LmError::MissingCache("TimeLstm"))?;
        let (n, t_len, d) = cache.xs.dims3("TimeLstm cache")?;
        let hd = self.hidden_dim;
        let h4 = 4 * hd;
        dhs.expect_shape("TimeLstm::backward", &[n, t_len, hd])?;

        let wx = self.params[WX].value().data();
        let wh = self.params[WH].value().data();
        let x = cache.xs.data();
        let dh_out = dhs.data();

        let mut dxs = vec![0.0f32; n * t_len * d];
        let mut dwx = vec![0.0f32; d * h4];
        let mut dwh = vec![0.0f32; hd * h4];
        let mut db = vec![0.0f32; h4];
        let mut dh = vec![0.0f32; n * hd];
        let mut dc = vec![0.0f32; n * hd];
        let mut da = vec![0.0f32; n * h4];

        for t in (0..t_len).rev() {
            let step = &cache.steps[t];
            match self.backend {
                Backend::Serial => {
                    for (r, (da_r, dc_r)) in da.chunks_mut(h4).zip(dc.chunks_mut(hd)).enumerate() {
                        let rows = r * hd..(r + 1) * hd;
                        cell_backward_row(
                            &step.gates[r * h4..(r + 1) * h4],
                            &step.c_prev[rows.clone()],
                            &step.c_next[rows.clone()],
                            &dh_out[(r * t_len + t) * hd..(r * t_len + t + 1) * hd],
                            &dh[rows],
                            dc_r,
                            da_r,
                        );
                    }
                }
                Backend::Parallel => {
                    let dh_carry = &dh;
                    da.par_chunks_mut(h4)
                        .zip(dc.par_chunks_mut(hd))
                        .enumerate()
                        .for_each(|(r, (da_r, dc_r))| {
                            let rows = r * hd..(r + 1) * hd;
                            cell_backward_row(
                                &step.gates[r * h4..(r + 1) * h4],
                                &step.c_prev[rows.clone()],
                                &step.c_next[rows.clone()],
                                &dh_out[(r * t_len + t) * hd..(r * t_len + t + 1) * hd],
                                &dh_carry[rows],
                                dc_r,
                                da_r,
                            );
                        });
                }
            }

            add_row_sums(&mut db, &da, h4);
            // dWx += x_t^T @ da ; dWh += h_{t-1}^T @ da
            let lxt = Layout { offset: t * d, row_stride: 1, col_stride: t_len * d };
            sgemm(d, n, h4, 1.0, x, lxt, &da, Layout::row_major(h4), 1.0, &mut dwx, Layout::row_major(h4));
            sgemm(hd, n, h4, 1.0, &step.h_prev, Layout::transposed(hd), &da, Layout::row_major(h4), 1.0, &mut dwh, Layout::row_major(h4));
            // dx_t = da @ Wx^T ; dh_{t-1} = da @ Wh^T
            let ldx = Layout { offset: t * d, row_stride: t_len * d, col_stride: 1 };
            sgemm(n, h4, d, 1.0, &da, Layout::row_major(h4), wx, Layout::transposed(h4), 0.0, &mut dxs, ldx);
            sgemm(n, h4, hd, 1.0, &da, Layout::row_major(h4), wh, Layout::transposed(h4), 0.0, &mut dh, Layout::row_major(hd));
        }

        self.params[WX].set_grad(&dwx);
        self.params[WH].set_grad(&dwh);
        self.params[B].set_grad(&db);
        self.dh0 = Some(Tensor::from_vec(&[n, hd], dh)?);
        Tensor::from_vec(&[n, t_len, d], dxs)
    }

    fn params(&self) -> &[Parameter] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }
}
