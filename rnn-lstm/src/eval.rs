//! Corpus perplexity.

use std::fmt;
use tracing::{debug, info};

use crate::data::CorpusWindows;
use crate::error::Result;
use crate::layers::Mode;
use crate::model::LanguageModel;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvalMetrics {
    /// Mean of the per-window losses.
    pub loss: f32,
    pub perplexity: f32,
    pub iterations: usize,
}

impl fmt::Display for EvalMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loss: {:.4} | PPL: {:.2} | Windows: {}", self.loss, self.perplexity, self.iterations)
    }
}

/// Runs `model` over every interleaved window of `corpus` in eval mode.
///
/// Recurrent state is carried from window to window and left as is at the
/// end; reset the model first if it has seen unrelated text.
pub fn evaluate(
    model: &mut LanguageModel,
    corpus: &[i32],
    batch_size: usize,
    time_size: usize,
) -> Result<EvalMetrics> {
    let windows = CorpusWindows::new(corpus, batch_size, time_size)?;
    let max_iters = windows.max_iters();
    let mut total = 0.0f64;
    for (it, (xs, ts)) in windows.iter().enumerate() {
        let loss = model.forward(xs, ts, Mode::Eval)?;
        total += loss as f64;
        debug!(iteration = it + 1, max_iters, loss, "perplexity window");
    }
    let mean = total / max_iters as f64;
    let metrics = EvalMetrics {
        loss: mean as f32,
        perplexity: mean.exp() as f32,
        iterations: max_iters,
    };
    info!(%metrics, "evaluated corpus");
    Ok(metrics)
}

/// `exp(mean window loss)` over `corpus`.
pub fn eval_perplexity(
    model: &mut LanguageModel,
    corpus: &[i32],
    batch_size: usize,
    time_size: usize,
) -> Result<f32> {
    evaluate(model, corpus, batch_size, time_size).map(|m| m.perplexity)
}
