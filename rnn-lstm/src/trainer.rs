// ============================================================================
// TRUNCATED-BPTT TRAINER
// Consecutive windows of the interleaved corpus streams; recurrent state is
// carried across windows and epochs, gradients stop at each window edge.
// ============================================================================

use std::time::Instant;
use tracing::info;

use crate::config::TrainConfig;
use crate::data::{validate_corpus, CorpusWindows};
use crate::error::Result;
use crate::layers::Mode;
use crate::model::LanguageModel;
use crate::optim::{clip_grads, grad_norm, Optimizer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepStats {
    pub loss: f32,
    /// Joint gradient norm before clipping.
    pub grad_norm: f32,
}

pub struct TbpttTrainer<O: Optimizer> {
    config: TrainConfig,
    optimizer: O,
    time_idx: usize,
    ppl_history: Vec<f32>,
}

impl<O: Optimizer> TbpttTrainer<O> {
    pub fn new(config: TrainConfig, optimizer: O) -> Result<Self> {
        config.validate()?;
        Ok(TbpttTrainer { config, optimizer, time_idx: 0, ppl_history: Vec::new() })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut O {
        &mut self.optimizer
    }

    /// Perplexities recorded by the last `fit`, one per report.
    pub fn ppl_history(&self) -> &[f32] {
        &self.ppl_history
    }

    /// Start of the next window within each batch row's stream.
    pub fn time_idx(&self) -> usize {
        self.time_idx
    }

    /// One window: forward, backward, optional clip, update.
    pub fn step(&mut self, model: &mut LanguageModel, windows: &CorpusWindows<'_>) -> Result<StepStats> {
        let (xs, ts) = windows.window(self.time_idx);
        let loss = model.forward(xs, ts, Mode::Train)?;
        self.time_idx += windows.time_size();
        model.backward(1.0)?;
        let mut grads = model.grads_mut();
        let norm = match self.config.max_grad {
            Some(max) => clip_grads(&mut grads, max),
            None => grad_norm(&grads),
        };
        self.optimizer.update(&mut model.params_mut());
        Ok(StepStats { loss, grad_norm: norm })
    }

    /// Trains for `max_epoch` passes over `corpus` and returns the
    /// perplexity history.
    ///
    /// Resets the model's recurrent state and the window position first;
    /// state then flows through every window of every epoch.
    pub fn fit(&mut self, model: &mut LanguageModel, corpus: &[i32], max_epoch: usize) -> Result<&[f32]> {
        validate_corpus(corpus, model.config().vocab_size)?;
        let windows = CorpusWindows::new(corpus, self.config.batch_size, self.config.time_size)?;
        let max_iters = windows.max_iters();
        let interval = match self.config.eval_interval {
            0 => max_iters,
            n => n,
        };

        model.reset_state();
        self.time_idx = 0;
        self.ppl_history.clear();
        info!(
            tokens = corpus.len(),
            max_iters,
            batch_size = self.config.batch_size,
            time_size = self.config.time_size,
            "starting truncated BPTT"
        );

        let started = Instant::now();
        let (mut total_loss, mut count, mut norm_sum) = (0.0f64, 0usize, 0.0f64);
        for epoch in 0..max_epoch {
            for iter in 0..max_iters {
                let stats = self.step(model, &windows)?;
                total_loss += stats.loss as f64;
                norm_sum += stats.grad_norm as f64;
                count += 1;

                if (iter + 1) % interval == 0 {
                    let ppl = (total_loss / count as f64).exp() as f32;
                    info!(
                        epoch = epoch + 1,
                        iter = iter + 1,
                        max_iters,
                        ppl,
                        grad_norm = norm_sum / count as f64,
                        elapsed_s = started.elapsed().as_secs_f64(),
                        "training"
                    );
                    self.ppl_history.push(ppl);
                    (total_loss, count, norm_sum) = (0.0, 0, 0.0);
                }
            }
        }
        Ok(&self.ppl_history)
    }
}
