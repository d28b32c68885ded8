// ============================================================================
// LANGUAGE MODEL
// Embedding -> stateful LSTM -> affine -> softmax cross-entropy.
// The flat parameter order (embed.W, lstm.Wx, lstm.Wh, lstm.b, affine.W,
// affine.b) is shared by clipping, optimizers and the parameter blob.
// ============================================================================

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{Read, Write};
use std::path::Path;

use crate::checkpoint;
use crate::config::ModelConfig;
use crate::error::{LmError, Result};
use crate::layers::{Layer, Mode, TimeAffine, TimeEmbedding, TimeLstm, TimeSoftmaxWithLoss};
use crate::param::{rand_normal, Parameter};
use crate::tensor::{IdTensor, Tensor};

#[derive(Debug)]
pub struct LanguageModel {
    config: ModelConfig,
    embedding: TimeEmbedding,
    lstm: TimeLstm,
    affine: TimeAffine,
    loss: TimeSoftmaxWithLoss,
}

impl LanguageModel {
    /// Builds a freshly initialised model; the same config and seed always
    /// give the same weights.
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        let (v, d, h) = (config.vocab_size, config.wordvec_size, config.hidden_size);
        let mut rng = StdRng::seed_from_u64(config.seed);

        let embed_w = rand_normal(&[v, d], 0.01, &mut rng);
        let lstm_wx = rand_normal(&[d, 4 * h], 1.0 / (d as f32).sqrt(), &mut rng);
        let lstm_wh = rand_normal(&[h, 4 * h], 1.0 / (h as f32).sqrt(), &mut rng);
        let affine_w = rand_normal(&[h, v], 1.0 / (h as f32).sqrt(), &mut rng);

        Ok(LanguageModel {
            embedding: TimeEmbedding::new(embed_w)?,
            lstm: TimeLstm::new(lstm_wx, lstm_wh, Tensor::zeros(&[4 * h]), config.stateful, config.backend)?,
            affine: TimeAffine::new(affine_w, Tensor::zeros(&[v]))?,
            loss: TimeSoftmaxWithLoss::new(config.ignore_label, config.backend),
            config,
        })
    }

    /// Builds the architecture described by `config` and fills it from a blob.
    pub fn load(config: ModelConfig, path: impl AsRef<Path>) -> Result<Self> {
        let mut model = LanguageModel::new(config)?;
        model.load_params(path)?;
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Scores `(batch, time, vocab)` for every input position.
    pub fn predict(&mut self, xs: IdTensor, mode: Mode) -> Result<Tensor> {
        // stale probabilities must not pair with these activations
        self.loss.clear_cache();
        let emb = self.embedding.forward(xs, mode)?;
        let hs = self.lstm.forward(emb, mode)?;
        self.affine.forward(hs, mode)
    }

    /// Mean next-token loss of `xs` against `ts`.
    pub fn forward(&mut self, xs: IdTensor, ts: IdTensor, mode: Mode) -> Result<f32> {
        self.loss.clear_cache();
        if xs.dims() != ts.dims() {
            return Err(LmError::shape("LanguageModel::forward targets", xs.dims(), ts.dims()));
        }
        // fail before any layer caches or carried state change
        self.loss.check_targets(&ts, self.config.vocab_size)?;
        let scores = self.predict(xs, mode)?;
        self.loss.forward((scores, ts), mode)
    }

    /// Fills every parameter gradient for the last training forward.
    pub fn backward(&mut self, dout: f32) -> Result<()> {
        let dscores = self.loss.backward(dout)?;
        let dhs = self.affine.backward(dscores)?;
        let demb = self.lstm.backward(dhs)?;
        self.embedding.backward(demb)
    }

    pub fn reset_state(&mut self) {
        self.lstm.reset_state();
    }

    pub fn params(&self) -> Vec<&Parameter> {
        self.embedding
            .params()
            .iter()
            .chain(self.lstm.params())
            .chain(self.affine.params())
            .collect()
    }

    pub fn params_mut(&mut self) -> Vec<&mut Parameter> {
        self.embedding
            .params_mut()
            .iter_mut()
            .chain(self.lstm.params_mut().iter_mut())
            .chain(self.affine.params_mut().iter_mut())
            .collect()
    }

    /// Gradient tensors in flat parameter order, for clipping.
    pub fn grads_mut(&mut self) -> Vec<&mut Tensor> {
        self.params_mut().into_iter().map(Parameter::grad_mut).collect()
    }

    pub fn zero_grads(&mut self) {
        self.params_mut().into_iter().for_each(Parameter::zero_grad);
    }

    /// Number of scalar weights.
    pub fn param_count(&self) -> usize {
        self.params().iter().map(|p| p.value().len()).sum()
    }

    pub fn lstm(&self) -> &TimeLstm {
        &self.lstm
    }

    pub fn lstm_mut(&mut self) -> &mut TimeLstm {
        &mut self.lstm
    }

    pub fn save_params(&self, path: impl AsRef<Path>) -> Result<()> {
        checkpoint::save_params(path, &self.params())
    }

    pub fn load_params(&mut self, path: impl AsRef<Path>) -> Result<()> {
        checkpoint::load_params(path, &mut self.params_mut())
    }

    pub fn write_params<W: Write>(&self, writer: W) -> Result<()> {
        checkpoint::write_params(writer, &self.params())
    }

    pub fn read_params<R: Read>(&mut self, reader: R) -> Result<()> {
        checkpoint::read_params(reader, &mut self.params_mut())
    }
}
