//! Stateful LSTM language model trained with truncated BPTT.

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod layers;
pub mod model;
pub mod ops;
pub mod optim;
pub mod param;
pub mod tensor;
pub mod trainer;

pub use config::{Backend, ModelConfig, TrainConfig};
pub use data::{read_corpus, validate_corpus, CorpusWindows};
pub use error::{LmError, Result};
pub use eval::{eval_perplexity, evaluate, EvalMetrics};
pub use layers::{Layer, Mode, RecurrentState, TimeAffine, TimeEmbedding, TimeLstm, TimeSoftmaxWithLoss};
pub use model::LanguageModel;
pub use optim::{clip_grads, grad_norm, Optimizer};
pub use param::Parameter;
pub use tensor::{IdTensor, Tensor};
pub use trainer::{StepStats, TbpttTrainer};
