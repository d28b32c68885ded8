use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LmError {
    // --- Shapes / ids ---
    #[error("Shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        got: String,
    },

    #[error("Token id {id} outside vocabulary of size {vocab_size}")]
    OutOfVocabulary { id: i32, vocab_size: usize },

    #[error("{0}: backward called without a training-mode forward")]
    MissingCache(&'static str),

    // --- Persistence ---
    #[error("Parameter blob does not match model: {0}")]
    SchemaMismatch(String),

    #[error("Failed to open {path}: {source}")]
    FileOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // --- Corpus ---
    #[error("Corpus of {len} tokens is too short, need at least {needed}")]
    CorpusTooShort { len: usize, needed: usize },

    #[error("Bad token `{token}` on corpus line {line}")]
    ParseCorpus { line: usize, token: String },

    // --- Config ---
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl LmError {
    pub(crate) fn shape(context: &'static str, expected: impl std::fmt::Debug, got: impl std::fmt::Debug) -> Self {
        LmError::ShapeMismatch {
            context,
            expected: format!("{expected:?}"),
            got: format!("{got:?}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, LmError>;
