//! Token-id corpora and the interleaved `(batch, time)` windows cut from them.

use std::fs;
use std::path::Path;

use crate::error::{LmError, Result};
use crate::tensor::IdTensor;

/// Splits one corpus into `batch_size` disjoint streams read in lockstep.
///
/// Row `i` of every window starts `jump` tokens after row `i - 1`, so a
/// stateful model sees each row as one contiguous stream across windows.
/// Indices wrap modulo the corpus length.
#[derive(Clone, Copy, Debug)]
pub struct CorpusWindows<'a> {
    corpus: &'a [i32],
    batch_size: usize,
    time_size: usize,
    max_iters: usize,
    jump: usize,
}

impl<'a> CorpusWindows<'a> {
    pub fn new(corpus: &'a [i32], batch_size: usize, time_size: usize) -> Result<Self> {
        if batch_size == 0 || time_size == 0 {
            return Err(LmError::InvalidConfig("batch_size and time_size must be positive".into()));
        }
        let usable = corpus.len().saturating_sub(1);
        let max_iters = usable / (batch_size * time_size);
        if max_iters == 0 {
            return Err(LmError::CorpusTooShort {
                len: corpus.len(),
                needed: batch_size * time_size + 1,
            });
        }
        Ok(CorpusWindows { corpus, batch_size, time_size, max_iters, jump: usable / batch_size })
    }

    /// Full windows available: `(len - 1) / (batch * time)`.
    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    /// Distance between consecutive batch rows: `(len - 1) / batch`.
    pub fn jump(&self) -> usize {
        self.jump
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn time_size(&self) -> usize {
        self.time_size
    }

    /// First corpus index of each batch row for a window beginning at `start`.
    pub fn offsets(&self, start: usize) -> Vec<usize> {
        (0..self.batch_size).map(|i| start + i * self.jump).collect()
    }

    /// Inputs and next-token targets for the window beginning at `start`.
    pub fn window(&self, start: usize) -> (IdTensor, IdTensor) {
        let len = self.corpus.len();
        let mut xs = IdTensor::zeros(self.batch_size, self.time_size);
        let mut ts = IdTensor::zeros(self.batch_size, self.time_size);
        for (i, offset) in self.offsets(start).into_iter().enumerate() {
            for t in 0..self.time_size {
                xs.set(i, t, self.corpus[(offset + t) % len]);
                ts.set(i, t, self.corpus[(offset + t + 1) % len]);
            }
        }
        (xs, ts)
    }

    /// Window number `iteration`, i.e. `window(iteration * time_size)`.
    pub fn batch(&self, iteration: usize) -> (IdTensor, IdTensor) {
        self.window(iteration * self.time_size)
    }

    pub fn iter(&self) -> impl Iterator<Item = (IdTensor, IdTensor)> + '_ {
        (0..self.max_iters).map(move |it| self.batch(it))
    }
}

/// Reads whitespace-separated integer ids.
pub fn read_corpus(path: impl AsRef<Path>) -> Result<Vec<i32>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| LmError::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;
    parse_corpus(&text)
}

pub fn parse_corpus(text: &str) -> Result<Vec<i32>> {
    let mut ids = Vec::new();
    for (n, line) in text.lines().enumerate() {
        for token in line.split_whitespace() {
            let id = token.parse::<i32>().map_err(|_| LmError::ParseCorpus {
                line: n + 1,
                token: token.to_string(),
            })?;
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Fails on the first id outside `[0, vocab_size)`.
pub fn validate_corpus(corpus: &[i32], vocab_size: usize) -> Result<()> {
    match corpus.iter().find(|&&id| id < 0 || id as usize >= vocab_size) {
        Some(&id) => Err(LmError::OutOfVocabulary { id, vocab_size }),
        None => Ok(()),
    }
}
