//! Time-distributed layers and the interface they share.

mod affine;
mod embedding;
mod lstm;
mod softmax_loss;

#[cfg(test)]
pub(crate) mod gradcheck;

pub use affine::TimeAffine;
pub use embedding::TimeEmbedding;
pub use lstm::{RecurrentState, TimeLstm};
pub use softmax_loss::TimeSoftmaxWithLoss;

use crate::error::Result;
use crate::param::Parameter;

/// Whether a forward pass keeps what backward needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Train,
    /// No backward caches are built; recurrent state is still carried.
    Eval,
}

impl Mode {
    pub fn is_train(self) -> bool {
        self == Mode::Train
    }
}

/// A layer with a matching forward/backward pair and declared parameters.
///
/// `forward` takes its input by value so a layer can keep it for backward
/// without copying. Parameters are listed in declaration order; that order
/// is part of the persistence format.
pub trait Layer {
    type Input;
    type Output;
    /// Gradient with respect to `Output`.
    type OutputGrad;
    /// Gradient with respect to `Input`.
    type InputGrad;

    fn forward(&mut self, input: Self::Input, mode: Mode) -> Result<Self::Output>;

    /// Overwrites the parameter gradients for the last training forward.
    fn backward(&mut self, grad: Self::OutputGrad) -> Result<Self::InputGrad>;

    fn params(&self) -> &[Parameter];

    fn params_mut(&mut self) -> &mut [Parameter];
}
