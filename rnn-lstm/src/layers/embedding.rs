use super::{Layer, Mode};
use crate::error::{LmError, Result};
use crate::ops::vec_add_inplace;
use crate::param::Parameter;
use crate::tensor::{IdTensor, Tensor};

/// Row lookup `(batch, time)` ids -> `(batch, time, dim)` vectors.
#[derive(Debug)]
pub struct TimeEmbedding {
    params: Vec<Parameter>,
    vocab_size: usize,
    dim: usize,
    ids: Option<IdTensor>,
}

impl TimeEmbedding {
    pub fn new(weight: Tensor) -> Result<Self> {
        let (vocab_size, dim) = match *weight.shape() {
            [v, d] if v > 0 && d > 0 => (v, d),
            _ => return Err(LmError::shape("TimeEmbedding::new", "(vocab, dim)", weight.shape())),
        };
        Ok(TimeEmbedding {
            params: vec![Parameter::new("embed.W", weight)],
            vocab_size,
            dim,
            ids: None,
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn row(&self, id: i32) -> Result<usize> {
        if id < 0 || id as usize >= self.vocab_size {
            return Err(LmError::OutOfVocabulary { id, vocab_size: self.vocab_size });
        }
        Ok(id as usize)
    }
}

impl Layer for TimeEmbedding {
    type Input = IdTensor;
    type Output = Tensor;
    type OutputGrad = Tensor;
    /// Ids have no gradient.
    type InputGrad = ();

    fn forward(&mut self, ids: IdTensor, mode: Mode) -> Result<Tensor> {
        self.ids = None;
        let (n, t) = ids.dims();
        let d = self.dim;
        let table = self.params[0].value().data();
        let mut out = Vec::with_capacity(n * t * d);
        for &id in ids.data() {
            let r = self.row(id)?;
            out.extend_from_slice(&table[r * d..(r + 1) * d]);
        }
        self.ids = if mode.is_train() { Some(ids) } else { None };
        Tensor::from_vec(&[n, t, d], out)
    }

    fn backward(&mut self, dout: Tensor) -> Result<()> {
        let ids = self.ids.as_ref().ok_or(LmError::MissingCache("TimeEmbedding"))?;
        let (n, t) = ids.dims();
        let d = self.dim;
        dout.expect_shape("TimeEmbedding::backward", &[n, t, d])?;

        // Scatter-add: repeated ids sum their contributions.
        let grad = self.params[0].grad_mut();
        grad.fill(0.0);
        let dw = grad.data_mut();
        for (pos, &id) in ids.data().iter().enumerate() {
            let r = id as usize;
            vec_add_inplace(&mut dw[r * d..(r + 1) * d], &dout.data()[pos * d..(pos + 1) * d]);
        }
        Ok(())
    }

    fn params(&self) -> &[Parameter] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::gradcheck::{check_params, grads_of, uniform, weighted_sum};

    fn layer() -> TimeEmbedding {
        TimeEmbedding::new(uniform(&[5, 3], 1)).unwrap()
    }

    #[test]
    fn forward_copies_rows() {
        let mut emb = layer();
        let ids = IdTensor::from_vec(1, 2, vec![4, 0]).unwrap();
        let out = emb.forward(ids, Mode::Train).unwrap();
        let w = emb.params()[0].value().data().to_vec();
        assert_eq!(out.shape(), &[1, 2, 3]);
        assert_eq!(&out.data()[..3], &w[12..15]);
        assert_eq!(&out.data()[3..], &w[..3]);
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        let mut emb = layer();
        for bad in [5, -1] {
            let ids = IdTensor::from_vec(1, 1, vec![bad]).unwrap();
            assert!(matches!(
                emb.forward(ids, Mode::Train),
                Err(LmError::OutOfVocabulary { vocab_size: 5, .. })
            ));
        }
    }

    #[test]
    fn failed_forward_drops_previous_ids() {
        let mut emb = layer();
        emb.forward(IdTensor::from_vec(1, 1, vec![2]).unwrap(), Mode::Train).unwrap();
        assert!(emb.forward(IdTensor::from_vec(1, 2, vec![1, 9]).unwrap(), Mode::Train).is_err());
        assert!(matches!(
            emb.backward(Tensor::zeros(&[1, 1, 3])),
            Err(LmError::MissingCache(_))
        ));
    }

    #[test]
    fn repeated_ids_sum_their_gradients() {
        let mut emb = layer();
        let ids = IdTensor::from_vec(2, 2, vec![2, 1, 3, 2]).unwrap();
        emb.forward(ids, Mode::Train).unwrap();
        let dout = uniform(&[2, 2, 3], 9);
        emb.backward(dout.clone()).unwrap();
        let dw = emb.params()[0].grad().data();
        for j in 0..3 {
            let expected = dout.data()[j] + dout.data()[9 + j];
            assert!((dw[2 * 3 + j] - expected).abs() < 1e-6);
        }
        // untouched rows stay zero
        assert!(dw[..3].iter().all(|&g| g == 0.0));
        assert!(dw[12..].iter().all(|&g| g == 0.0));
    }

    #[test]
    fn backward_overwrites_previous_gradient() {
        let mut emb = layer();
        let ids = IdTensor::from_vec(1, 1, vec![0]).unwrap();
        emb.forward(ids.clone(), Mode::Train).unwrap();
        emb.backward(Tensor::from_vec(&[1, 1, 3], vec![1.0; 3]).unwrap()).unwrap();
        emb.forward(ids, Mode::Train).unwrap();
        emb.backward(Tensor::from_vec(&[1, 1, 3], vec![1.0; 3]).unwrap()).unwrap();
        assert_eq!(&emb.params()[0].grad().data()[..3], &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let mut emb = layer();
        let ids = IdTensor::from_vec(2, 3, vec![0, 3, 3, 1, 4, 0]).unwrap();
        let r = uniform(&[2, 3, 3], 2);
        emb.forward(ids.clone(), Mode::Train).unwrap();
        emb.backward(r.clone()).unwrap();
        let analytic = grads_of(&emb);
        check_params(&mut emb, &analytic, |l| {
            let out = l.forward(ids.clone(), Mode::Eval).unwrap();
            weighted_sum(&out, &r)
        });
    }

    #[test]
    fn eval_forward_leaves_nothing_to_backpropagate() {
        let mut emb = layer();
        emb.forward(IdTensor::zeros(1, 1), Mode::Eval).unwrap();
        assert!(matches!(
            emb.backward(Tensor::zeros(&[1, 1, 3])),
            Err(LmError::MissingCache(_))
        ));
    }
}
