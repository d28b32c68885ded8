// ============================================================================
// PARAMETER BLOB
// Positional: tensor k of the blob belongs to parameter k of the model.
// No names are stored, so construction order is the schema.
// ============================================================================

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

use crate::error::{LmError, Result};
use crate::param::Parameter;

pub const BLOB_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ParamBlob {
    version: u32,
    tensors: Vec<StoredTensor>,
}

pub fn write_params<W: Write>(writer: W, params: &[&Parameter]) -> Result<()> {
    let blob = ParamBlob {
        version: BLOB_VERSION,
        tensors: params
            .iter()
            .map(|p| StoredTensor { shape: p.shape().to_vec(), data: p.value().data().to_vec() })
            .collect(),
    };
    bincode::serialize_into(writer, &blob)?;
    Ok(())
}

fn decode<R: Read>(reader: R) -> Result<ParamBlob> {
    let blob: ParamBlob = bincode::deserialize_from(reader)?;
    if blob.version != BLOB_VERSION {
        return Err(LmError::SchemaMismatch(format!(
            "blob version {}, expected {BLOB_VERSION}",
            blob.version
        )));
    }
    Ok(blob)
}

/// Restores every parameter value, or none of them.
pub fn read_params<R: Read>(reader: R, params: &mut [&mut Parameter]) -> Result<()> {
    let blob = decode(reader)?;
    if blob.tensors.len() != params.len() {
        return Err(LmError::SchemaMismatch(format!(
            "blob holds {} tensors, model has {}",
            blob.tensors.len(),
            params.len()
        )));
    }
    for (k, (stored, p)) in blob.tensors.iter().zip(params.iter()).enumerate() {
        let len: usize = stored.shape.iter().product();
        if stored.shape != p.shape() || stored.data.len() != len {
            return Err(LmError::SchemaMismatch(format!(
                "tensor {k} ({}): stored {:?} with {} values, model expects {:?}",
                p.name(),
                stored.shape,
                stored.data.len(),
                p.shape()
            )));
        }
    }
    for (stored, p) in blob.tensors.iter().zip(params.iter_mut()) {
        p.value_mut().data_mut().copy_from_slice(&stored.data);
    }
    Ok(())
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| LmError::FileOpen { path: path.to_path_buf(), source })
}

pub fn save_params(path: impl AsRef<Path>, params: &[&Parameter]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| LmError::FileOpen { path: path.to_path_buf(), source })?;
    let mut writer = BufWriter::new(file);
    write_params(&mut writer, params)?;
    writer.flush()?;
    let values: usize = params.iter().map(|p| p.value().len()).sum();
    info!(path = %path.display(), tensors = params.len(), values, "saved parameters");
    Ok(())
}

pub fn load_params(path: impl AsRef<Path>, params: &mut [&mut Parameter]) -> Result<()> {
    let path = path.as_ref();
    read_params(BufReader::new(open(path)?), params)?;
    let values: usize = params.iter().map(|p| p.value().len()).sum();
    info!(path = %path.display(), tensors = params.len(), values, "loaded parameters");
    Ok(())
}

/// Shapes stored in a blob, in order, without touching any model.
pub fn peek_params(path: impl AsRef<Path>) -> Result<Vec<Vec<usize>>> {
    let blob = decode(BufReader::new(open(path.as_ref())?))?;
    Ok(blob.tensors.into_iter().map(|t| t.shape).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    fn params() -> Vec<Parameter> {
        vec![
            Parameter::new("a", Tensor::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap()),
            Parameter::new("b", Tensor::from_vec(&[3], vec![-1.0, 0.5, 9.0]).unwrap()),
        ]
    }

    fn encode(ps: &[Parameter]) -> Vec<u8> {
        let mut buf = Vec::new();
        write_params(&mut buf, &ps.iter().collect::<Vec<_>>()).unwrap();
        buf
    }

    #[test]
    fn values_come_back_in_order() {
        let buf = encode(&params());
        let mut target = vec![
            Parameter::new("a", Tensor::zeros(&[2, 2])),
            Parameter::new("b", Tensor::zeros(&[3])),
        ];
        read_params(buf.as_slice(), &mut target.iter_mut().collect::<Vec<_>>()).unwrap();
        assert_eq!(target[0].value(), params()[0].value());
        assert_eq!(target[1].value(), params()[1].value());
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let buf = encode(&params());
        let mut target = vec![Parameter::new("a", Tensor::zeros(&[2, 2]))];
        let err = read_params(buf.as_slice(), &mut target.iter_mut().collect::<Vec<_>>()).unwrap_err();
        assert!(matches!(err, LmError::SchemaMismatch(_)));
    }

    #[test]
    fn shape_mismatch_loads_nothing() {
        let buf = encode(&params());
        let mut target = vec![
            Parameter::new("a", Tensor::zeros(&[2, 2])),
            Parameter::new("b", Tensor::zeros(&[4])),
        ];
        let err = read_params(buf.as_slice(), &mut target.iter_mut().collect::<Vec<_>>()).unwrap_err();
        assert!(matches!(err, LmError::SchemaMismatch(_)));
        // the matching first tensor was not copied either
        assert!(target[0].value().data().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn truncated_blob_is_an_encoding_error() {
        let buf = encode(&params());
        let mut target = params();
        let err = read_params(&buf[..buf.len() - 3], &mut target.iter_mut().collect::<Vec<_>>()).unwrap_err();
        assert!(matches!(err, LmError::Encode(_)));
    }
}
