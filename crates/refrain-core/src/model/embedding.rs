use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// The model configuration that produces embeddings.
///
/// Stored alongside every vector so that embeddings from different models
/// or dimensionalities are never compared against each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub dimensions: usize,
}

impl ModelSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, dimensions: usize) -> Self {
        Self {
            name: name.into(),
            dimensions,
        }
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} dims)", self.name, self.dimensions)
    }
}

/// A fixed-length vector produced by an embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Name of the model that produced the vector.
    pub model: String,
    pub values: Vec<f32>,
}

impl Embedding {
    #[must_use]
    pub fn new(model: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            model: model.into(),
            values,
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.values.len()
    }

    /// Whether this vector was produced by `spec`.
    #[must_use]
    pub fn matches(&self, spec: &ModelSpec) -> bool {
        self.model == spec.name && self.values.len() == spec.dimensions
    }

    /// Check that this vector belongs to `spec`.
    pub fn ensure_matches(&self, spec: &ModelSpec) -> Result<()> {
        if self.matches(spec) {
            Ok(())
        } else {
            Err(Error::InvalidData(format!(
                "embedding from {} with {} dims does not match {}",
                self.model,
                self.values.len(),
                spec
            )))
        }
    }

    /// Serialise the vector as little-endian `f32`s for storage.
    #[must_use]
    pub fn to_blob(&self) -> Vec<u8> {
        encode_vector(&self.values)
    }
}

/// Encode a vector as a little-endian `f32` blob.
#[must_use]
pub fn encode_vector(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a little-endian `f32` blob.
pub fn decode_vector(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(Error::InvalidData(format!(
            "vector blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(chunk);
            f32::from_le_bytes(bytes)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_encoding_is_little_endian() {
        let blob = encode_vector(&[1.0]);
        assert_eq!(blob, 1.0f32.to_le_bytes().to_vec());
        assert_eq!(decode_vector(&blob).unwrap(), vec![1.0]);
    }

    #[test]
    fn test_decode_rejects_ragged_blob() {
        assert!(decode_vector(&[0, 0, 0]).is_err());
        assert!(decode_vector(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_embedding_matches_model_and_dims() {
        let spec = ModelSpec::new("text-embedding-3-small", 3);
        let good = Embedding::new("text-embedding-3-small", vec![0.1, 0.2, 0.3]);
        let short = Embedding::new("text-embedding-3-small", vec![0.1, 0.2]);
        let other = Embedding::new("text-embedding-ada-002", vec![0.1, 0.2, 0.3]);

        assert!(good.matches(&spec));
        assert!(good.ensure_matches(&spec).is_ok());
        assert!(!short.matches(&spec));
        assert!(other.ensure_matches(&spec).is_err());
    }

    #[test]
    fn test_model_spec_display() {
        let spec = ModelSpec::new("m", 1536);
        assert_eq!(spec.to_string(), "m (1536 dims)");
    }
}
