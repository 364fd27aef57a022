use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons an embedding cannot take part in a similarity comparison.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbeddingError {
    #[error("embedding is empty")]
    Empty,
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("embedding contains non-finite values")]
    NonFinite,
    #[error("embedding has zero norm")]
    ZeroNorm,
}

/// Fixed-length appearance descriptor, L2-normalized when well-formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Validate and L2-normalize a raw descriptor.
    pub fn new(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        let embedding = Self::from_raw(values);
        embedding.validate()?;
        Ok(embedding)
    }

    /// Wrap a descriptor as produced by an external model, normalizing it when
    /// possible. Malformed input is kept as-is and rejected later by
    /// [`Embedding::validate`].
    pub fn from_raw(mut values: Vec<f32>) -> Self {
        let norm = l2_norm(&values);
        if norm.is_finite() && norm > f32::EPSILON {
            values.iter_mut().for_each(|v| *v /= norm);
        }
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.0.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        if self.0.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite);
        }
        if l2_norm(&self.0) <= f32::EPSILON {
            return Err(EmbeddingError::ZeroNorm);
        }
        Ok(())
    }

    /// Cosine similarity in `[-1, 1]`.
    pub fn cosine_similarity(&self, other: &Embedding) -> Result<f32, EmbeddingError> {
        if self.len() != other.len() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.len(),
                got: other.len(),
            });
        }
        self.validate()?;
        other.validate()?;

        let dot: f32 = self.0.iter().zip(&other.0).map(|(a, b)| a * b).sum();
        let sim = dot / (l2_norm(&self.0) * l2_norm(&other.0));
        Ok(sim.clamp(-1.0, 1.0))
    }

    /// `1 - cosine_similarity`, clamped to `[0, 1]`.
    pub fn cosine_distance(&self, other: &Embedding) -> Result<f32, EmbeddingError> {
        self.cosine_similarity(other)
            .map(|sim| (1.0 - sim).clamp(0.0, 1.0))
    }

    /// Normalized mean of a set of equally sized embeddings.
    pub fn mean<'a>(embeddings: impl IntoIterator<Item = &'a Embedding>) -> Option<Embedding> {
        let mut iter = embeddings.into_iter();
        let first = iter.next()?;
        let mut sum = first.0.clone();
        for e in iter {
            if e.len() != sum.len() {
                continue;
            }
            sum.iter_mut().zip(&e.0).for_each(|(s, v)| *s += v);
        }
        let mean = Embedding::from_raw(sum);
        mean.validate().ok().map(|_| mean)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.0
    }
}

fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}
