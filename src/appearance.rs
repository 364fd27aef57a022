//! Appearance descriptors and the embedder capability.
//!
//! An [`Embedder`] turns an image region into an L2-normalized [`Embedding`].
//! Embeddings are advisory: trackers fall back to motion-only association and
//! the gallery falls back to creating a new person when they are missing or
//! malformed.

mod embedder;
mod embedding;
mod histogram;

pub use embedder::{EmbedError, Embedder};
pub use embedding::{Embedding, EmbeddingError};
pub use histogram::{HISTOGRAM_EMBEDDING_DIM, HistogramEmbedder};

#[cfg(feature = "burn-backend")]
mod burn_backend;

#[cfg(feature = "burn-backend")]
pub use burn_backend::{BurnEmbedModel, BurnEmbedder};
