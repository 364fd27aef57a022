//! Crate-level error type.
//!
//! Per-frame failures (embedder errors, malformed embeddings) are advisory and
//! never surface here; only configuration, explicit operator calls and worker
//! startup return errors.

use thiserror::Error;

use crate::config::ConfigError;
use crate::ids::PersonId;
use crate::integration::StoreError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown person `{0}`")]
    UnknownPerson(PersonId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
