//! Cross-camera re-identification.
//!
//! One [`PersonGallery`] is shared by every camera loop. It maps appearance
//! embeddings to canonical [`Person`] records with human-readable labels.

mod gallery;
mod label;
mod person;

pub use gallery::{MergeOutcome, PersonGallery, Resolution};
pub use label::{label_for_index, label_index};
pub use person::{Person, StoredEmbedding};
