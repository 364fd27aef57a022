use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::appearance::{Embedding, EmbeddingError};
use crate::ids::{CameraId, PersonId};

/// An embedding retained in a person's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub embedding: Embedding,
    pub seen_at: DateTime<Utc>,
}

/// Canonical cross-camera identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub person_id: PersonId,
    pub label: String,
    /// Bounded history, oldest first
    pub embeddings: VecDeque<StoredEmbedding>,
    pub cameras: BTreeSet<CameraId>,
    pub visit_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub avg_confidence: f32,
    #[serde(skip)]
    centroid: Option<Embedding>,
}

impl Person {
    pub(crate) fn new(
        person_id: PersonId,
        label: String,
        camera_id: CameraId,
        confidence: f32,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            person_id,
            label,
            embeddings: VecDeque::new(),
            cameras: BTreeSet::from([camera_id]),
            visit_count: 1,
            first_seen: at,
            last_seen: at,
            avg_confidence: confidence,
            centroid: None,
        }
    }

    /// Running mean of the stored embeddings.
    pub fn centroid(&self) -> Option<&Embedding> {
        self.centroid.as_ref()
    }

    /// Best cosine similarity between `embedding` and this person's
    /// representatives: the centroid and the `recent` newest embeddings.
    /// `None` when the person has no stored embeddings.
    pub fn similarity(&self, embedding: &Embedding, recent: usize) -> Result<Option<f32>, EmbeddingError> {
        let recent_iter = self.embeddings.iter().rev().take(recent).map(|s| &s.embedding);
        let mut best: Option<f32> = None;
        for representative in self.centroid.iter().chain(recent_iter) {
            let sim = representative.cosine_similarity(embedding)?;
            best = Some(best.map_or(sim, |b| b.max(sim)));
        }
        Ok(best)
    }

    pub(crate) fn push_embedding(&mut self, embedding: Embedding, seen_at: DateTime<Utc>, cap: usize) {
        self.embeddings.push_back(StoredEmbedding { embedding, seen_at });
        while self.embeddings.len() > cap {
            self.embeddings.pop_front();
        }
        self.refresh_centroid();
    }

    pub(crate) fn record_sighting(&mut self, camera_id: &CameraId, confidence: f32, at: DateTime<Utc>) {
        self.cameras.insert(camera_id.clone());
        self.visit_count += 1;
        self.avg_confidence += (confidence - self.avg_confidence) / self.visit_count as f32;
        self.last_seen = self.last_seen.max(at);
    }

    /// Fold `other` into this record. Embedding histories are interleaved by
    /// time and the newest `cap` are kept.
    pub(crate) fn absorb(&mut self, other: Person, cap: usize) {
        let total_visits = self.visit_count + other.visit_count;
        if total_visits > 0 {
            self.avg_confidence = (self.avg_confidence * self.visit_count as f32
                + other.avg_confidence * other.visit_count as f32)
                / total_visits as f32;
        }
        self.visit_count = total_visits;
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
        self.cameras.extend(other.cameras);

        let mut merged: Vec<StoredEmbedding> = self.embeddings.drain(..).chain(other.embeddings).collect();
        merged.sort_by_key(|s| s.seen_at);
        let skip = merged.len().saturating_sub(cap);
        self.embeddings = merged.into_iter().skip(skip).collect();
        self.refresh_centroid();
    }

    pub(crate) fn refresh_centroid(&mut self) {
        self.centroid = Embedding::mean(self.embeddings.iter().map(|s| &s.embedding));
    }
}
