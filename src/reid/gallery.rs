//! Process-wide person gallery.
//!
//! All camera loops share one gallery. A single `RwLock` guards the index;
//! the write lock covers only the similarity scan and the record update.
//! Embedding extraction happens before `resolve` is called, and store
//! writes and sink notifications happen after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::appearance::{Embedding, EmbeddingError};
use crate::config::{ConfigError, GalleryConfig};
use crate::error::{Error, Result};
use crate::ids::{CameraId, PersonId};
use crate::integration::{EventSink, NullSink, PersonStore};
use crate::reid::label::LabelAllocator;
use crate::reid::person::Person;

/// Outcome of one [`PersonGallery::resolve_at`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub person_id: PersonId,
    pub label: String,
    /// Whether a new person was created
    pub created: bool,
    /// Similarity to the matched person, `None` for new persons
    pub similarity: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// Both ids already resolve to the same person.
    AlreadyMerged,
}

enum Change {
    Created(Person),
    Updated(Person),
}

#[derive(Default)]
struct GalleryIndex {
    persons: HashMap<PersonId, Person>,
    /// Creation order, used for deterministic scans and tie-breaks
    order: Vec<PersonId>,
    /// Retired id -> surviving id
    aliases: HashMap<PersonId, PersonId>,
    labels: LabelAllocator,
    dimension: Option<usize>,
}

impl GalleryIndex {
    fn canonical(&self, id: &PersonId) -> Option<PersonId> {
        let mut current = id;
        // Aliases are kept one hop deep, the bound only guards against cycles.
        for _ in 0..=self.aliases.len() {
            if self.persons.contains_key(current) {
                return Some(current.clone());
            }
            current = self.aliases.get(current)?;
        }
        None
    }

    fn check(&self, embedding: &Embedding) -> std::result::Result<(), EmbeddingError> {
        embedding.validate()?;
        match self.dimension {
            Some(expected) if expected != embedding.len() => Err(EmbeddingError::DimensionMismatch {
                expected,
                got: embedding.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Best matching person at or above `threshold`, applying the camera
    /// stability tie-break.
    fn best_match(
        &self,
        camera_id: &CameraId,
        embedding: &Embedding,
        config: &GalleryConfig,
    ) -> Option<(PersonId, f32)> {
        let mut scored = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let person = &self.persons[id];
            match person.similarity(embedding, config.representative_k) {
                Ok(Some(sim)) if sim >= config.similarity_threshold => scored.push((person, sim)),
                Ok(_) => {}
                Err(err) => {
                    warn!(person = %person.person_id, %err, "skipping person with incompatible embeddings");
                }
            }
        }

        let best = scored.iter().map(|(_, sim)| *sim).reduce(f32::max)?;
        let tied = || scored.iter().filter(|(_, sim)| best - sim <= config.tie_epsilon);
        let chosen = tied()
            .find(|(p, _)| p.cameras.contains(camera_id))
            .or_else(|| tied().next())
            .map(|(p, sim)| (p.person_id.clone(), *sim));
        chosen
    }

    /// Prepare a record loaded from a store for insertion. Invalid embeddings
    /// are dropped; `None` when the remaining ones disagree with the gallery
    /// dimension (e.g. written by a different embedder).
    fn admit(&mut self, mut person: Person) -> Option<Person> {
        // Never hand out a stored label again, even for a rejected record.
        self.labels.observe(&person.label);

        let before = person.embeddings.len();
        person.embeddings.retain(|s| s.embedding.validate().is_ok());
        if person.embeddings.len() < before {
            warn!(
                person = %person.person_id,
                dropped = before - person.embeddings.len(),
                "dropping malformed stored embeddings"
            );
        }

        let expected = self
            .dimension
            .or_else(|| person.embeddings.front().map(|s| s.embedding.len()));
        if let Some(expected) = expected {
            if person.embeddings.iter().any(|s| s.embedding.len() != expected) {
                warn!(person = %person.person_id, expected, "rejecting stored person with incompatible embedding dimension");
                return None;
            }
        }

        person.refresh_centroid();
        Some(person)
    }

    fn insert(&mut self, person: Person) {
        self.labels.observe(&person.label);
        if self.dimension.is_none() {
            self.dimension = person.embeddings.front().map(|s| s.embedding.len());
        }
        self.order.push(person.person_id.clone());
        self.persons.insert(person.person_id.clone(), person);
    }
}

pub struct PersonGallery {
    config: GalleryConfig,
    index: RwLock<GalleryIndex>,
    store: Option<Arc<dyn PersonStore>>,
    sink: Arc<dyn EventSink>,
}

impl PersonGallery {
    pub fn new(config: GalleryConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            index: RwLock::new(GalleryIndex::default()),
            store: None,
            sink: Arc::new(NullSink),
        })
    }

    pub fn with_store(mut self, store: Arc<dyn PersonStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    /// Load every persisted person not already known. Label numbering resumes
    /// after the highest restored label. Returns the number of restored persons.
    pub fn restore_from_store(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let mut persons = store.list_all()?;
        persons.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.label.cmp(&b.label)));

        let mut index = self.index.write();
        let mut restored = 0;
        let mut rejected = 0;
        for person in persons {
            if index.persons.contains_key(&person.person_id) {
                continue;
            }
            match index.admit(person) {
                Some(person) => {
                    index.insert(person);
                    restored += 1;
                }
                None => rejected += 1,
            }
        }
        info!(restored, rejected, "gallery restored from store");
        Ok(restored)
    }

    /// Load a single person from the store, e.g. one written by another
    /// process. Returns `false` when it is already known or incompatible.
    pub fn restore_person(&self, person_id: &PersonId) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let person = store.load(person_id)?;

        let mut index = self.index.write();
        if index.canonical(person_id).is_some() {
            return Ok(false);
        }
        match index.admit(person) {
            Some(person) => {
                info!(person = %person.person_id, label = %person.label, "person restored from store");
                index.insert(person);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Resolve an embedding seen on `camera_id` to a canonical person id.
    pub fn resolve(&self, camera_id: &CameraId, embedding: &Embedding, confidence: f32) -> PersonId {
        self.resolve_at(camera_id, embedding, confidence, Utc::now())
            .person_id
    }

    /// Like [`PersonGallery::resolve`] with an explicit observation time and
    /// the full outcome. Never fails: a malformed embedding yields a new
    /// person that is not seeded with it.
    pub fn resolve_at(
        &self,
        camera_id: &CameraId,
        embedding: &Embedding,
        confidence: f32,
        at: DateTime<Utc>,
    ) -> Resolution {
        let cap = self.config.embedding_cap_per_person;
        let (resolution, change) = {
            let mut index = self.index.write();

            let valid = match index.check(embedding) {
                Ok(()) => true,
                Err(err) => {
                    warn!(camera = %camera_id, %err, "malformed embedding, treating as new person");
                    false
                }
            };
            let matched = if valid {
                index.best_match(camera_id, embedding, &self.config)
            } else {
                None
            };

            let target = match matched {
                Some((id, sim)) => index.persons.get_mut(&id).map(|p| (id, sim, p)),
                None => None,
            };

            match target {
                Some((person_id, similarity, person)) => {
                    person.push_embedding(embedding.clone(), at, cap);
                    person.record_sighting(camera_id, confidence, at);
                    let resolution = Resolution {
                        person_id,
                        label: person.label.clone(),
                        created: false,
                        similarity: Some(similarity),
                    };
                    (resolution, Change::Updated(person.clone()))
                }
                None => {
                    let label = index.labels.allocate();
                    let mut person = Person::new(PersonId::generate(), label, camera_id.clone(), confidence, at);
                    if valid {
                        person.push_embedding(embedding.clone(), at, cap);
                        index.dimension.get_or_insert(embedding.len());
                    }
                    let resolution = Resolution {
                        person_id: person.person_id.clone(),
                        label: person.label.clone(),
                        created: true,
                        similarity: None,
                    };
                    index.order.push(person.person_id.clone());
                    index.persons.insert(person.person_id.clone(), person.clone());
                    (resolution, Change::Created(person))
                }
            }
        };

        match change {
            Change::Created(person) => {
                info!(person = %person.person_id, label = %person.label, camera = %camera_id, "new person");
                self.persist(&person);
                self.sink.on_person_created(&person);
            }
            Change::Updated(person) => {
                self.persist(&person);
                self.sink.on_person_updated(&person);
            }
        }
        resolution
    }

    /// Consolidate `retired` into `keep`. The retired id stays resolvable as
    /// an alias of the surviving record.
    pub fn merge(&self, keep: &PersonId, retired: &PersonId) -> Result<MergeOutcome> {
        let cap = self.config.embedding_cap_per_person;
        let (merged, retired) = {
            let mut index = self.index.write();
            let keep = index
                .canonical(keep)
                .ok_or_else(|| Error::UnknownPerson(keep.clone()))?;
            let retired = index
                .canonical(retired)
                .ok_or_else(|| Error::UnknownPerson(retired.clone()))?;
            if keep == retired {
                return Ok(MergeOutcome::AlreadyMerged);
            }

            let Some(absorbed) = index.persons.remove(&retired) else {
                return Err(Error::UnknownPerson(retired));
            };
            index.order.retain(|id| id != &retired);
            for target in index.aliases.values_mut() {
                if *target == retired {
                    *target = keep.clone();
                }
            }
            index.aliases.insert(retired.clone(), keep.clone());

            let Some(survivor) = index.persons.get_mut(&keep) else {
                return Err(Error::UnknownPerson(keep));
            };
            survivor.absorb(absorbed, cap);
            (survivor.clone(), retired)
        };

        info!(keep = %merged.person_id, retired = %retired, label = %merged.label, "persons merged");
        self.persist(&merged);
        if let Some(store) = &self.store {
            if let Err(err) = store.delete(&retired) {
                warn!(person = %retired, %err, "failed to delete merged person from store");
            }
        }
        self.sink.on_person_updated(&merged);
        Ok(MergeOutcome::Merged)
    }

    /// Surviving id for `person_id`, following merge aliases.
    pub fn canonical_id(&self, person_id: &PersonId) -> Option<PersonId> {
        self.index.read().canonical(person_id)
    }

    pub fn get(&self, person_id: &PersonId) -> Option<Person> {
        let index = self.index.read();
        let id = index.canonical(person_id)?;
        index.persons.get(&id).cloned()
    }

    /// All persons in creation order.
    pub fn snapshot(&self) -> Vec<Person> {
        let index = self.index.read();
        index.order.iter().map(|id| index.persons[id].clone()).collect()
    }

    /// Drop a person from memory, for external expiry and reset policies.
    /// Aliases pointing to it are dropped as well.
    pub fn remove(&self, person_id: &PersonId) -> Option<Person> {
        let mut index = self.index.write();
        let id = index.canonical(person_id)?;
        let person = index.persons.remove(&id)?;
        index.order.retain(|other| other != &id);
        index.aliases.retain(|_, target| target != &id);
        Some(person)
    }

    pub fn len(&self) -> usize {
        self.index.read().persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, person: &Person) {
        if let Some(store) = &self.store {
            match store.save(person) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(person = %person.person_id, visits = person.visit_count, "newer record already stored")
                }
                Err(err) => warn!(person = %person.person_id, %err, "failed to persist person"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::InMemoryPersonStore;

    fn unit(i: usize) -> Embedding {
        let mut v = vec![0.0; 8];
        v[i] = 1.0;
        Embedding::new(v).unwrap()
    }

    fn gallery() -> PersonGallery {
        PersonGallery::new(GalleryConfig::default()).unwrap()
    }

    #[test]
    fn test_resolve_same_embedding_twice() {
        let g = gallery();
        let cam = CameraId::from("cam-1");
        let first = g.resolve(&cam, &unit(0), 0.9);
        let second = g.resolve(&cam, &unit(0), 0.9);
        assert_eq!(first, second);
        assert_eq!(g.len(), 1);
        assert_eq!(g.get(&first).unwrap().visit_count, 2);
    }

    #[test]
    fn test_labels_follow_creation_order() {
        let g = gallery();
        let cam = CameraId::from("cam-1");
        let a = g.resolve_at(&cam, &unit(0), 0.9, Utc::now());
        let b = g.resolve_at(&cam, &unit(1), 0.9, Utc::now());
        assert!(a.created && b.created);
        assert_eq!(a.label, "Visitor-A");
        assert_eq!(b.label, "Visitor-B");
    }

    /// Two persons seen on different cameras and a query equally similar to both.
    fn tied_gallery() -> (PersonGallery, PersonId, PersonId, Embedding) {
        let config = GalleryConfig {
            similarity_threshold: 0.6,
            ..Default::default()
        };
        let g = PersonGallery::new(config).unwrap();
        let a = g.resolve(&CameraId::from("cam-1"), &unit(0), 0.9);
        let b = g.resolve(&CameraId::from("cam-2"), &unit(1), 0.9);

        let mut v = vec![0.0; 8];
        v[0] = 1.0;
        v[1] = 1.0;
        v[2] = 0.2;
        (g, a, b, Embedding::new(v).unwrap())
    }

    #[test]
    fn test_tie_prefers_person_seen_on_camera() {
        let (g, _, b, query) = tied_gallery();
        assert_eq!(g.resolve(&CameraId::from("cam-2"), &query, 0.9), b);

        let (g, a, _, query) = tied_gallery();
        assert_eq!(g.resolve(&CameraId::from("cam-1"), &query, 0.9), a);
    }

    #[test]
    fn test_tie_without_camera_history_picks_earliest() {
        let (g, a, _, query) = tied_gallery();
        assert_eq!(g.resolve(&CameraId::from("cam-3"), &query, 0.9), a);
    }

    #[test]
    fn test_malformed_embedding_creates_unseeded_person() {
        let g = gallery();
        let cam = CameraId::from("cam-1");
        let known = g.resolve(&cam, &unit(0), 0.9);

        let wrong_dim = Embedding::new(vec![1.0, 0.0]).unwrap();
        let created = g.resolve_at(&cam, &wrong_dim, 0.9, Utc::now());
        assert!(created.created);
        assert_ne!(created.person_id, known);
        assert!(g.get(&created.person_id).unwrap().embeddings.is_empty());

        let nan = Embedding::from_raw(vec![f32::NAN; 8]);
        assert!(g.resolve_at(&cam, &nan, 0.9, Utc::now()).created);
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn test_merge_and_alias() {
        let g = gallery();
        let cam1 = CameraId::from("cam-1");
        let cam2 = CameraId::from("cam-2");
        let a = g.resolve(&cam1, &unit(0), 0.9);
        let b = g.resolve(&cam2, &unit(1), 0.9);

        assert_eq!(g.merge(&a, &b).unwrap(), MergeOutcome::Merged);
        assert_eq!(g.merge(&a, &b).unwrap(), MergeOutcome::AlreadyMerged);
        assert_eq!(g.len(), 1);
        assert_eq!(g.canonical_id(&b), Some(a.clone()));

        let merged = g.get(&b).unwrap();
        assert_eq!(merged.person_id, a);
        assert_eq!(merged.visit_count, 2);
        assert_eq!(merged.cameras.len(), 2);

        // The retired appearance now resolves to the survivor.
        assert_eq!(g.resolve(&cam2, &unit(1), 0.9), a);
    }

    #[test]
    fn test_merge_unknown_person() {
        let g = gallery();
        let a = g.resolve(&CameraId::from("c"), &unit(0), 0.9);
        let missing = PersonId::from("missing");
        assert!(matches!(g.merge(&a, &missing), Err(Error::UnknownPerson(id)) if id == missing));
    }

    #[test]
    fn test_store_roundtrip_and_restore() {
        let store = Arc::new(InMemoryPersonStore::new());
        let g = gallery().with_store(store.clone());
        let cam = CameraId::from("cam-1");
        let a = g.resolve(&cam, &unit(0), 0.9);
        g.resolve(&cam, &unit(1), 0.9);
        assert_eq!(store.len(), 2);

        let restored = gallery().with_store(store.clone());
        assert_eq!(restored.restore_from_store().unwrap(), 2);
        assert_eq!(restored.resolve(&cam, &unit(0), 0.9), a);

        let fresh = restored.resolve_at(&cam, &unit(2), 0.9, Utc::now());
        assert_eq!(fresh.label, "Visitor-C");
    }

    #[test]
    fn test_incompatible_stored_person_does_not_block_matching() {
        let g = gallery();
        {
            let mut index = g.index.write();
            let mut broken = Person::new(
                PersonId::from("broken"),
                "Visitor-A".into(),
                CameraId::from("cam-0"),
                0.9,
                Utc::now(),
            );
            broken.push_embedding(Embedding::from_raw(vec![f32::NAN; 8]), Utc::now(), 4);
            index.insert(broken);
        }

        let cam = CameraId::from("cam-1");
        let first = g.resolve_at(&cam, &unit(0), 0.9, Utc::now());
        let second = g.resolve_at(&cam, &unit(0), 0.9, Utc::now());
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.person_id, second.person_id);
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn test_restore_skips_malformed_stored_embeddings() {
        let store = Arc::new(InMemoryPersonStore::new());
        let mut person = Person::new(
            PersonId::from("p"),
            "Visitor-A".into(),
            CameraId::from("cam-1"),
            0.9,
            Utc::now(),
        );
        person.push_embedding(Embedding::from_raw(vec![0.0; 8]), Utc::now(), 4);
        person.push_embedding(unit(3), Utc::now(), 4);
        store.save(&person).unwrap();

        let g = gallery().with_store(store);
        assert_eq!(g.restore_from_store().unwrap(), 1);
        assert_eq!(g.get(&PersonId::from("p")).unwrap().embeddings.len(), 1);
        assert_eq!(g.resolve(&CameraId::from("cam-2"), &unit(3), 0.9), PersonId::from("p"));
    }

    #[test]
    fn test_restore_single_person() {
        let store = Arc::new(InMemoryPersonStore::new());
        let writer = gallery().with_store(store.clone());
        let a = writer.resolve(&CameraId::from("cam-1"), &unit(0), 0.9);

        let reader = gallery().with_store(store);
        assert!(reader.restore_person(&a).unwrap());
        assert!(!reader.restore_person(&a).unwrap());
        assert!(matches!(
            reader.restore_person(&PersonId::from("missing")),
            Err(Error::Store(_))
        ));
        assert_eq!(reader.resolve(&CameraId::from("cam-2"), &unit(0), 0.9), a);
    }

    #[test]
    fn test_remove_drops_aliases() {
        let g = gallery();
        let cam = CameraId::from("cam-1");
        let a = g.resolve(&cam, &unit(0), 0.9);
        let b = g.resolve(&cam, &unit(1), 0.9);
        g.merge(&a, &b).unwrap();
        assert!(g.remove(&b).is_some());
        assert!(g.canonical_id(&a).is_none());
        assert!(g.canonical_id(&b).is_none());
        assert!(g.is_empty());
    }
}
