//! Persistence boundary for person records.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

use crate::ids::PersonId;
use crate::reid::Person;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("person `{0}` not found in store")]
    NotFound(PersonId),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("failed to (de)serialize person: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value persistence for person records.
///
/// Expiry (TTL) is the store's policy; the core only saves, loads, lists and
/// deletes. Implementations must be safe to call from several camera loops.
///
/// Saves may arrive out of order when several loops update one person.
/// `visit_count` only grows, so `save` must ignore a record whose
/// `visit_count` is lower than the stored one.
pub trait PersonStore: Send + Sync {
    /// Store `person` unless a newer version is already present. Returns
    /// whether the record was written.
    fn save(&self, person: &Person) -> Result<bool, StoreError>;

    fn load(&self, person_id: &PersonId) -> Result<Person, StoreError>;

    fn list_all(&self) -> Result<Vec<Person>, StoreError>;

    fn delete(&self, person_id: &PersonId) -> Result<(), StoreError>;
}

#[derive(Debug)]
struct Document {
    visit_count: u64,
    json: String,
}

/// Process-local store keeping JSON documents keyed by person id, the same
/// shape a remote key-value store would hold.
#[derive(Debug, Default)]
pub struct InMemoryPersonStore {
    documents: RwLock<HashMap<PersonId, Document>>,
}

impl InMemoryPersonStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

impl PersonStore for InMemoryPersonStore {
    fn save(&self, person: &Person) -> Result<bool, StoreError> {
        let json = serde_json::to_string(person)?;
        let mut documents = self.documents.write();
        if let Some(stored) = documents.get(&person.person_id) {
            if stored.visit_count > person.visit_count {
                return Ok(false);
            }
        }
        documents.insert(
            person.person_id.clone(),
            Document {
                visit_count: person.visit_count,
                json,
            },
        );
        Ok(true)
    }

    fn load(&self, person_id: &PersonId) -> Result<Person, StoreError> {
        let documents = self.documents.read();
        let document = documents
            .get(person_id)
            .ok_or_else(|| StoreError::NotFound(person_id.clone()))?;
        Ok(serde_json::from_str(&document.json)?)
    }

    fn list_all(&self) -> Result<Vec<Person>, StoreError> {
        self.documents
            .read()
            .values()
            .map(|document| serde_json::from_str(&document.json).map_err(StoreError::from))
            .collect()
    }

    fn delete(&self, person_id: &PersonId) -> Result<(), StoreError> {
        self.documents.write().remove(person_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::ids::CameraId;

    fn person(visits: u64) -> Person {
        let mut person = Person::new(
            PersonId::from("p"),
            "Visitor-A".to_owned(),
            CameraId::from("cam-1"),
            0.9,
            Utc::now(),
        );
        person.visit_count = visits;
        person
    }

    #[test]
    fn test_stale_save_is_ignored() {
        let store = InMemoryPersonStore::new();
        assert!(store.save(&person(6)).unwrap());
        assert!(!store.save(&person(5)).unwrap());
        assert_eq!(store.load(&PersonId::from("p")).unwrap().visit_count, 6);

        assert!(store.save(&person(7)).unwrap());
        assert_eq!(store.load(&PersonId::from("p")).unwrap().visit_count, 7);
    }

    #[test]
    fn test_same_version_overwrites() {
        let store = InMemoryPersonStore::new();
        store.save(&person(3)).unwrap();
        let mut update = person(3);
        update.avg_confidence = 0.5;
        assert!(store.save(&update).unwrap());
        assert_eq!(store.load(&PersonId::from("p")).unwrap().avg_confidence, 0.5);
    }

    #[test]
    fn test_load_missing_and_delete() {
        let store = InMemoryPersonStore::new();
        assert!(matches!(
            store.load(&PersonId::from("p")),
            Err(StoreError::NotFound(_))
        ));
        store.save(&person(1)).unwrap();
        store.delete(&PersonId::from("p")).unwrap();
        assert!(store.is_empty());
    }
}
