use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

use roomtrack_rs::{
    CameraId, Embedding, GalleryConfig, InMemoryPersonStore, MergeOutcome, PersonGallery, PersonStore,
};

const DIM: usize = 16;

fn one_hot(i: usize) -> Embedding {
    let mut v = vec![0.0; DIM];
    v[i] = 1.0;
    Embedding::new(v).unwrap()
}

/// Unit vector with cosine similarity `cos` to `one_hot(0)`.
fn at_similarity(cos: f32) -> Embedding {
    let mut v = vec![0.0; DIM];
    v[0] = cos;
    v[1] = (1.0 - cos * cos).sqrt();
    Embedding::new(v).unwrap()
}

fn gallery() -> PersonGallery {
    PersonGallery::new(GalleryConfig::default()).unwrap()
}

#[test]
fn test_resolve_is_idempotent() {
    let gallery = gallery();
    let cam = CameraId::from("cam-1");
    let first = gallery.resolve(&cam, &one_hot(3), 0.9);
    for _ in 0..5 {
        assert_eq!(gallery.resolve(&cam, &one_hot(3), 0.9), first);
    }
    assert_eq!(gallery.len(), 1);
    assert_eq!(gallery.get(&first).unwrap().visit_count, 6);
}

#[test]
fn test_below_threshold_creates_new_person() {
    let threshold = GalleryConfig::default().similarity_threshold;
    for cos in [0.0, 0.3, 0.6, threshold - 0.02] {
        let gallery = gallery();
        let cam = CameraId::from("cam-1");
        let base = gallery.resolve(&cam, &one_hot(0), 0.9);
        let resolution = gallery.resolve_at(&cam, &at_similarity(cos), 0.9, chrono::Utc::now());
        assert!(resolution.created, "similarity {cos} should not match");
        assert_ne!(resolution.person_id, base);
        assert_eq!(gallery.len(), 2);
    }
}

#[test]
fn test_above_threshold_matches_existing_person() {
    let threshold = GalleryConfig::default().similarity_threshold;
    let gallery = gallery();
    let cam = CameraId::from("cam-1");
    let base = gallery.resolve(&cam, &one_hot(0), 0.9);
    let resolution = gallery.resolve_at(&cam, &at_similarity(threshold + 0.05), 0.9, chrono::Utc::now());
    assert!(!resolution.created);
    assert_eq!(resolution.person_id, base);
}

#[test]
fn test_same_person_across_cameras() {
    let gallery = gallery();
    let a = gallery.resolve(&CameraId::from("cam-1"), &one_hot(2), 0.8);
    let b = gallery.resolve(&CameraId::from("cam-2"), &one_hot(2), 0.8);
    assert_eq!(a, b);

    let person = gallery.get(&a).unwrap();
    let cameras: Vec<&str> = person.cameras.iter().map(|c| c.as_str()).collect();
    assert_eq!(cameras, ["cam-1", "cam-2"]);
}

#[test]
fn test_concurrent_distinct_people_get_distinct_ids() {
    let gallery = Arc::new(gallery());
    let barrier = Arc::new(Barrier::new(DIM));

    let handles: Vec<_> = (0..DIM)
        .map(|i| {
            let gallery = Arc::clone(&gallery);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let cam = CameraId::new(format!("cam-{i}"));
                barrier.wait();
                gallery.resolve(&cam, &one_hot(i), 0.9)
            })
        })
        .collect();

    let ids: BTreeSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), DIM);
    assert_eq!(gallery.len(), DIM);

    let labels: BTreeSet<String> = gallery.snapshot().into_iter().map(|p| p.label).collect();
    assert_eq!(labels.len(), DIM);
}

#[test]
fn test_concurrent_same_person_is_created_once() {
    let threads = 8;
    let gallery = Arc::new(gallery());
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let gallery = Arc::clone(&gallery);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let cam = CameraId::new(format!("cam-{i}"));
                barrier.wait();
                gallery.resolve(&cam, &one_hot(5), 0.9)
            })
        })
        .collect();

    let ids: BTreeSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(gallery.len(), 1);

    let person = gallery.snapshot().remove(0);
    assert_eq!(person.visit_count, threads as u64);
    assert_eq!(person.cameras.len(), threads);
}

#[test]
fn test_merge_is_idempotent_and_commutes_with_aliases() {
    let gallery = gallery();
    let cam = CameraId::from("cam-1");
    let a = gallery.resolve(&cam, &one_hot(0), 0.9);
    let b = gallery.resolve(&cam, &one_hot(1), 0.9);

    assert_eq!(gallery.merge(&a, &b).unwrap(), MergeOutcome::Merged);
    assert_eq!(gallery.merge(&a, &b).unwrap(), MergeOutcome::AlreadyMerged);
    assert_eq!(gallery.merge(&b, &a).unwrap(), MergeOutcome::AlreadyMerged);

    assert_eq!(gallery.len(), 1);
    assert_eq!(gallery.canonical_id(&b), Some(a.clone()));

    // Both appearance histories stay matchable after the merge.
    assert_eq!(gallery.resolve(&cam, &one_hot(1), 0.9), a);
    assert_eq!(gallery.resolve(&cam, &one_hot(0), 0.9), a);
}

#[test]
fn test_store_round_trip_resumes_labels() {
    let store = Arc::new(InMemoryPersonStore::new());
    let cam = CameraId::from("cam-1");

    let first = gallery().with_store(store.clone());
    let a = first.resolve(&cam, &one_hot(0), 0.9);
    first.resolve(&cam, &one_hot(1), 0.9);
    assert_eq!(store.list_all().unwrap().len(), 2);

    let second = gallery().with_store(store.clone());
    assert_eq!(second.restore_from_store().unwrap(), 2);
    assert_eq!(second.resolve(&cam, &one_hot(0), 0.9), a);

    let third = second.resolve_at(&cam, &one_hot(2), 0.9, chrono::Utc::now());
    assert!(third.created);
    assert_eq!(third.label, "Visitor-C");
}

#[test]
fn test_restore_ignores_records_from_another_embedder() {
    let store = Arc::new(InMemoryPersonStore::new());
    let t0 = chrono::Utc::now();
    let small = |i: usize| {
        let mut v = vec![0.0; 4];
        v[i] = 1.0;
        Embedding::new(v).unwrap()
    };

    // Written by an older 4-d embedder, then by the current 16-d one.
    let old = gallery().with_store(store.clone());
    let kept = old.resolve_at(&CameraId::from("cam-1"), &small(1), 0.9, t0).person_id;
    let new = gallery().with_store(store.clone());
    let later = t0 + chrono::Duration::seconds(1);
    new.resolve_at(&CameraId::from("cam-1"), &one_hot(0), 0.9, later);
    let b = new.resolve_at(&CameraId::from("cam-1"), &one_hot(1), 0.9, later);
    assert_eq!(b.label, "Visitor-B");
    assert_eq!(store.len(), 3);

    let restored = gallery().with_store(store.clone());
    assert_eq!(restored.restore_from_store().unwrap(), 1);
    for _ in 0..5 {
        assert_eq!(restored.resolve(&CameraId::from("cam-2"), &small(1), 0.9), kept);
    }
    assert_eq!(restored.len(), 1);

    // Labels of rejected records are not handed out again.
    let fresh = restored.resolve_at(&CameraId::from("cam-2"), &small(3), 0.9, chrono::Utc::now());
    assert_eq!(fresh.label, "Visitor-C");
}

#[test]
fn test_concurrent_updates_leave_newest_record_in_store() {
    let threads = 8;
    let rounds = 20;
    let store = Arc::new(InMemoryPersonStore::new());
    let gallery = Arc::new(gallery().with_store(store.clone()));
    let id = gallery.resolve(&CameraId::from("cam-0"), &one_hot(7), 0.9);
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let gallery = Arc::clone(&gallery);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let cam = CameraId::new(format!("cam-{i}"));
                barrier.wait();
                for _ in 0..rounds {
                    gallery.resolve(&cam, &one_hot(7), 0.9);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected = 1 + (threads * rounds) as u64;
    assert_eq!(gallery.get(&id).unwrap().visit_count, expected);
    assert_eq!(store.load(&id).unwrap().visit_count, expected);
}
