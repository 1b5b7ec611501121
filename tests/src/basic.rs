//! Core scenarios exercised against the public byte-level API: empty-open, single insert/remove,
//! overwrite-via-put, put-if-absent, conditional replace, round-trip idempotence, and the size
//! law.
use tempfile::tempdir;
use vellum::{Config, Engine};

fn open(path: &std::path::Path) -> Engine {
    Engine::open(Config::new(path)).unwrap()
}

#[test]
fn scenario_empty_open() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    assert_eq!(engine.len(), 0);
    assert_eq!(engine.get(&[0x01]).unwrap(), None);
}

#[test]
fn scenario_single_insert_remove() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    assert_eq!(engine.put(&[0x01], &[0xAA]).unwrap(), None);
    assert_eq!(engine.get(&[0x01]).unwrap(), Some(vec![0xAA]));
    assert_eq!(engine.remove(&[0x01]).unwrap(), Some(vec![0xAA]));
    assert_eq!(engine.get(&[0x01]).unwrap(), None);
    assert_eq!(engine.len(), 0);
}

#[test]
fn scenario_replace_existing() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    engine.put(&[0x01], &[0xAA]).unwrap();
    assert_eq!(engine.put(&[0x01], &[0xBB]).unwrap(), Some(vec![0xAA]));
    assert_eq!(engine.get(&[0x01]).unwrap(), Some(vec![0xBB]));
    assert_eq!(engine.len(), 1);
}

#[test]
fn scenario_put_if_absent() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    assert_eq!(engine.put_if_absent(&[0x01], &[0xAA]).unwrap(), None);
    assert_eq!(
        engine.put_if_absent(&[0x01], &[0xBB]).unwrap(),
        Some(vec![0xAA])
    );
    assert_eq!(engine.get(&[0x01]).unwrap(), Some(vec![0xAA]));
}

#[test]
fn scenario_conditional_replace_fail() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    engine.put(&[0x01], &[0xAA]).unwrap();
    assert!(!engine.replace_if(&[0x01], &[0xCC], &[0xBB]).unwrap());
    assert_eq!(engine.get(&[0x01]).unwrap(), Some(vec![0xAA]));
}

#[test]
fn round_trip_and_idempotence() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    engine.put(b"k", b"v1").unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v1".to_vec()));

    assert_eq!(engine.put(b"k", b"v1").unwrap(), Some(b"v1".to_vec()));
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v1".to_vec()));
    assert_eq!(engine.len(), 1);
}

#[test]
fn absence_after_put_then_remove() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    engine.put(b"k", b"v").unwrap();
    engine.remove(b"k").unwrap();
    assert_eq!(engine.get(b"k").unwrap(), None);
}

#[test]
fn size_law_tracks_distinct_keys() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path());
    for i in 0..30u32 {
        engine.put(&i.to_be_bytes(), &[0]).unwrap();
    }
    // Overwriting existing keys must not change size.
    for i in 0..15u32 {
        engine.put(&i.to_be_bytes(), &[1]).unwrap();
    }
    assert_eq!(engine.len(), 30);
    for i in 0..10u32 {
        engine.remove(&i.to_be_bytes()).unwrap();
    }
    assert_eq!(engine.len(), 20);
}
