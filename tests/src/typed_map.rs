//! Typed wrapper contract: forwards every call to the byte-level engine, with structural
//! equality against an in-memory reference map holding entry-for-entry.
use std::collections::HashMap;

use tempfile::tempdir;
use vellum::typed::TypedMap;
use vellum::{Config, Engine};

#[test]
fn typed_u64_to_string_matches_reference() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(Config::new(dir.path())).unwrap();
    let map: TypedMap<u64, String> = TypedMap::new(engine);
    let mut reference: HashMap<u64, String> = HashMap::new();

    for i in 0..100u64 {
        let v = format!("v{}", i);
        assert_eq!(map.put(&i, &v).unwrap(), None);
        reference.insert(i, v);
    }
    assert_eq!(
        map.put(&5, &"overwritten".to_string()).unwrap(),
        Some("v5".to_string())
    );
    reference.insert(5, "overwritten".to_string());

    assert!(map.remove(&10).unwrap().is_some());
    reference.remove(&10);

    assert_eq!(map.len(), reference.len() as u64);
    for (k, v) in &reference {
        assert_eq!(map.get(k).unwrap().as_ref(), Some(v));
    }

    let mut iterated: HashMap<u64, String> = HashMap::new();
    for pair in map.iter() {
        let (k, v) = pair.unwrap();
        iterated.insert(k, v);
    }
    assert_eq!(iterated, reference);
}

#[test]
fn typed_replace_if_round_trip() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(Config::new(dir.path())).unwrap();
    let map: TypedMap<String, i64> = TypedMap::new(engine);

    map.put(&"counter".to_string(), &1).unwrap();
    assert!(!map
        .replace_if(&"counter".to_string(), &99, &2)
        .unwrap());
    assert_eq!(map.get(&"counter".to_string()).unwrap(), Some(1));

    assert!(map.replace_if(&"counter".to_string(), &1, &2).unwrap());
    assert_eq!(map.get(&"counter".to_string()).unwrap(), Some(2));
}
