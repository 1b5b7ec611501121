//! Concurrent correctness: under N threads applying random operations, the final entry set
//! must equal that of a linearizable reference map receiving the same multiset of operations.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use rand::Rng;
use tempfile::tempdir;
use vellum::{Config, Engine};

const THREADS: u32 = 6;
const OPS_PER_THREAD: u32 = 2_000;
const DISTINCT_KEYS: u32 = 200;

#[test]
fn concurrent_mixed_workload_matches_reference() {
    let dir = tempdir().unwrap();
    let engine = Arc::new(
        Engine::open(
            Config::new(dir.path())
                .with_initial_primary_file_length(16 * 8)
                .with_lock_stripe_count(16),
        )
        .unwrap(),
    );
    let reference = Arc::new(Mutex::new(HashMap::<u32, u32>::new()));

    let mut handles = Vec::new();
    for _ in 0..THREADS {
        let engine = engine.clone();
        let reference = reference.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            for _ in 0..OPS_PER_THREAD {
                let key: u32 = rng.gen_range(0, DISTINCT_KEYS);
                let kb = key.to_be_bytes();
                let mut reference = reference.lock().unwrap();
                match rng.gen_range(0, 4) {
                    0 => {
                        let val: u32 = rng.gen();
                        engine.put(&kb, &val.to_be_bytes()).unwrap();
                        reference.insert(key, val);
                    }
                    1 => {
                        engine.remove(&kb).unwrap();
                        reference.remove(&key);
                    }
                    2 => {
                        let val: u32 = rng.gen();
                        engine.put_if_absent(&kb, &val.to_be_bytes()).unwrap();
                        reference.entry(key).or_insert(val);
                    }
                    _ => {
                        let _ = engine.get(&kb).unwrap();
                    }
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let reference = reference.lock().unwrap();
    assert_eq!(engine.len(), reference.len() as u64);
    for (k, v) in reference.iter() {
        assert_eq!(
            engine.get(&k.to_be_bytes()).unwrap(),
            Some(v.to_be_bytes().to_vec())
        );
    }
}
