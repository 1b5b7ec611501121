//! A persistent, concurrent, disk-backed hash map from opaque byte strings to opaque byte
//! strings, backed by two memory-mapped files: a fixed-width bucket table (`primary`) and an
//! append-only file of variable-size collision-chain records (`secondary`). See [`Engine`] for
//! the public surface and the module docs below for each component's role.
//!
//! Supports concurrent readers and writers within a single process, incremental (amortized)
//! table doubling, and crash-free operation while the process runs; durability is best-effort
//! via the OS page cache, not a write-ahead log.

/// Configuration accepted by [`Engine::open`].
pub mod config;
/// Error and result types.
pub mod error;
/// The Hasher component: a stable, non-cryptographic 64-bit byte-string hash.
pub mod hash;
/// The typed-key wrapper and its built-in codecs.
pub mod typed;

mod alloc;
mod bucket;
mod engine;
mod header;
mod mapper;
mod record;
mod stripe;

pub use config::Config;
pub use engine::{Engine, Iter};
pub use error::{Error, Result};
