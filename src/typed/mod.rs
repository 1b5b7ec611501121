//! The typed-key wrapper: a generic adapter over the byte-level [`crate::engine::Engine`] that
//! serializes/deserializes application `K`/`V` types through a [`Codec`] pair, forwarding every
//! call unchanged.
pub mod codec;

pub use codec::Codec;

use std::marker::PhantomData;

use crate::engine::Engine;
use crate::error::Result;

/// Forwards every operation to an underlying byte-level [`Engine`], encoding/decoding `K` and `V`
/// through their [`Codec`] implementations at the boundary.
pub struct TypedMap<K, V> {
    engine: Engine,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> TypedMap<K, V>
where
    K: Codec,
    V: Codec,
{
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            _marker: PhantomData,
        }
    }

    pub fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.engine.get(&key.encode())?.map(|b| V::decode(&b)))
    }

    pub fn put(&self, key: &K, value: &V) -> Result<Option<V>> {
        Ok(self
            .engine
            .put(&key.encode(), &value.encode())?
            .map(|b| V::decode(&b)))
    }

    pub fn put_if_absent(&self, key: &K, value: &V) -> Result<Option<V>> {
        Ok(self
            .engine
            .put_if_absent(&key.encode(), &value.encode())?
            .map(|b| V::decode(&b)))
    }

    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        Ok(self.engine.remove(&key.encode())?.map(|b| V::decode(&b)))
    }

    pub fn remove_if(&self, key: &K, value: &V) -> Result<bool> {
        self.engine.remove_if(&key.encode(), &value.encode())
    }

    pub fn replace(&self, key: &K, value: &V) -> Result<Option<V>> {
        Ok(self
            .engine
            .replace(&key.encode(), &value.encode())?
            .map(|b| V::decode(&b)))
    }

    pub fn replace_if(&self, key: &K, old_value: &V, new_value: &V) -> Result<bool> {
        self.engine
            .replace_if(&key.encode(), &old_value.encode(), &new_value.encode())
    }

    pub fn len(&self) -> u64 {
        self.engine.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engine.is_empty()
    }

    /// Decoded `(key, value)` pairs over every entry; see [`Engine::iter`] for the consistency
    /// contract this inherits.
    pub fn iter(&self) -> impl Iterator<Item = Result<(K, V)>> + '_ {
        self.engine
            .iter()
            .map(|r| r.map(|(k, v)| (K::decode(&k), V::decode(&v))))
    }

    pub fn close(&self) -> Result<()> {
        self.engine.close()
    }
}
