//! The record codec: chain nodes in the secondary file.
//!
//! ```text
//! | hash: 8B | next_record_pos: 8B | key_len: 4B | key | val_len: 4B | val |
//! ```
use crate::error::Result;
use crate::mapper::FileMapper;

const HASH_OFF: u64 = 0;
const NEXT_OFF: u64 = 8;
const KEY_LEN_OFF: u64 = 16;
const KEY_OFF: u64 = 20;

/// An owned, in-memory view of a record read from the secondary file.
#[derive(Clone, Debug)]
pub struct Record {
    pub pos: u64,
    pub hash: u64,
    pub next_record_pos: u64,
    pub key: Vec<u8>,
    pub val: Vec<u8>,
}

impl Record {
    pub fn new(hash: u64, key: Vec<u8>, val: Vec<u8>) -> Self {
        Self {
            pos: 0,
            hash,
            next_record_pos: 0,
            key,
            val,
        }
    }

    /// Total on-disk size this record occupies once written.
    pub fn encoded_len(&self) -> u64 {
        24 + self.key.len() as u64 + self.val.len() as u64
    }

    /// Reads the record at `pos`. `pos` must point at a previously-written record.
    pub fn read(mapper: &FileMapper, pos: u64) -> Result<Self> {
        let hash = mapper.get_long(pos + HASH_OFF)?;
        let next_record_pos = mapper.get_long(pos + NEXT_OFF)?;
        let key_len = mapper.get_long(pos + KEY_LEN_OFF)? as u32 as u64;
        let key = mapper.get_bytes(pos + KEY_OFF, key_len)?;
        let val_len_off = pos + KEY_OFF + key_len;
        let val_len = mapper.get_long(val_len_off)? as u32 as u64;
        let val = mapper.get_bytes(val_len_off + 4, val_len)?;

        Ok(Self {
            pos,
            hash,
            next_record_pos,
            key,
            val,
        })
    }

    /// Writes all fields of this record at `pos`. The caller must have already reserved
    /// `self.encoded_len()` bytes starting at `pos` from the allocator.
    pub fn write(&self, mapper: &FileMapper, pos: u64) -> Result<()> {
        mapper.put_long(pos + HASH_OFF, self.hash)?;
        mapper.put_long(pos + NEXT_OFF, self.next_record_pos)?;
        mapper.put_long(pos + KEY_LEN_OFF, self.key.len() as u64)?;
        mapper.put_bytes(pos + KEY_OFF, &self.key)?;
        let val_len_off = pos + KEY_OFF + self.key.len() as u64;
        mapper.put_long(val_len_off, self.val.len() as u64)?;
        mapper.put_bytes(val_len_off + 4, &self.val)?;
        Ok(())
    }

    /// Key length stored at `pos`, without reading the key or value bytes.
    fn key_len_at(mapper: &FileMapper, pos: u64) -> Result<u64> {
        Ok(mapper.get_long(pos + KEY_LEN_OFF)? as u32 as u64)
    }

    pub fn next_record_pos_at(mapper: &FileMapper, pos: u64) -> Result<u64> {
        mapper.get_long(pos + NEXT_OFF)
    }

    /// Reads only `hash` and `next_record_pos`, enough to drive a rehash split without copying
    /// the key or value bytes.
    pub fn hash_and_next_at(mapper: &FileMapper, pos: u64) -> Result<(u64, u64)> {
        let hash = mapper.get_long(pos + HASH_OFF)?;
        let next = mapper.get_long(pos + NEXT_OFF)?;
        Ok((hash, next))
    }

    /// Mutates only the `next_record_pos` field of the record at `pos`. This is the sole field
    /// allowed to mutate in place after the record has been written.
    pub fn set_next_record_pos(mapper: &FileMapper, pos: u64, new_next: u64) -> Result<()> {
        mapper.put_long(pos + NEXT_OFF, new_next)
    }

    /// True iff the record at `pos` has the given `hash` and `key` bytes. Hash comparison
    /// short-circuits the (more expensive) key byte comparison for most mismatches.
    pub fn key_equals_at(mapper: &FileMapper, pos: u64, hash: u64, key: &[u8]) -> Result<bool> {
        let stored_hash = mapper.get_long(pos + HASH_OFF)?;
        if stored_hash != hash {
            return Ok(false);
        }
        let key_len = Self::key_len_at(mapper, pos)?;
        if key_len != key.len() as u64 {
            return Ok(false);
        }
        let stored_key = mapper.get_bytes(pos + KEY_OFF, key_len)?;
        Ok(stored_key == key)
    }
}
