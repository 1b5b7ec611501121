//! The secondary file header: the first 40 bytes of the secondary file, backing five shared
//! atomics. `HEADER_SIZE` also marks the start of allocatable record space.
//!
//! `old_table_length` exists because `rehash_complete == 0` alone cannot tell "steady, no rehash
//! ever started" apart from "a rehash was just initiated and 0 buckets have been split yet" (both
//! states leave every other field unchanged). `old_table_length` is 0 in the former and
//! `table_length / 2` in the latter, so it doubles as the "is a rehash in progress" flag that the
//! trigger/redirect logic needs.
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::mapper::FileMapper;

pub const HEADER_SIZE: u64 = 40;

const SIZE_OFF: u64 = 0;
const TABLE_LENGTH_OFF: u64 = 8;
const SECONDARY_WRITE_POS_OFF: u64 = 16;
const REHASH_COMPLETE_OFF: u64 = 24;
const OLD_TABLE_LENGTH_OFF: u64 = 32;

/// Live in-memory mirror of the secondary file header, kept coherent with the mmap'd bytes.
pub struct Header {
    pub size: AtomicU64,
    pub table_length: AtomicU64,
    pub secondary_write_pos: AtomicU64,
    pub rehash_complete: AtomicU64,
    /// 0 when steady; otherwise the bucket count a rehash is splitting down from.
    pub old_table_length: AtomicU64,
}

impl Header {
    /// Loads the header from `mapper`, applying the recovery rules for a freshly zeroed file:
    /// if `table_length == 0` it is derived from the primary file's length; if
    /// `secondary_write_pos == 0` it is set to just past the header.
    pub fn load(mapper: &FileMapper, primary_len: u64) -> Result<Self> {
        let size = mapper.get_long(SIZE_OFF)?;
        let mut table_length = mapper.get_long(TABLE_LENGTH_OFF)?;
        let mut secondary_write_pos = mapper.get_long(SECONDARY_WRITE_POS_OFF)?;
        let rehash_complete = mapper.get_long(REHASH_COMPLETE_OFF)?;
        let old_table_length = mapper.get_long(OLD_TABLE_LENGTH_OFF)?;

        if table_length == 0 {
            table_length = (primary_len / 8).max(1).next_power_of_two();
        }
        if secondary_write_pos == 0 {
            secondary_write_pos = HEADER_SIZE;
        }

        let header = Self {
            size: AtomicU64::new(size),
            table_length: AtomicU64::new(table_length),
            secondary_write_pos: AtomicU64::new(secondary_write_pos),
            rehash_complete: AtomicU64::new(rehash_complete),
            old_table_length: AtomicU64::new(old_table_length),
        };
        header.persist(mapper)?;
        Ok(header)
    }

    /// Writes all five fields back to the mmap'd header region.
    pub fn persist(&self, mapper: &FileMapper) -> Result<()> {
        mapper.put_long(SIZE_OFF, self.size.load(Ordering::SeqCst))?;
        mapper.put_long(TABLE_LENGTH_OFF, self.table_length.load(Ordering::SeqCst))?;
        mapper.put_long(
            SECONDARY_WRITE_POS_OFF,
            self.secondary_write_pos.load(Ordering::SeqCst),
        )?;
        mapper.put_long(
            REHASH_COMPLETE_OFF,
            self.rehash_complete.load(Ordering::SeqCst),
        )?;
        mapper.put_long(
            OLD_TABLE_LENGTH_OFF,
            self.old_table_length.load(Ordering::SeqCst),
        )?;
        Ok(())
    }

    pub fn persist_size(&self, mapper: &FileMapper) -> Result<()> {
        mapper.put_long(SIZE_OFF, self.size.load(Ordering::SeqCst))
    }

    pub fn persist_table_length(&self, mapper: &FileMapper) -> Result<()> {
        mapper.put_long(TABLE_LENGTH_OFF, self.table_length.load(Ordering::SeqCst))
    }

    pub fn persist_secondary_write_pos(&self, mapper: &FileMapper) -> Result<()> {
        mapper.put_long(
            SECONDARY_WRITE_POS_OFF,
            self.secondary_write_pos.load(Ordering::SeqCst),
        )
    }

    pub fn persist_rehash_complete(&self, mapper: &FileMapper) -> Result<()> {
        mapper.put_long(
            REHASH_COMPLETE_OFF,
            self.rehash_complete.load(Ordering::SeqCst),
        )
    }

    pub fn persist_old_table_length(&self, mapper: &FileMapper) -> Result<()> {
        mapper.put_long(
            OLD_TABLE_LENGTH_OFF,
            self.old_table_length.load(Ordering::SeqCst),
        )
    }

    /// True while a rehash is splitting buckets into the doubled table.
    pub fn is_rehashing(&self) -> bool {
        self.old_table_length.load(Ordering::SeqCst) != 0
    }
}
