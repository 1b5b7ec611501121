//! The bucket table core: the primary file, one 8-byte slot per bucket holding the secondary
//! offset of the chain head (0 = empty).
use crate::error::Result;
use crate::mapper::FileMapper;

pub struct BucketTable<'a> {
    mapper: &'a FileMapper,
}

impl<'a> BucketTable<'a> {
    pub fn new(mapper: &'a FileMapper) -> Self {
        Self { mapper }
    }

    #[inline]
    fn slot_offset(idx: u64) -> u64 {
        idx * 8
    }

    /// Reads bucket `idx`'s chain-head offset, or 0 if empty.
    pub fn get(&self, idx: u64) -> Result<u64> {
        self.mapper.get_long(Self::slot_offset(idx))
    }

    /// Sets bucket `idx`'s chain-head offset.
    pub fn set(&self, idx: u64, head: u64) -> Result<()> {
        self.mapper.put_long(Self::slot_offset(idx), head)
    }

    /// Grows the primary file to hold `new_table_length` buckets. New slots are zero
    /// (empty) because the OS zero-fills newly extended file regions.
    pub fn grow_to(&self, new_table_length: u64) -> Result<()> {
        self.mapper.grow(new_table_length * 8)
    }
}
