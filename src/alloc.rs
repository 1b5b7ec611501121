//! The secondary allocator: hands out contiguous regions of the secondary file by bumping a
//! shared write cursor, growing the file as needed.
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::Result;
use crate::mapper::FileMapper;

/// Smallest size the secondary file grows to on its first allocation past the header.
const MIN_SECONDARY_FILE_LEN: u64 = 4096;

pub struct Allocator<'a> {
    mapper: &'a FileMapper,
    cursor: &'a AtomicU64,
    /// Serializes the (rare) grow path across every caller; the cursor bump itself is lock-free.
    /// Must outlive any single `Allocator` instance (owned by the engine), or concurrent callers
    /// each get their own uncontended lock and the grow path is no longer serialized at all.
    grow_lock: &'a Mutex<()>,
}

impl<'a> Allocator<'a> {
    pub fn new(mapper: &'a FileMapper, cursor: &'a AtomicU64, grow_lock: &'a Mutex<()>) -> Self {
        Self {
            mapper,
            cursor,
            grow_lock,
        }
    }

    /// Reserves `size` contiguous bytes and returns the offset of the first one. The caller must
    /// write the record there before publishing the offset into any chain pointer or bucket
    /// slot.
    ///
    /// The reserved range never straddles two of the mapper's mmap segments. [`FileMapper::grow`]
    /// appends a disjoint segment rather than extending the existing one, and every mapper
    /// accessor requires its whole byte range to lie within a single segment — so a naive bump
    /// allocation that happened to cross a grow boundary would have part of its bytes readable
    /// only through one segment and part only through the next, and any record whose fields
    /// straddled that boundary would fail with a spurious `Error::Corrupt`. When a candidate
    /// range would straddle an already-mapped segment boundary, the gap up to that boundary is
    /// wasted (becomes unreachable garbage, same as any superseded record) and the allocation is
    /// retried starting at the boundary.
    pub fn allocate(&self, size: u64) -> Result<u64> {
        loop {
            let old_pos = self.cursor.load(Ordering::SeqCst);
            let mut start = old_pos;
            while let Some(end) = self.mapper.segment_end(start) {
                if start + size <= end {
                    break;
                }
                start = end;
            }
            let target = start + size;

            if self
                .cursor
                .compare_exchange(old_pos, target, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                continue;
            }

            if target > self.mapper.len() {
                let _guard = self.grow_lock.lock();
                // Re-check: another thread may have already grown far enough while we waited.
                if target > self.mapper.len() {
                    let grow_target = target.max(MIN_SECONDARY_FILE_LEN).next_power_of_two();
                    self.mapper.grow(grow_target)?;
                }
            }

            return Ok(start);
        }
    }
}
