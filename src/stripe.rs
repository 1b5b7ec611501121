//! The lock stripe: a fixed array of mutexes selected by the low bits of a key's hash. Chosen the
//! same way `idx_for_hash` chooses a bucket, so a bucket and its eventual rehash partner always
//! share a stripe provided `lock_stripe_count <= table_length`.
use parking_lot::{Mutex, MutexGuard};

pub struct LockStripe {
    stripes: Vec<Mutex<()>>,
    mask: u64,
}

impl LockStripe {
    /// `count` must be a power of two; callers validate this via [`crate::config::Config`].
    pub fn new(count: usize) -> Self {
        debug_assert!(count.is_power_of_two());
        let mut stripes = Vec::with_capacity(count);
        stripes.resize_with(count, || Mutex::new(()));
        Self {
            stripes,
            mask: count as u64 - 1,
        }
    }

    #[inline]
    pub fn index_for_hash(&self, hash: u64) -> usize {
        (hash & self.mask) as usize
    }

    #[inline]
    pub fn lock_for_hash(&self, hash: u64) -> MutexGuard<'_, ()> {
        self.stripes[self.index_for_hash(hash)].lock()
    }
}
