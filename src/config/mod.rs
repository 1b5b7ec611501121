use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default number of buckets an engine starts with when
/// [`Config::initial_primary_file_length`] is left at 0.
const DEFAULT_INITIAL_BUCKETS: u64 = 512;

/// Default load factor at which an incremental rehash is triggered.
const DEFAULT_LOAD_REHASH_THRESHOLD: f32 = 0.75;

/// Default number of lock stripes.
const DEFAULT_LOCK_STRIPE_COUNT: usize = 256;

/// Configuration accepted by [`crate::engine::Engine::open`].
///
/// Small, builder-style, validated at the point it is consumed rather than at construction time.
#[derive(Clone, Debug)]
pub struct Config {
    base_folder_location: PathBuf,
    initial_primary_file_length: u64,
    load_rehash_threshold: f32,
    lock_stripe_count: usize,
}

impl Config {
    /// Start a config pointed at `base_folder_location`, the only required option.
    pub fn new(base_folder_location: impl Into<PathBuf>) -> Self {
        Self {
            base_folder_location: base_folder_location.into(),
            initial_primary_file_length: 0,
            load_rehash_threshold: DEFAULT_LOAD_REHASH_THRESHOLD,
            lock_stripe_count: DEFAULT_LOCK_STRIPE_COUNT,
        }
    }

    #[inline(always)]
    pub fn base_folder_location(&self) -> &Path {
        &self.base_folder_location
    }

    pub fn with_initial_primary_file_length(mut self, bytes: u64) -> Self {
        self.initial_primary_file_length = bytes;
        self
    }

    #[inline(always)]
    pub fn initial_primary_file_length(&self) -> u64 {
        self.initial_primary_file_length
    }

    pub fn with_load_rehash_threshold(mut self, threshold: f32) -> Self {
        self.load_rehash_threshold = threshold;
        self
    }

    #[inline(always)]
    pub fn load_rehash_threshold(&self) -> f32 {
        self.load_rehash_threshold
    }

    pub fn with_lock_stripe_count(mut self, count: usize) -> Self {
        self.lock_stripe_count = count;
        self
    }

    #[inline(always)]
    pub fn lock_stripe_count(&self) -> usize {
        self.lock_stripe_count
    }

    /// Number of buckets a freshly created primary file should start with.
    ///
    /// Rounds the requested byte length itself up to the next power of two before dividing by
    /// the 8-byte slot width, so the resulting file is never smaller than what was requested;
    /// rounding the (truncated) bucket count instead can undershoot, e.g. a 65-byte request would
    /// otherwise divide down to 8 buckets (64 bytes, already a power of two) rather than up to 16.
    pub(crate) fn initial_bucket_count(&self) -> u64 {
        if self.initial_primary_file_length == 0 {
            DEFAULT_INITIAL_BUCKETS
        } else {
            (self.initial_primary_file_length.next_power_of_two() / 8).max(1)
        }
    }

    /// Validates the options a caller cannot simply default away.
    pub(crate) fn validate(&self) -> Result<()> {
        if !(0.0 < self.load_rehash_threshold && self.load_rehash_threshold <= 1.0) {
            return Err(Error::Usage(format!(
                "load_rehash_threshold must be in (0, 1], got {}",
                self.load_rehash_threshold
            )));
        }
        if self.lock_stripe_count == 0 || !self.lock_stripe_count.is_power_of_two() {
            return Err(Error::Usage(format!(
                "lock_stripe_count must be a positive power of two, got {}",
                self.lock_stripe_count
            )));
        }
        let buckets = self.initial_bucket_count();
        if self.lock_stripe_count as u64 > buckets {
            return Err(Error::Usage(format!(
                "lock_stripe_count ({}) must not exceed the initial bucket count ({})",
                self.lock_stripe_count, buckets
            )));
        }
        Ok(())
    }
}
