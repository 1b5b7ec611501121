//! The map engine: composes the file mapper, record codec, lock stripe, allocator, bucket table
//! and header into the public byte-level operations, the incremental rehash state machine, and
//! the unsynchronized iterator.
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::alloc::Allocator;
use crate::bucket::BucketTable;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash;
use crate::header::{Header, HEADER_SIZE};
use crate::mapper::FileMapper;
use crate::record::Record;
use crate::stripe::LockStripe;

const PRIMARY_FILE_NAME: &str = "primary";
const SECONDARY_FILE_NAME: &str = "secondary";

/// A persistent, concurrent, disk-backed hash map from byte strings to byte strings.
///
/// Opens (creating if necessary) a `primary` and `secondary` file under a base directory and
/// exposes `get`/`put`/`put_if_absent`/`remove`/`remove_if`/`replace`/`replace_if`/`iter`. See the
/// module docs for the on-disk layout this implements.
pub struct Engine {
    primary: FileMapper,
    secondary: FileMapper,
    header: Header,
    lock_stripe: LockStripe,
    /// Serializes initiating a new rehash; held only for the brief window that grows the
    /// primary file and publishes the doubled `table_length`.
    rehash_initiate_lock: Mutex<()>,
    /// Transient (unpersisted) cursor claiming the next bucket a caller should step through
    /// during an in-progress rehash. Reinitialized from `header.rehash_complete` on open so a
    /// resumed rehash continues where a prior process left off.
    rehash_cursor: AtomicU64,
    /// Serializes the secondary allocator's (rare) grow path across every caller; see
    /// [`Allocator`]'s own doc comment for why this must outlive any one `Allocator` instance.
    secondary_grow_lock: Mutex<()>,
    config: Config,
    base_folder: PathBuf,
    primary_path: PathBuf,
    secondary_path: PathBuf,
}

impl Engine {
    /// Opens or creates an engine at `config.base_folder_location()`. If a prior run left a
    /// rehash in progress, it is driven to completion synchronously before this returns, per the
    /// spec's resumption requirement.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let base_folder = config.base_folder_location().to_path_buf();
        fs::create_dir_all(&base_folder)?;
        let primary_path = base_folder.join(PRIMARY_FILE_NAME);
        let secondary_path = base_folder.join(SECONDARY_FILE_NAME);

        let primary = FileMapper::open(&primary_path)?;
        let secondary = FileMapper::open(&secondary_path)?;

        if primary.is_empty() {
            primary.grow(config.initial_bucket_count() * 8)?;
        }
        if secondary.is_empty() {
            secondary.grow(HEADER_SIZE)?;
        }

        let header = Header::load(&secondary, primary.len())?;
        let table_length = header.table_length.load(Ordering::SeqCst);
        if primary.len() < table_length * 8 {
            primary.grow(table_length * 8)?;
        }

        let lock_stripe_count = config.lock_stripe_count();
        if lock_stripe_count as u64 > table_length {
            return Err(Error::Usage(format!(
                "lock_stripe_count ({}) must not exceed table_length ({})",
                lock_stripe_count, table_length
            )));
        }

        debug!(
            "opened engine at {:?} (table_length={}, size={}, rehashing={})",
            base_folder,
            table_length,
            header.size.load(Ordering::SeqCst),
            header.is_rehashing()
        );

        let rehash_cursor = AtomicU64::new(header.rehash_complete.load(Ordering::SeqCst));

        let engine = Self {
            primary,
            secondary,
            header,
            lock_stripe: LockStripe::new(lock_stripe_count),
            rehash_initiate_lock: Mutex::new(()),
            rehash_cursor,
            secondary_grow_lock: Mutex::new(()),
            config,
            base_folder,
            primary_path,
            secondary_path,
        };

        if engine.header.is_rehashing() {
            warn!(
                "resuming incomplete rehash from bucket {}",
                engine.header.rehash_complete.load(Ordering::SeqCst)
            );
            while engine.header.is_rehashing() {
                engine.rehash_general_step()?;
            }
        }

        Ok(engine)
    }

    #[inline]
    fn bucket_table(&self) -> BucketTable<'_> {
        BucketTable::new(&self.primary)
    }

    #[inline]
    fn allocator(&self) -> Allocator<'_> {
        Allocator::new(
            &self.secondary,
            &self.header.secondary_write_pos,
            &self.secondary_grow_lock,
        )
    }

    fn validate_ptr(&self, ptr: u64) -> Result<()> {
        if ptr == 0 {
            return Ok(());
        }
        let write_pos = self.header.secondary_write_pos.load(Ordering::SeqCst);
        if ptr < HEADER_SIZE || ptr >= write_pos {
            error!(
                "corrupt on-disk state: record pointer {} outside [{}, {})",
                ptr, HEADER_SIZE, write_pos
            );
            return Err(Error::Corrupt(format!(
                "record pointer {} outside allocated range [{}, {})",
                ptr, HEADER_SIZE, write_pos
            )));
        }
        Ok(())
    }

    /// If a rehash is in progress and `idx` falls in the doubled table's upper half whose
    /// partner bucket has not yet been split, performs that split now. Assumes the caller
    /// already holds the stripe lock for `idx` (and therefore also for its partner, since both
    /// share the same low hash bits).
    fn ensure_bucket_ready_locked(&self, idx: u64) -> Result<()> {
        let old_len = self.header.old_table_length.load(Ordering::SeqCst);
        if old_len == 0 || idx < old_len {
            return Ok(());
        }
        let partner = idx - old_len;
        if self.header.rehash_complete.load(Ordering::SeqCst) <= partner {
            self.rehash_step_for_bucket_locked(partner, old_len)?;
        }
        Ok(())
    }

    /// Splits bucket `idx` (under the old, pre-doubling addressing) into its *keep* and *move*
    /// successors in the doubled table. Truly idempotent, not merely a cheap no-op: it reads
    /// *both* `primary[idx]` and `primary[idx + old_len]` before rewriting either slot, so
    /// re-running it (whether because [`Self::ensure_bucket_ready_locked`] forced an early split
    /// and the amortized cursor later reaches the same bucket, or any other repeat call) folds in
    /// whatever is already at the move side — including records a prior split already relocated
    /// there and any new key that landed there directly via `idx_for_hash` against the
    /// already-doubled `table_length` — instead of recomputing the move list from `primary[idx]`
    /// alone and zeroing the move bucket out from under them. Assumes the caller holds the stripe
    /// lock covering `idx` (and therefore its partner, since both share the same low hash bits).
    fn rehash_step_for_bucket_locked(&self, idx: u64, old_len: u64) -> Result<()> {
        let new_len = old_len * 2;
        let table = self.bucket_table();
        let low_head = table.get(idx)?;
        let high_head = table.get(idx + old_len)?;

        let mut keep_head = 0u64;
        let mut keep_tail = 0u64;
        let mut move_head = 0u64;
        let mut move_tail = 0u64;

        for head in [low_head, high_head].iter().copied() {
            let mut cur = head;
            while cur != 0 {
                self.validate_ptr(cur)?;
                let (rec_hash, next) = Record::hash_and_next_at(&self.secondary, cur)?;
                let new_idx = rec_hash & (new_len - 1);
                if new_idx == idx {
                    if keep_tail == 0 {
                        keep_head = cur;
                    } else {
                        Record::set_next_record_pos(&self.secondary, keep_tail, cur)?;
                    }
                    keep_tail = cur;
                } else if new_idx == idx + old_len {
                    if move_tail == 0 {
                        move_head = cur;
                    } else {
                        Record::set_next_record_pos(&self.secondary, move_tail, cur)?;
                    }
                    move_tail = cur;
                } else {
                    error!(
                        "corrupt on-disk state: record at bucket {} hashes to {}, neither keep ({}) nor move ({})",
                        idx, new_idx, idx, idx + old_len
                    );
                    return Err(Error::Corrupt(format!(
                        "rehash split inconsistency at bucket {}",
                        idx
                    )));
                }
                cur = next;
            }
        }

        if keep_tail != 0 {
            Record::set_next_record_pos(&self.secondary, keep_tail, 0)?;
        }
        if move_tail != 0 {
            Record::set_next_record_pos(&self.secondary, move_tail, 0)?;
        }
        table.set(idx, keep_head)?;
        table.set(idx + old_len, move_head)?;
        Ok(())
    }

    /// Initiates a table doubling if the load factor exceeds the configured threshold and no
    /// rehash is already in progress. A no-op otherwise.
    fn maybe_trigger_rehash(&self) -> Result<()> {
        if self.header.is_rehashing() {
            return Ok(());
        }
        if !self.load_exceeds_threshold() {
            return Ok(());
        }

        let _guard = self.rehash_initiate_lock.lock();
        if self.header.is_rehashing() || !self.load_exceeds_threshold() {
            return Ok(());
        }

        let table_length = self.header.table_length.load(Ordering::SeqCst);
        let new_length = table_length * 2;
        debug!(
            "triggering rehash: table_length {} -> {} (size={})",
            table_length,
            new_length,
            self.header.size.load(Ordering::SeqCst)
        );
        self.bucket_table().grow_to(new_length)?;
        self.header
            .old_table_length
            .store(table_length, Ordering::SeqCst);
        self.header.persist_old_table_length(&self.secondary)?;
        self.header
            .table_length
            .store(new_length, Ordering::SeqCst);
        self.header.persist_table_length(&self.secondary)?;
        self.header.rehash_complete.store(0, Ordering::SeqCst);
        self.header.persist_rehash_complete(&self.secondary)?;
        self.rehash_cursor.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn load_exceeds_threshold(&self) -> bool {
        let table_length = self.header.table_length.load(Ordering::SeqCst) as f64;
        let size = self.header.size.load(Ordering::SeqCst) as f64;
        size / table_length > self.config.load_rehash_threshold() as f64
    }

    /// Performs one amortized step of an in-progress rehash: claims the next un-rehashed bucket
    /// and splits it. A no-op if no rehash is in progress. Called once per mutating operation;
    /// reads never call this (they only force-resolve their own target bucket's partner via
    /// [`Self::ensure_bucket_ready_locked`]).
    fn rehash_general_step(&self) -> Result<()> {
        let old_len = self.header.old_table_length.load(Ordering::SeqCst);
        if old_len == 0 {
            return Ok(());
        }

        let idx = self.rehash_cursor.fetch_add(1, Ordering::SeqCst);
        if idx < old_len {
            let _guard = self.lock_stripe.lock_for_hash(idx);
            // A full rehash generation can complete (and a new one start) between the
            // unsynchronized reads of `old_len` and `idx` above and this lock being granted;
            // `header.old_table_length` having since changed means `idx`/`old_len` describe a
            // table generation that is no longer current, so skip rather than split buckets
            // against the wrong generation.
            if self.header.old_table_length.load(Ordering::SeqCst) != old_len {
                return Ok(());
            }
            self.rehash_step_for_bucket_locked(idx, old_len)?;
            let done = self.header.rehash_complete.fetch_add(1, Ordering::SeqCst) + 1;
            self.header.persist_rehash_complete(&self.secondary)?;
            if done >= old_len {
                self.finish_rehash(old_len)?;
            }
        } else if self.header.rehash_complete.load(Ordering::SeqCst) >= old_len {
            self.finish_rehash(old_len)?;
        }
        Ok(())
    }

    fn finish_rehash(&self, old_len: u64) -> Result<()> {
        self.header.old_table_length.store(0, Ordering::SeqCst);
        self.header.persist_old_table_length(&self.secondary)?;
        self.header.rehash_complete.store(0, Ordering::SeqCst);
        self.header.persist_rehash_complete(&self.secondary)?;
        debug!("rehash complete: table_length now {}", old_len * 2);
        Ok(())
    }

    /// Walks bucket `idx`'s chain for a record matching `(h, key)`, returning its predecessor's
    /// position (`None` if it is the chain head) and the matched record. Assumes the caller
    /// holds the stripe lock for `idx`.
    fn find_in_chain(&self, idx: u64, h: u64, key: &[u8]) -> Result<Option<(Option<u64>, Record)>> {
        let head = self.bucket_table().get(idx)?;
        if head == 0 {
            return Ok(None);
        }
        let mut prev = None;
        let mut cur = head;
        loop {
            self.validate_ptr(cur)?;
            if Record::key_equals_at(&self.secondary, cur, h, key)? {
                return Ok(Some((prev, Record::read(&self.secondary, cur)?)));
            }
            let next = Record::next_record_pos_at(&self.secondary, cur)?;
            if next == 0 {
                return Ok(None);
            }
            prev = Some(cur);
            cur = next;
        }
    }

    fn unlink(&self, idx: u64, prev: Option<u64>, next: u64) -> Result<()> {
        match prev {
            Some(p) => Record::set_next_record_pos(&self.secondary, p, next),
            None => self.bucket_table().set(idx, next),
        }
    }

    fn link_new(&self, idx: u64, prev: Option<u64>, pos: u64) -> Result<()> {
        match prev {
            Some(p) => Record::set_next_record_pos(&self.secondary, p, pos),
            None => self.bucket_table().set(idx, pos),
        }
    }

    #[inline]
    fn idx_for_hash(&self, h: u64) -> u64 {
        h & (self.header.table_length.load(Ordering::SeqCst) - 1)
    }

    /// Fetches the value mapped to `key`, or `None` if absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let h = hash::hash(key);
        let _guard = self.lock_stripe.lock_for_hash(h);
        let idx = self.idx_for_hash(h);
        self.ensure_bucket_ready_locked(idx)?;
        Ok(self.find_in_chain(idx, h, key)?.map(|(_, rec)| rec.val))
    }

    /// Inserts or overwrites `key`'s value, returning the previous value if any.
    pub fn put(&self, key: &[u8], val: &[u8]) -> Result<Option<Vec<u8>>> {
        self.maybe_trigger_rehash()?;
        let h = hash::hash(key);
        let new_record = Record::new(h, key.to_vec(), val.to_vec());
        let pos = self.allocator().allocate(new_record.encoded_len())?;
        new_record.write(&self.secondary, pos)?;

        let result = {
            let _guard = self.lock_stripe.lock_for_hash(h);
            let idx = self.idx_for_hash(h);
            self.ensure_bucket_ready_locked(idx)?;

            match self.find_in_chain(idx, h, key)? {
                Some((prev, existing)) => {
                    Record::set_next_record_pos(&self.secondary, pos, existing.next_record_pos)?;
                    self.link_new(idx, prev, pos)?;
                    Some(existing.val)
                }
                None => {
                    let head = self.bucket_table().get(idx)?;
                    if head == 0 {
                        self.bucket_table().set(idx, pos)?;
                    } else {
                        let mut tail = head;
                        loop {
                            self.validate_ptr(tail)?;
                            let next = Record::next_record_pos_at(&self.secondary, tail)?;
                            if next == 0 {
                                break;
                            }
                            tail = next;
                        }
                        Record::set_next_record_pos(&self.secondary, tail, pos)?;
                    }
                    self.header.size.fetch_add(1, Ordering::SeqCst);
                    self.header.persist_size(&self.secondary)?;
                    None
                }
            }
        };

        self.rehash_general_step()?;
        Ok(result)
    }

    /// Inserts `key` only if absent, returning the existing value if one was already present.
    pub fn put_if_absent(&self, key: &[u8], val: &[u8]) -> Result<Option<Vec<u8>>> {
        self.maybe_trigger_rehash()?;
        let h = hash::hash(key);
        let new_record = Record::new(h, key.to_vec(), val.to_vec());
        let pos = self.allocator().allocate(new_record.encoded_len())?;
        new_record.write(&self.secondary, pos)?;

        let result = {
            let _guard = self.lock_stripe.lock_for_hash(h);
            let idx = self.idx_for_hash(h);
            self.ensure_bucket_ready_locked(idx)?;

            match self.find_in_chain(idx, h, key)? {
                Some((_, existing)) => Some(existing.val),
                None => {
                    let head = self.bucket_table().get(idx)?;
                    if head == 0 {
                        self.bucket_table().set(idx, pos)?;
                    } else {
                        let mut tail = head;
                        loop {
                            self.validate_ptr(tail)?;
                            let next = Record::next_record_pos_at(&self.secondary, tail)?;
                            if next == 0 {
                                break;
                            }
                            tail = next;
                        }
                        Record::set_next_record_pos(&self.secondary, tail, pos)?;
                    }
                    self.header.size.fetch_add(1, Ordering::SeqCst);
                    self.header.persist_size(&self.secondary)?;
                    None
                }
            }
        };

        self.rehash_general_step()?;
        Ok(result)
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.maybe_trigger_rehash()?;
        let h = hash::hash(key);

        let result = {
            let _guard = self.lock_stripe.lock_for_hash(h);
            let idx = self.idx_for_hash(h);
            self.ensure_bucket_ready_locked(idx)?;

            match self.find_in_chain(idx, h, key)? {
                Some((prev, rec)) => {
                    self.unlink(idx, prev, rec.next_record_pos)?;
                    self.header.size.fetch_sub(1, Ordering::SeqCst);
                    self.header.persist_size(&self.secondary)?;
                    Some(rec.val)
                }
                None => None,
            }
        };

        self.rehash_general_step()?;
        Ok(result)
    }

    /// Removes `key` only if its current value equals `val`; returns whether it was removed.
    pub fn remove_if(&self, key: &[u8], val: &[u8]) -> Result<bool> {
        self.maybe_trigger_rehash()?;
        let h = hash::hash(key);

        let removed = {
            let _guard = self.lock_stripe.lock_for_hash(h);
            let idx = self.idx_for_hash(h);
            self.ensure_bucket_ready_locked(idx)?;

            match self.find_in_chain(idx, h, key)? {
                Some((prev, rec)) if rec.val == val => {
                    self.unlink(idx, prev, rec.next_record_pos)?;
                    self.header.size.fetch_sub(1, Ordering::SeqCst);
                    self.header.persist_size(&self.secondary)?;
                    true
                }
                _ => false,
            }
        };

        self.rehash_general_step()?;
        Ok(removed)
    }

    /// Replaces `key`'s value with `val` only if `key` is present; returns the previous value,
    /// or `None` (leaving the map untouched) if `key` is absent.
    pub fn replace(&self, key: &[u8], val: &[u8]) -> Result<Option<Vec<u8>>> {
        self.maybe_trigger_rehash()?;
        let h = hash::hash(key);
        let new_record = Record::new(h, key.to_vec(), val.to_vec());
        let pos = self.allocator().allocate(new_record.encoded_len())?;
        new_record.write(&self.secondary, pos)?;

        let result = {
            let _guard = self.lock_stripe.lock_for_hash(h);
            let idx = self.idx_for_hash(h);
            self.ensure_bucket_ready_locked(idx)?;

            match self.find_in_chain(idx, h, key)? {
                Some((prev, existing)) => {
                    Record::set_next_record_pos(&self.secondary, pos, existing.next_record_pos)?;
                    self.link_new(idx, prev, pos)?;
                    Some(existing.val)
                }
                None => None,
            }
        };

        self.rehash_general_step()?;
        Ok(result)
    }

    /// Replaces `key`'s value with `new_val` only if its current value equals `old_val`; returns
    /// whether the replacement happened.
    pub fn replace_if(&self, key: &[u8], old_val: &[u8], new_val: &[u8]) -> Result<bool> {
        self.maybe_trigger_rehash()?;
        let h = hash::hash(key);
        let new_record = Record::new(h, key.to_vec(), new_val.to_vec());
        let pos = self.allocator().allocate(new_record.encoded_len())?;
        new_record.write(&self.secondary, pos)?;

        let replaced = {
            let _guard = self.lock_stripe.lock_for_hash(h);
            let idx = self.idx_for_hash(h);
            self.ensure_bucket_ready_locked(idx)?;

            match self.find_in_chain(idx, h, key)? {
                Some((prev, existing)) if existing.val == old_val => {
                    Record::set_next_record_pos(&self.secondary, pos, existing.next_record_pos)?;
                    self.link_new(idx, prev, pos)?;
                    true
                }
                _ => false,
            }
        };

        self.rehash_general_step()?;
        Ok(replaced)
    }

    /// Number of distinct keys currently mapped.
    pub fn len(&self) -> u64 {
        self.header.size.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An unsynchronized iterator over all (key, value) pairs. The caller must ensure no
    /// concurrent mutation for well-defined results; see the module docs for the exact contract.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            engine: self,
            table_length: self.header.table_length.load(Ordering::SeqCst),
            next_idx: 0,
            next_addr: 0,
        }
    }

    /// Flushes both mappings and writes back the header. Does not remove the files.
    pub fn close(&self) -> Result<()> {
        self.header.persist(&self.secondary)?;
        self.primary.flush()?;
        self.secondary.flush()?;
        Ok(())
    }

    /// Closes the engine and removes its backing files (and the base folder, if now empty).
    pub fn delete(self) -> Result<()> {
        self.close()?;
        fs::remove_file(&self.primary_path)?;
        fs::remove_file(&self.secondary_path)?;
        let _ = fs::remove_dir(&self.base_folder);
        Ok(())
    }
}

/// A finite, lazy, unsynchronized sequence of `(key, value)` pairs over an [`Engine`]'s entries.
///
/// Produced by [`Engine::iter`]. Each pair reflects some record that was valid at some earlier
/// moment; there is no snapshot copy and no internal locking, so the iterator must not be driven
/// concurrently with mutation of the same engine. Removal through the iterator is not supported.
pub struct Iter<'a> {
    engine: &'a Engine,
    table_length: u64,
    next_idx: u64,
    next_addr: u64,
}

impl<'a> Iter<'a> {
    /// Iterator removal is not part of this engine's contract; always returns a usage error.
    pub fn remove(&mut self) -> Result<()> {
        Err(Error::Usage(
            "iterator remove is not supported".to_string(),
        ))
    }

    fn read_and_advance(&mut self, pos: u64) -> Result<(Vec<u8>, Vec<u8>)> {
        let rec = Record::read(&self.engine.secondary, pos)?;
        self.next_addr = rec.next_record_pos;
        Ok((rec.key, rec.val))
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.next_addr != 0 {
                let pos = self.next_addr;
                return Some(self.read_and_advance(pos));
            }
            if self.next_idx >= self.table_length {
                return None;
            }
            let idx = self.next_idx;
            self.next_idx += 1;
            match self.engine.bucket_table().get(idx) {
                Ok(0) => continue,
                Ok(head) => {
                    self.next_addr = head;
                    continue;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
