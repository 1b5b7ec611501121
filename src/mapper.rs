//! The file mapper: a growable memory-mapped region over one file.
//!
//! Grows never remap or move previously mapped bytes: each call to [`FileMapper::grow`] maps only
//! the newly appended byte range of the file as its own `memmap2` segment and appends it to an
//! append-only segment list. A reader that resolved an offset to segment N before a subsequent
//! grow keeps a valid pointer into that same segment forever — the grow only ever adds segment
//! N+1.
use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::{MmapMut, MmapOptions};
use parking_lot::RwLock;

use crate::error::{Error, Result};

struct Segment {
    /// Absolute file offset this segment's first byte corresponds to.
    start: u64,
    len: u64,
    mmap: MmapMut,
}

/// A growable, thread-safe memory-mapped file.
///
/// `get_*`/`put_*` take the segment list's read lock only for the lookup; the actual byte access
/// goes through a raw pointer into the resolved segment. This is sound because all logical
/// mutual exclusion for record data is provided by the caller's stripe lock or, for the
/// header and allocator cursor, by the atomics in [`crate::header`] and [`crate::alloc`] — two
/// operations never touch overlapping bytes without already holding the lock that serializes
/// them.
pub struct FileMapper {
    file: File,
    segments: RwLock<Vec<Segment>>,
}

// SAFETY: `Segment::mmap` is only ever read/written through raw pointers derived from it, guarded
// by the external synchronization documented above; the `MmapMut` itself is never aliased in a
// way `&File`/`&[u8]` wouldn't already permit across threads.
unsafe impl Send for FileMapper {}
unsafe impl Sync for FileMapper {}

impl FileMapper {
    /// Opens (creating if necessary) `path`, mapping its current contents as the first segment.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();

        let segments = if len == 0 {
            Vec::new()
        } else {
            let mmap = unsafe { MmapOptions::new().offset(0).len(len as usize).map_mut(&file)? };
            vec![Segment {
                start: 0,
                len,
                mmap,
            }]
        };

        Ok(Self {
            file,
            segments: RwLock::new(segments),
        })
    }

    /// Current mapped length of the file.
    pub fn len(&self) -> u64 {
        let segments = self.segments.read();
        segments.last().map_or(0, |s| s.start + s.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ensures the file (and mapping) is at least `new_len` bytes, mapping only the delta as a
    /// new segment. No-op if already large enough.
    pub fn grow(&self, new_len: u64) -> Result<()> {
        let mut segments = self.segments.write();
        let current = segments.last().map_or(0, |s| s.start + s.len);
        if new_len <= current {
            return Ok(());
        }
        self.file.set_len(new_len)?;
        let added = new_len - current;
        let mmap = unsafe {
            MmapOptions::new()
                .offset(current)
                .len(added as usize)
                .map_mut(&self.file)?
        };
        segments.push(Segment {
            start: current,
            len: added,
            mmap,
        });
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let segments = self.segments.read();
        for s in segments.iter() {
            s.mmap.flush()?;
        }
        Ok(())
    }

    /// Returns the end offset of the mapped segment containing `off`, or `None` if `off` lies at
    /// or beyond the currently mapped length (not yet covered by any segment). Used by
    /// [`crate::alloc::Allocator`] to keep a single allocation from straddling two segments,
    /// since segments are disjoint, contiguous ranges appended by [`Self::grow`] and every
    /// accessor here requires its whole byte range to lie within one of them.
    pub(crate) fn segment_end(&self, off: u64) -> Option<u64> {
        let segments = self.segments.read();
        segments
            .iter()
            .find(|s| off >= s.start && off < s.start + s.len)
            .map(|s| s.start + s.len)
    }

    #[inline]
    fn locate(segments: &[Segment], off: u64, want: u64) -> Result<(usize, usize)> {
        for s in segments.iter() {
            if off >= s.start && off + want <= s.start + s.len {
                return Ok(((off - s.start) as usize, (off - s.start + want) as usize));
            }
        }
        Err(Error::Corrupt(format!(
            "offset {} (len {}) is outside any mapped segment",
            off, want
        )))
    }

    pub fn get_long(&self, off: u64) -> Result<u64> {
        let segments = self.segments.read();
        let idx = segments
            .iter()
            .position(|s| off >= s.start && off + 8 <= s.start + s.len)
            .ok_or_else(|| {
                Error::Corrupt(format!("offset {} is outside any mapped segment", off))
            })?;
        let (lo, hi) = Self::locate(&segments, off, 8)?;
        let bytes: [u8; 8] = segments[idx].mmap[lo..hi].try_into().unwrap();
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn put_long(&self, off: u64, value: u64) -> Result<()> {
        let segments = self.segments.read();
        let idx = segments
            .iter()
            .position(|s| off >= s.start && off + 8 <= s.start + s.len)
            .ok_or_else(|| {
                Error::Corrupt(format!("offset {} is outside any mapped segment", off))
            })?;
        let (lo, _) = Self::locate(&segments, off, 8)?;
        // SAFETY: bytes [lo, lo+8) were just bounds-checked against this segment.
        unsafe {
            let ptr = segments[idx].mmap.as_ptr().add(lo) as *mut u8;
            std::ptr::copy_nonoverlapping(value.to_le_bytes().as_ptr(), ptr, 8);
        }
        Ok(())
    }

    pub fn get_bytes(&self, off: u64, len: u64) -> Result<Vec<u8>> {
        let segments = self.segments.read();
        let idx = segments
            .iter()
            .position(|s| off >= s.start && off + len <= s.start + s.len)
            .ok_or_else(|| {
                Error::Corrupt(format!(
                    "range [{}, {}) is outside any mapped segment",
                    off,
                    off + len
                ))
            })?;
        let (lo, hi) = Self::locate(&segments, off, len)?;
        Ok(segments[idx].mmap[lo..hi].to_vec())
    }

    pub fn put_bytes(&self, off: u64, bytes: &[u8]) -> Result<()> {
        let segments = self.segments.read();
        let len = bytes.len() as u64;
        let idx = segments
            .iter()
            .position(|s| off >= s.start && off + len <= s.start + s.len)
            .ok_or_else(|| {
                Error::Corrupt(format!(
                    "range [{}, {}) is outside any mapped segment",
                    off,
                    off + len
                ))
            })?;
        let (lo, _) = Self::locate(&segments, off, len)?;
        // SAFETY: bytes [lo, lo+bytes.len()) were just bounds-checked against this segment.
        unsafe {
            let ptr = segments[idx].mmap.as_ptr().add(lo) as *mut u8;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
        }
        Ok(())
    }
}
