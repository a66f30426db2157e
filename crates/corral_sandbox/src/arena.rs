//! Memory arena for the engine context.
//!
//! An arena is one contiguous region reserved from the host up front and
//! handed to the engine runtime as its only allocator. Every allocation the
//! runtime makes for a context (shapes, atoms, objects, strings, bytecode)
//! is carved from that region; one that does not fit fails inside the
//! engine as an out-of-memory exception. The region goes back to the host
//! when the runtime is dropped.
//!
//! Blocks carry an 8-byte header holding their payload capacity. Free
//! blocks are tracked out of band, picked best-fit and coalesced with their
//! neighbours on release.

use rquickjs::Runtime;
use rquickjs::allocator::Allocator;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ptr::{self, NonNull};
use std::rc::Rc;

/// Smallest arena a context is ever built on
pub const MIN_ARENA_BYTES: usize = 64 * 1024;

/// Arena size used when the host does not choose one
pub const DEFAULT_ARENA_BYTES: usize = 1024 * 1024;

/// Payload alignment; the engine's widest scalar is a u64
const ALIGN: usize = std::mem::align_of::<u64>();

/// Size of the capacity word in front of every payload
const HEADER: usize = ALIGN;

/// A remainder smaller than this stays attached to the block it came from
const MIN_BLOCK: usize = HEADER + ALIGN;

thread_local! {
    static LIVE_ARENA_BYTES: Cell<usize> = const { Cell::new(0) };
}

/// Bytes held by arena regions still alive on this thread
#[must_use]
pub fn live_arena_bytes() -> usize {
    LIVE_ARENA_BYTES.with(Cell::get)
}

/// Arena reservation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    /// The host cannot provide a region of this size
    #[error("cannot allocate an arena of {requested} bytes")]
    Unavailable {
        /// Requested size as the host passed it
        requested: i64,
    },

    /// The region is too small to hold a context
    #[error("arena of {requested} bytes is below the {minimum} byte minimum")]
    TooSmall {
        /// Requested size in bytes
        requested: usize,
        /// Minimum viable size in bytes
        minimum: usize,
    },
}

/// Bytes carved out of a region, shared between the region and its arena
#[derive(Debug, Default)]
struct ArenaStats {
    in_use: Cell<usize>,
}

/// A fixed-size memory region owned by one context
pub struct Arena {
    limit: usize,
    region: Option<ArenaRegion>,
    stats: Rc<ArenaStats>,
}

impl Arena {
    /// Reserve an arena of `requested` bytes
    ///
    /// Negative sizes and sizes the host cannot back fail as allocation
    /// failures; sizes below [`MIN_ARENA_BYTES`] fail as too small to
    /// construct a context on.
    ///
    /// # Errors
    ///
    /// Returns error if the size cannot back a context
    pub fn reserve(requested: i64) -> Result<Self, ArenaError> {
        let limit = usize::try_from(requested)
            .ok()
            .filter(|bytes| isize::try_from(*bytes).is_ok())
            .ok_or(ArenaError::Unavailable { requested })?;

        if limit < MIN_ARENA_BYTES {
            return Err(ArenaError::TooSmall {
                requested: limit,
                minimum: MIN_ARENA_BYTES,
            });
        }

        let stats = Rc::new(ArenaStats::default());
        let region = ArenaRegion::new(limit, Rc::clone(&stats))
            .ok_or(ArenaError::Unavailable { requested })?;

        Ok(Self {
            limit,
            region: Some(region),
            stats,
        })
    }

    /// Size in bytes as requested
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Build the runtime that allocates from this arena
    ///
    /// The region moves into the runtime, so this succeeds once.
    pub(crate) fn runtime(&mut self) -> rquickjs::Result<Runtime> {
        let region = self.region.take().ok_or(rquickjs::Error::Allocation)?;
        let runtime = Runtime::new_with_alloc(region)?;
        runtime.set_gc_threshold(self.limit / 4);
        Ok(runtime)
    }

    /// Snapshot the region's accounting
    pub(crate) fn usage(&self, runtime: &Runtime) -> ArenaUsage {
        let usage = runtime.memory_usage();
        ArenaUsage {
            limit: self.limit as u64,
            allocated: self.stats.in_use.get() as u64,
            objects: u64::try_from(usage.obj_count).unwrap_or(0),
        }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("limit", &self.limit)
            .field("in_use", &self.stats.in_use.get())
            .field("bound", &self.region.is_none())
            .finish()
    }
}

/// Point-in-time arena accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaUsage {
    /// Region size in bytes
    pub limit: u64,
    /// Bytes carved out for the engine, headers included
    pub allocated: u64,
    /// Live engine objects
    pub objects: u64,
}

impl ArenaUsage {
    /// Bytes not yet carved out
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.allocated)
    }
}

/// The owned region and its block bookkeeping
struct ArenaRegion {
    // Reserved, never grown: `base` points into it for the region's lifetime
    storage: Vec<u64>,
    base: NonNull<u8>,
    capacity: usize,
    free_bytes: usize,
    by_offset: BTreeMap<usize, usize>,
    by_len: BTreeSet<(usize, usize)>,
    stats: Rc<ArenaStats>,
}

impl ArenaRegion {
    /// Reserve `bytes` from the host, `None` if it refuses
    fn new(bytes: usize, stats: Rc<ArenaStats>) -> Option<Self> {
        let words = bytes / ALIGN;
        let mut storage: Vec<u64> = Vec::new();
        storage.try_reserve_exact(words).ok()?;
        let base = NonNull::new(storage.as_mut_ptr().cast::<u8>())?;
        let capacity = words * ALIGN;

        let mut region = Self {
            storage,
            base,
            capacity,
            free_bytes: 0,
            by_offset: BTreeMap::new(),
            by_len: BTreeSet::new(),
            stats,
        };
        region.insert_free(0, capacity);
        LIVE_ARENA_BYTES.with(|live| live.set(live.get() + capacity));
        Some(region)
    }

    fn insert_free(&mut self, offset: usize, len: usize) {
        self.by_offset.insert(offset, len);
        self.by_len.insert((len, offset));
        self.free_bytes += len;
        self.publish();
    }

    fn remove_free(&mut self, offset: usize, len: usize) {
        self.by_offset.remove(&offset);
        self.by_len.remove(&(len, offset));
        self.free_bytes -= len;
        self.publish();
    }

    fn publish(&self) {
        self.stats.in_use.set(self.capacity - self.free_bytes);
    }

    /// Return `[offset, offset + len)` to the free lists, merged with any
    /// free neighbour
    fn release(&mut self, mut offset: usize, mut len: usize) {
        if let Some(&next) = self.by_offset.get(&(offset + len)) {
            self.remove_free(offset + len, next);
            len += next;
        }
        if let Some((&prev, &prev_len)) = self.by_offset.range(..offset).next_back() {
            if prev + prev_len == offset {
                self.remove_free(prev, prev_len);
                offset = prev;
                len += prev_len;
            }
        }
        self.insert_free(offset, len);
    }

    /// Carve a block with room for `size` payload bytes, returning its offset
    fn carve(&mut self, size: usize) -> Option<usize> {
        let need = block_len(size)?;
        let (len, offset) = self.by_len.range((need, 0)..).next().copied()?;
        self.remove_free(offset, len);

        let taken = if len - need >= MIN_BLOCK {
            self.insert_free(offset + need, len - need);
            need
        } else {
            len
        };
        self.write_header(offset, taken - HEADER);
        Some(offset)
    }

    #[allow(unsafe_code)]
    fn payload(&self, offset: usize) -> *mut u8 {
        // SAFETY: offsets handed out by `carve` lie inside the reservation
        unsafe { self.base.as_ptr().add(offset + HEADER) }
    }

    /// Block offset of a payload pointer this region returned
    fn offset_of(&self, payload: *mut u8) -> usize {
        payload as usize - self.base.as_ptr() as usize - HEADER
    }

    #[allow(unsafe_code)]
    fn write_header(&mut self, offset: usize, payload_len: usize) {
        // SAFETY: `offset` is an aligned block start inside the reservation
        unsafe {
            self.base
                .as_ptr()
                .add(offset)
                .cast::<usize>()
                .write(payload_len);
        }
    }

    #[allow(unsafe_code)]
    fn block_len_at(&self, offset: usize) -> usize {
        // SAFETY: `offset` is the start of a carved block, whose header
        // `carve` or `realloc` wrote
        let payload_len = unsafe { self.base.as_ptr().add(offset).cast::<usize>().read() };
        payload_len + HEADER
    }
}

impl Drop for ArenaRegion {
    fn drop(&mut self) {
        LIVE_ARENA_BYTES.with(|live| live.set(live.get().saturating_sub(self.capacity)));
        self.stats.in_use.set(0);
        tracing::trace!(
            bytes = self.capacity,
            reserved = self.storage.capacity() * ALIGN,
            "arena region released"
        );
    }
}

/// Header plus `size` rounded up to the alignment
fn block_len(size: usize) -> Option<usize> {
    let payload = size.max(ALIGN).checked_add(ALIGN - 1)? / ALIGN * ALIGN;
    payload.checked_add(HEADER)
}

// SAFETY: every returned pointer is null or a payload inside the region,
// aligned to 8, with at least the requested bytes available, and
// `usable_size` reads back the capacity written in front of it.
#[allow(unsafe_code)]
unsafe impl Allocator for ArenaRegion {
    fn alloc(&mut self, size: usize) -> *mut u8 {
        match self.carve(size) {
            Some(offset) => self.payload(offset),
            None => ptr::null_mut(),
        }
    }

    fn calloc(&mut self, count: usize, size: usize) -> *mut u8 {
        let Some(total) = count.checked_mul(size) else {
            return ptr::null_mut();
        };
        let payload = self.alloc(total);
        if !payload.is_null() {
            // SAFETY: the block just carved holds at least `total` bytes
            unsafe { ptr::write_bytes(payload, 0, total) };
        }
        payload
    }

    unsafe fn dealloc(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let offset = self.offset_of(ptr);
        let len = self.block_len_at(offset);
        self.release(offset, len);
    }

    unsafe fn realloc(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.alloc(new_size);
        }
        if new_size == 0 {
            // SAFETY: forwarded from the caller
            unsafe { self.dealloc(ptr) };
            return ptr::null_mut();
        }
        let Some(need) = block_len(new_size) else {
            return ptr::null_mut();
        };

        let offset = self.offset_of(ptr);
        let len = self.block_len_at(offset);

        if need <= len {
            if len - need >= MIN_BLOCK {
                self.write_header(offset, need - HEADER);
                self.release(offset + need, len - need);
            }
            return ptr;
        }

        let next_offset = offset + len;
        if let Some(&next) = self.by_offset.get(&next_offset) {
            if len + next >= need {
                self.remove_free(next_offset, next);
                let merged = len + next;
                let taken = if merged - need >= MIN_BLOCK {
                    self.insert_free(offset + need, merged - need);
                    need
                } else {
                    merged
                };
                self.write_header(offset, taken - HEADER);
                return ptr;
            }
        }

        let moved = self.alloc(new_size);
        if moved.is_null() {
            return moved;
        }
        // SAFETY: both payloads lie inside the region, the new block was
        // free until now so they do not overlap, and the old payload holds
        // `len - HEADER` bytes
        unsafe {
            ptr::copy_nonoverlapping(ptr, moved, len - HEADER);
            self.dealloc(ptr);
        }
        moved
    }

    unsafe fn usable_size(ptr: *mut u8) -> usize {
        // SAFETY: `ptr` is a payload of this allocator, preceded by its
        // capacity word
        unsafe { ptr.sub(HEADER).cast::<usize>().read() }
    }
}
