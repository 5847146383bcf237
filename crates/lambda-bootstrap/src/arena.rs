//! Per-invocation arena allocator.
//!
//! A bump allocator over a growing chunk list. Allocation is O(1) on the
//! warm path: [`Arena::reset`] rewinds the cursor without returning pages to
//! the system, so a warmed sandbox serves every later invocation out of
//! memory it already owns. Retained capacity is capped at the larger of
//! 1 MiB and twice the largest per-invocation high-water mark observed, so
//! one pathological invocation cannot inflate steady-state memory for the
//! life of the container.
//!
//! Borrows handed out by [`Arena::alloc`] are tied to `&self`; `reset` takes
//! `&mut self`, so the borrow checker guarantees no allocation survives the
//! reset that invalidates it.

use std::alloc::{self, Layout};
use std::cell::UnsafeCell;
use std::ptr::NonNull;

const MIN_CHUNK_BYTES: usize = 4 * 1024;
const MIN_RETAINED_BYTES: usize = 1024 * 1024;

/// A chunk of arena storage.
///
/// The buffer is held as a raw pointer rather than a `Box<[u8]>` so that
/// re-borrowing the chunk list inside [`Arena::alloc`] does not assert
/// unique access over memory already lent out to the handler.
struct Chunk {
    ptr: NonNull<u8>,
    size: usize,
}

impl Chunk {
    fn new(size: usize) -> Self {
        // Layout: size is non-zero and align is 16, well under isize::MAX.
        let layout = Layout::from_size_align(size, 16).expect("valid chunk layout");
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        Self { ptr, size }
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.size, 16).expect("valid chunk layout");
        // SAFETY: ptr was allocated by `alloc_zeroed` with this layout and
        // is released exactly once.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
    }
}

struct Inner {
    chunks: Vec<Chunk>,
    /// Chunk currently being bumped; `chunks.len()` when all are full.
    current: usize,
    /// Bytes consumed from the current chunk.
    offset: usize,
    /// Bytes handed out since the last reset.
    used: usize,
    /// Largest `used` observed across all invocations so far.
    high_water: usize,
}

/// A bump allocator that is reset-in-place between invocations.
pub struct Arena {
    inner: UnsafeCell<Inner>,
}

// SAFETY: the chunk pointers are uniquely owned by this arena and the arena
// is only ever used from one thread at a time (it is not Sync).
unsafe impl Send for Arena {}

impl Arena {
    /// Creates an empty arena. No memory is reserved until the first
    /// allocation.
    pub fn new() -> Self {
        Self {
            inner: UnsafeCell::new(Inner {
                chunks: Vec::new(),
                current: 0,
                offset: 0,
                used: 0,
                high_water: 0,
            }),
        }
    }

    /// Allocates `len` zeroed bytes valid until the next [`reset`].
    ///
    /// [`reset`]: Arena::reset
    pub fn alloc(&self, len: usize) -> &mut [u8] {
        if len == 0 {
            return &mut [];
        }
        // SAFETY: single-threaded interior mutability; the reference does
        // not escape this call, and the returned slice points into chunk
        // storage that `Inner` only holds raw pointers to.
        let inner = unsafe { &mut *self.inner.get() };

        while inner.current < inner.chunks.len() {
            let chunk = &inner.chunks[inner.current];
            if chunk.size - inner.offset >= len {
                let start = inner.offset;
                inner.offset += len;
                inner.used += len;
                // SAFETY: [start, start + len) is in bounds of the chunk,
                // disjoint from every previously returned slice (the cursor
                // only moves forward between resets), and outlives the
                // borrow because chunks are not freed while `&self` borrows
                // exist.
                let slice = unsafe {
                    std::slice::from_raw_parts_mut(chunk.ptr.as_ptr().add(start), len)
                };
                slice.fill(0);
                return slice;
            }
            inner.current += 1;
            inner.offset = 0;
        }

        let size = Self::next_chunk_size(&inner.chunks, len);
        inner.chunks.push(Chunk::new(size));
        inner.current = inner.chunks.len() - 1;
        inner.offset = len;
        inner.used += len;
        let chunk = &inner.chunks[inner.current];
        // SAFETY: as above; the chunk was just allocated with size >= len.
        unsafe { std::slice::from_raw_parts_mut(chunk.ptr.as_ptr(), len) }
    }

    /// Copies `bytes` into the arena.
    pub fn alloc_slice(&self, bytes: &[u8]) -> &mut [u8] {
        let slot = self.alloc(bytes.len());
        slot.copy_from_slice(bytes);
        slot
    }

    /// Copies `text` into the arena.
    pub fn alloc_str(&self, text: &str) -> &str {
        let slot = self.alloc_slice(text.as_bytes());
        // SAFETY: slot is a byte-exact copy of a valid &str.
        unsafe { std::str::from_utf8_unchecked(slot) }
    }

    /// Bytes handed out since the last reset.
    pub fn used(&self) -> usize {
        // SAFETY: single-threaded interior mutability, shared read only.
        unsafe { (*self.inner.get()).used }
    }

    /// Total capacity currently retained across all chunks.
    pub fn retained(&self) -> usize {
        // SAFETY: single-threaded interior mutability, shared read only.
        unsafe { (*self.inner.get()).chunks.iter().map(|c| c.size).sum() }
    }

    /// Rewinds the cursor to the base, invalidating every outstanding
    /// allocation, and trims retained capacity down to the cap of
    /// `max(1 MiB, 2 x high-water-mark)`.
    ///
    /// When the chunk list exceeds the cap, only the largest chunk is kept;
    /// it is the one sized for the working set, while the smaller chunks are
    /// leftovers from earlier growth.
    pub fn reset(&mut self) {
        let inner = self.inner.get_mut();
        inner.high_water = inner.high_water.max(inner.used);
        inner.used = 0;
        inner.current = 0;
        inner.offset = 0;

        let cap = MIN_RETAINED_BYTES.max(inner.high_water.saturating_mul(2));
        let retained: usize = inner.chunks.iter().map(|c| c.size).sum();
        if retained > cap {
            let largest = inner
                .chunks
                .iter()
                .enumerate()
                .max_by_key(|(_, chunk)| chunk.size)
                .map(|(index, _)| index);
            if let Some(index) = largest {
                let keep = inner.chunks.swap_remove(index);
                inner.chunks.clear();
                if keep.size <= cap {
                    inner.chunks.push(keep);
                }
            }
        }
    }

    fn next_chunk_size(chunks: &[Chunk], len: usize) -> usize {
        let doubled = chunks
            .last()
            .map(|c| c.size.saturating_mul(2))
            .unwrap_or(MIN_CHUNK_BYTES);
        let needed = len.checked_next_power_of_two().unwrap_or(len);
        doubled.max(MIN_CHUNK_BYTES).max(needed)
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("used", &self.used())
            .field("retained", &self.retained())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn starts_empty() {
        let arena = Arena::new();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.retained(), 0);
    }

    #[test]
    fn alloc_returns_zeroed_disjoint_slices() {
        let arena = Arena::new();
        let a = arena.alloc(16);
        assert!(a.iter().all(|&b| b == 0));
        a.fill(0xAA);

        let b = arena.alloc(16);
        assert!(b.iter().all(|&b| b == 0), "second slice must not alias");
        assert_eq!(arena.used(), 32);
    }

    #[test]
    fn alloc_str_round_trips() {
        let arena = Arena::new();
        let s = arena.alloc_str("warm path");
        assert_eq!(s, "warm path");
        assert_eq!(arena.used(), 9);
    }

    #[test]
    fn reset_rewinds_but_keeps_pages() {
        let mut arena = Arena::new();
        arena.alloc(1000);
        let retained_before = arena.retained();
        assert!(retained_before >= 1000);

        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.retained(), retained_before);
    }

    #[test]
    fn allocation_spills_into_new_chunks() {
        let arena = Arena::new();
        // First allocation fits the minimum chunk; the second forces growth.
        arena.alloc(MIN_CHUNK_BYTES);
        arena.alloc(MIN_CHUNK_BYTES);
        assert_eq!(arena.used(), 2 * MIN_CHUNK_BYTES);
        assert!(arena.retained() >= 2 * MIN_CHUNK_BYTES);
    }

    #[test]
    fn reset_trims_down_to_the_retention_cap() {
        let mut arena = Arena::new();
        // First invocation: 900 KB working set in a 1 MiB chunk.
        arena.alloc(900 * 1024);
        arena.reset();
        assert_eq!(arena.retained(), 1024 * 1024);

        // Second invocation does not fit the 1 MiB chunk, so a 2 MiB chunk
        // is added; the stale 1 MiB chunk pushes retention over the cap of
        // 2 x 1.1 MiB and must be shed on reset.
        arena.alloc(1100 * 1024);
        assert_eq!(arena.retained(), 3 * 1024 * 1024);
        arena.reset();

        let cap = MIN_RETAINED_BYTES.max(2 * 1100 * 1024);
        assert_eq!(arena.retained(), 2 * 1024 * 1024);
        assert!(arena.retained() <= cap);
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn reset_keeps_small_arenas_untrimmed() {
        let mut arena = Arena::new();
        for _ in 0..8 {
            arena.alloc(10_000);
        }
        let retained = arena.retained();
        assert!(retained < MIN_RETAINED_BYTES);

        arena.reset();
        // Under the 1 MiB floor nothing is released.
        assert_eq!(arena.retained(), retained);
    }

    proptest! {
        #[test]
        fn used_matches_sum_of_allocations(sizes in prop::collection::vec(0usize..4096, 0..32)) {
            let mut arena = Arena::new();
            let expected: usize = sizes.iter().sum();
            for &size in &sizes {
                arena.alloc(size);
            }
            prop_assert_eq!(arena.used(), expected);
            arena.reset();
            prop_assert_eq!(arena.used(), 0);
        }

        #[test]
        fn alloc_slice_preserves_content(data in prop::collection::vec(any::<u8>(), 0..2048)) {
            let arena = Arena::new();
            let copy = arena.alloc_slice(&data);
            prop_assert_eq!(&copy[..], &data[..]);
        }
    }
}
