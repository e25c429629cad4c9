//! Staging arena for deferred uploads.
//!
//! A deferred context records resource data long before the consumer
//! thread uploads it. Instead of allocating a vector per command, the data
//! is bump-allocated from one growable byte arena owned by the deferred
//! context. Each allocation is a [`StagingRange`] owned by the command that
//! uploads it; once every range has been dropped the arena rewinds to the
//! start and its memory is reused by the next frame.
//!
//! # Thread Safety
//!
//! The arena is written by the producer and read by the consumer during
//! replay, so its storage lives behind a mutex shared by every range.

use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

#[derive(Debug)]
struct ArenaState {
    data: Vec<u8>,
    /// Next free byte.
    offset: usize,
    /// Number of live ranges.
    live: usize,
    grow_count: u64,
}

/// Byte region of a [`StagingArena`].
///
/// Dropping the last live range rewinds the arena.
pub(crate) struct StagingRange {
    arena: Arc<Mutex<ArenaState>>,
    offset: usize,
    len: usize,
}

impl StagingRange {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Lock the arena and get the bytes of this range.
    pub(crate) fn bytes(&self) -> MappedMutexGuard<'_, [u8]> {
        let (offset, len) = (self.offset, self.len);
        MutexGuard::map(self.arena.lock(), |state| &mut state.data[offset..offset + len])
    }
}

impl Drop for StagingRange {
    fn drop(&mut self) {
        let mut state = self.arena.lock();
        state.live -= 1;
        if state.live == 0 {
            state.offset = 0;
        }
    }
}

impl std::fmt::Debug for StagingRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingRange")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// Growable bump allocator for staged upload data.
#[derive(Debug)]
pub(crate) struct StagingArena {
    state: Arc<Mutex<ArenaState>>,
}

impl StagingArena {
    /// Alignment of every allocation in bytes.
    pub(crate) const ALIGNMENT: usize = 16;

    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ArenaState {
                data: vec![0; capacity],
                offset: 0,
                live: 0,
                grow_count: 0,
            })),
        }
    }

    /// Allocate `len` zeroed bytes.
    ///
    /// The arena grows when it is exhausted. Existing ranges keep their
    /// offsets and contents.
    pub(crate) fn allocate(&self, len: usize) -> StagingRange {
        let mut state = self.state.lock();
        let offset = state.offset.next_multiple_of(Self::ALIGNMENT);
        let end = offset + len;
        if end > state.data.len() {
            let new_capacity = end.max(state.data.len() * 2);
            log::debug!(
                "StagingArena: growing from {} to {} bytes",
                state.data.len(),
                new_capacity
            );
            state.data.resize(new_capacity, 0);
            state.grow_count += 1;
        }
        // Ranges reused after a rewind may hold stale bytes.
        state.data[offset..end].fill(0);
        state.offset = end;
        state.live += 1;

        StagingRange {
            arena: Arc::clone(&self.state),
            offset,
            len,
        }
    }

    /// Allocate a range holding a copy of `data`.
    pub(crate) fn stage(&self, data: &[u8]) -> StagingRange {
        let range = self.allocate(data.len());
        range.bytes().copy_from_slice(data);
        range
    }

    pub(crate) fn capacity(&self) -> usize {
        self.state.lock().data.len()
    }

    /// Bytes currently allocated, including alignment padding.
    pub(crate) fn used(&self) -> usize {
        self.state.lock().offset
    }

    /// Number of times the arena has grown.
    pub(crate) fn grow_count(&self) -> u64 {
        self.state.lock().grow_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocations_are_aligned() {
        let arena = StagingArena::new(256);
        let a = arena.allocate(3);
        let b = arena.allocate(5);
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, StagingArena::ALIGNMENT);
        assert_eq!(b.len(), 5);
        assert_eq!(arena.used(), StagingArena::ALIGNMENT + 5);
    }

    #[test]
    fn test_rewinds_when_all_ranges_dropped() {
        let arena = StagingArena::new(64);
        let a = arena.stage(&[1, 2, 3]);
        let b = arena.stage(&[4, 5]);
        drop(a);
        assert!(arena.used() > 0);
        drop(b);
        assert_eq!(arena.used(), 0);

        let c = arena.allocate(3);
        assert_eq!(&*c.bytes(), &[0, 0, 0]);
    }

    #[test]
    fn test_grows_and_keeps_contents() {
        let arena = StagingArena::new(8);
        let a = arena.stage(&[7; 8]);
        let b = arena.stage(&[9; 32]);
        assert_eq!(arena.grow_count(), 1);
        assert!(arena.capacity() >= 48);
        assert_eq!(&*a.bytes(), &[7; 8]);
        assert_eq!(&*b.bytes(), &[9; 32]);
    }
}
