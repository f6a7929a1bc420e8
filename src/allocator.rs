//! Top-level façade: size-class routing, per-class active slab lists, slab
//! creation/retirement, and the public alloc/free/restore surface.

use std::sync::Arc;

use log::{trace, warn};
use spin::Mutex;

use crate::error::{AllocError, Result};
use crate::index::SlabIndex;
use crate::segment::SegmentManager;
use crate::size_class::{self, DEFAULT_INDEX_CAPACITY, SIZE_CLASSES, SLAB_SIZE};
use crate::slab::Slab;

/// Point-in-time diagnostic snapshot. Not part of the hot alloc/free path;
/// reading it acquires the same locks the operations it summarizes use.
#[derive(Debug, Clone, Copy)]
pub struct AllocatorStats {
    /// Number of slabs currently carved out of the region.
    pub live_slabs: usize,
    /// Bytes committed to live slabs (`live_slabs * SLAB_SIZE`).
    pub bytes_allocated: u64,
    /// Bytes still free in the segment manager's free list.
    pub bytes_free: u64,
}

/// Top-level NVM slab heap allocator.
///
/// Owns the [`SegmentManager`], the [`SlabIndex`], and every live [`Slab`].
/// The index holds `Arc` clones of slabs also referenced by the per-class
/// lists; lifecycle (creation and retirement) is driven exclusively by the
/// allocator under the lock ordering described in the crate's design notes:
/// class-list lock -> segment-manager lock -> slab-index lock -> per-slab
/// lock.
pub struct Allocator {
    segment: SegmentManager,
    index: SlabIndex,
    class_lists: Vec<Mutex<Vec<Arc<Slab>>>>,
}

impl Allocator {
    /// Creates an allocator over `[region_base, region_base + region_size)`
    /// with the default slab-index capacity.
    pub fn create(region_base: u64, region_size: u64) -> Option<Self> {
        Self::with_capacity(region_base, region_size, DEFAULT_INDEX_CAPACITY)
    }

    /// Like [`Allocator::create`], with an explicit slab-index bucket
    /// count (useful for tests that want to force collision chains).
    pub fn with_capacity(region_base: u64, region_size: u64, index_capacity: usize) -> Option<Self> {
        let segment = SegmentManager::create(region_size, region_base)?;
        Some(Self {
            segment,
            index: SlabIndex::new(index_capacity),
            class_lists: (0..SIZE_CLASSES.len()).map(|_| Mutex::new(Vec::new())).collect(),
        })
    }

    /// Releases every slab and all owned metadata. Equivalent to dropping
    /// the allocator; provided as an explicit operation to mirror the
    /// handle-based external interface.
    pub fn destroy(self) {}

    /// Allocates `size` bytes (`1 <= size <= 4096`), returning an offset
    /// into the region.
    pub fn alloc(&self, size: u32) -> Result<u64> {
        let class = size_class::classify(size).ok_or(AllocError::SizeRejected)?;
        let mut list = self.class_lists[class].lock();

        let slab = match list.iter().find(|s| !s.is_full()) {
            Some(s) => Arc::clone(s),
            None => {
                let offset = self.segment.alloc_slab_extent()?;
                let slab = Arc::new(Slab::create(class, offset));
                if !self.index.insert(offset, Arc::clone(&slab)) {
                    // Should be unreachable: the segment manager never
                    // hands out an offset already claimed by a live slab.
                    self.segment.free_slab_extent(offset);
                    return Err(AllocError::OutOfSpace);
                }
                list.push(Arc::clone(&slab));
                trace!("created slab class={class} base_offset={offset:#x}");
                slab
            }
        };

        let block_idx = slab.alloc().expect("slab selected as non-full must yield a block");
        Ok(slab.offset_of(block_idx))
    }

    /// Frees an offset previously returned by `alloc` or `restore`.
    /// Freeing an offset whose slab base is not tracked by this allocator
    /// is a fatal fault.
    pub fn free(&self, offset: u64) {
        let slab_base = (offset / SLAB_SIZE) * SLAB_SIZE;
        let slab = self
            .index
            .lookup(slab_base)
            .unwrap_or_else(|| panic!("free of unmanaged offset {offset:#x}"));

        let block_idx = slab.index_of(offset);
        slab.free(block_idx);

        if slab.is_empty() {
            self.maybe_retire(slab);
        }
    }

    /// Reconstructs allocator metadata for a block known to be live from a
    /// prior lifetime.
    pub fn restore(&self, offset: u64, size: u32) -> Result<()> {
        let class = size_class::classify(size).ok_or(AllocError::SizeRejected)?;
        let slab_base = (offset / SLAB_SIZE) * SLAB_SIZE;
        let mut list = self.class_lists[class].lock();

        let slab = match self.index.lookup(slab_base) {
            Some(existing) => {
                if existing.size_class() != class {
                    warn!(
                        "restore conflict: slab at {slab_base:#x} is class {} not {class}",
                        existing.size_class()
                    );
                    return Err(AllocError::RestoreConflict);
                }
                existing
            }
            None => {
                self.segment.claim_extent_at(slab_base)?;
                let slab = Arc::new(Slab::create(class, slab_base));
                if !self.index.insert(slab_base, Arc::clone(&slab)) {
                    // Unreachable in practice: claim_extent_at only
                    // succeeds for a base offset no other slab occupies.
                    self.segment.free_slab_extent(slab_base);
                    return Err(AllocError::RestoreConflict);
                }
                list.push(Arc::clone(&slab));
                trace!("restored slab class={class} base_offset={slab_base:#x}");
                slab
            }
        };

        let block_idx = slab.index_of(offset);
        slab.restore(block_idx)
    }

    /// Current diagnostic snapshot.
    pub fn stats(&self) -> AllocatorStats {
        let live_slabs = self.index.len();
        AllocatorStats {
            live_slabs,
            bytes_allocated: live_slabs as u64 * SLAB_SIZE,
            bytes_free: self.segment.free_bytes(),
        }
    }

    /// Retires `slab` if the class-list lock confirms it is still empty
    /// and another slab of the same class remains (the class always keeps
    /// at least one slab once it has created one, as a warm buffer).
    fn maybe_retire(&self, slab: Arc<Slab>) {
        let class = slab.size_class();
        let mut list = self.class_lists[class].lock();
        if list.len() <= 1 || !slab.is_empty() {
            return;
        }
        let Some(pos) = list.iter().position(|s| Arc::ptr_eq(s, &slab)) else {
            return;
        };
        list.remove(pos);

        let base_offset = slab.base_offset();
        self.index.remove(base_offset);
        self.segment.free_slab_extent(base_offset);
        trace!("retired slab class={class} base_offset={base_offset:#x}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLAB: u64 = SLAB_SIZE;

    #[test]
    fn alloc_zero_and_oversize_are_rejected() {
        let a = Allocator::create(0, 10 * SLAB).unwrap();
        assert_eq!(a.alloc(0), Err(AllocError::SizeRejected));
        assert_eq!(a.alloc(4097), Err(AllocError::SizeRejected));
        assert!(a.alloc(4096).is_ok());
    }

    #[test]
    fn scenario_first_two_allocs_then_free_hits_cache() {
        let a = Allocator::create(0, 10 * SLAB).unwrap();
        assert_eq!(a.alloc(60).unwrap(), 0);
        assert_eq!(a.alloc(60).unwrap(), 64);
        a.free(0);
        assert_eq!(a.alloc(60).unwrap(), 0);
    }

    #[test]
    fn restore_carves_exact_extent_and_leaves_two_free_segments() {
        let a = Allocator::create(0, 10 * SLAB).unwrap();
        let offset = 2 * SLAB + 64; // block index 1 in a 64B-class slab at base 2*SLAB
        a.restore(offset, 60).unwrap();
        let stats = a.stats();
        assert_eq!(stats.live_slabs, 1);
        assert_eq!(stats.bytes_free, 9 * SLAB); // split into [0, 2*SLAB) and [3*SLAB, 10*SLAB)
    }

    #[test]
    fn restore_class_mismatch_is_conflict() {
        let a = Allocator::create(0, 10 * SLAB).unwrap();
        a.restore(0, 16).unwrap();
        assert_eq!(a.restore(32, 32), Err(AllocError::RestoreConflict));
    }

    #[test]
    fn retirement_keeps_last_slab_of_a_class() {
        let a = Allocator::create(0, 10 * SLAB).unwrap();
        let offset = a.alloc(8).unwrap();
        a.free(offset);
        assert_eq!(a.stats().live_slabs, 1); // sole slab retained as warm buffer
    }

    #[test]
    fn retirement_removes_second_empty_slab_of_a_class() {
        let a = Allocator::create(0, 10 * SLAB).unwrap();
        // Fill the first 8B-class slab completely, forcing a second slab.
        let total = size_class::total_blocks(0);
        let mut offsets = Vec::new();
        for _ in 0..total {
            offsets.push(a.alloc(8).unwrap());
        }
        let second = a.alloc(8).unwrap(); // lives in a freshly created second slab
        assert_eq!(a.stats().live_slabs, 2);
        a.free(second);
        assert_eq!(a.stats().live_slabs, 1); // second (now empty) slab retired
        for o in offsets {
            a.free(o);
        }
        assert_eq!(a.stats().live_slabs, 1); // first slab kept as warm buffer
    }

    #[test]
    #[should_panic(expected = "unmanaged offset")]
    fn free_of_unmanaged_offset_panics() {
        let a = Allocator::create(0, 10 * SLAB).unwrap();
        a.free(5 * SLAB);
    }

    #[test]
    fn alloc_free_balance_returns_region_to_one_free_segment() {
        let a = Allocator::create(0, 4 * SLAB).unwrap();
        let mut offsets = Vec::new();
        for _ in 0..10 {
            offsets.push(a.alloc(4096).unwrap());
        }
        for o in offsets {
            a.free(o);
        }
        let stats = a.stats();
        assert_eq!(stats.live_slabs, 1); // warm buffer retained
        assert_eq!(stats.bytes_free, 3 * SLAB);
    }
}
