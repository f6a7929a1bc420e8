//! Address-ordered, coalescing free list of slab-sized extents over the
//! NVM address space.

use spin::Mutex;

use crate::error::{AllocError, Result};
use crate::size_class::SLAB_SIZE;

/// A contiguous, free, un-carved run of NVM: `[offset, offset + size)`.
/// `size` is always a positive multiple of `SLAB_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FreeSegment {
    offset: u64,
    size: u64,
}

struct SegmentList {
    /// Address-ordered; adjacent entries are never touching (they would
    /// have been coalesced).
    segments: Vec<FreeSegment>,
}

/// Owns the free-extent list for one NVM region and grants/reclaims
/// slab-sized extents from it.
pub struct SegmentManager {
    list: Mutex<SegmentList>,
}

impl SegmentManager {
    /// Initializes a manager with a single free segment covering
    /// `[region_start_offset, region_start_offset + region_size)`.
    /// Fails (returns `None`) if `region_size < SLAB_SIZE`.
    pub fn create(region_size: u64, region_start_offset: u64) -> Option<Self> {
        if region_size < SLAB_SIZE {
            return None;
        }
        Some(Self {
            list: Mutex::new(SegmentList {
                segments: vec![FreeSegment {
                    offset: region_start_offset,
                    size: region_size,
                }],
            }),
        })
    }

    /// First-fit: returns a slab-aligned offset whose `SLAB_SIZE` extent has
    /// been removed from the free list, or [`AllocError::OutOfSpace`] if no
    /// segment is large enough.
    pub fn alloc_slab_extent(&self) -> Result<u64> {
        let mut list = self.list.lock();
        let idx = list
            .segments
            .iter()
            .position(|s| s.size >= SLAB_SIZE)
            .ok_or(AllocError::OutOfSpace)?;

        let seg = list.segments[idx];
        if seg.size == SLAB_SIZE {
            list.segments.remove(idx);
        } else {
            list.segments[idx].offset += SLAB_SIZE;
            list.segments[idx].size -= SLAB_SIZE;
        }
        Ok(seg.offset)
    }

    /// Returns the extent `[offset, offset + SLAB_SIZE)` to the free list,
    /// coalescing with a touching predecessor and/or successor. Overlap
    /// with an existing free segment is a double-free and a fatal fault.
    pub fn free_slab_extent(&self, offset: u64) {
        let mut list = self.list.lock();
        let insert_at = list
            .segments
            .iter()
            .position(|s| s.offset > offset)
            .unwrap_or(list.segments.len());

        if let Some(prev) = insert_at.checked_sub(1).and_then(|i| list.segments.get(i)) {
            assert!(
                prev.offset + prev.size <= offset,
                "double free or overlap at offset {offset}"
            );
        }
        if let Some(next) = list.segments.get(insert_at) {
            assert!(
                offset + SLAB_SIZE <= next.offset,
                "double free or overlap at offset {offset}"
            );
        }

        let merge_prev = insert_at > 0 && {
            let prev = list.segments[insert_at - 1];
            prev.offset + prev.size == offset
        };
        let merge_next = insert_at < list.segments.len() && {
            let next = list.segments[insert_at];
            offset + SLAB_SIZE == next.offset
        };

        match (merge_prev, merge_next) {
            (true, true) => {
                let next_size = list.segments[insert_at].size;
                list.segments.remove(insert_at);
                list.segments[insert_at - 1].size += SLAB_SIZE + next_size;
            }
            (true, false) => {
                list.segments[insert_at - 1].size += SLAB_SIZE;
            }
            (false, true) => {
                list.segments[insert_at].offset = offset;
                list.segments[insert_at].size += SLAB_SIZE;
            }
            (false, false) => {
                list.segments.insert(insert_at, FreeSegment { offset, size: SLAB_SIZE });
            }
        }
    }

    /// Used by restore: carves the exact `[offset, offset + SLAB_SIZE)`
    /// extent out of whichever free segment contains it. Fails with
    /// [`AllocError::RestoreConflict`] if no free segment covers it.
    pub fn claim_extent_at(&self, offset: u64) -> Result<()> {
        let mut list = self.list.lock();
        let end = offset + SLAB_SIZE;
        let idx = list
            .segments
            .iter()
            .position(|s| s.offset <= offset && s.offset + s.size >= end)
            .ok_or(AllocError::RestoreConflict)?;
        let seg = list.segments[idx];

        if seg.offset == offset && seg.size == SLAB_SIZE {
            // (i) exact match
            list.segments.remove(idx);
        } else if seg.offset == offset {
            // (ii) head-aligned: shrink from the front
            list.segments[idx].offset = end;
            list.segments[idx].size -= SLAB_SIZE;
        } else if seg.offset + seg.size == end {
            // (iii) tail-aligned: shrink from the back
            list.segments[idx].size -= SLAB_SIZE;
        } else {
            // (iv) interior: split into head and tail remainders
            let head = FreeSegment { offset: seg.offset, size: offset - seg.offset };
            let tail = FreeSegment { offset: end, size: seg.offset + seg.size - end };
            list.segments[idx] = head;
            list.segments.insert(idx + 1, tail);
        }
        Ok(())
    }

    /// Snapshot of the free list as `(offset, size)` pairs, address-ordered.
    /// Intended for diagnostics and tests, not the hot path.
    pub fn free_extents(&self) -> Vec<(u64, u64)> {
        self.list.lock().segments.iter().map(|s| (s.offset, s.size)).collect()
    }

    /// Sum of all free-segment sizes.
    pub fn free_bytes(&self) -> u64 {
        self.list.lock().segments.iter().map(|s| s.size).sum()
    }
}
