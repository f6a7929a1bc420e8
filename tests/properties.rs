//! Property-based round-trip and invariant checks for the allocator.

use proptest::prelude::*;

use nvm_slab_allocator::{size_class, Allocator, SLAB_SIZE};

const REGION_SLABS: u64 = 6;

#[derive(Debug, Clone, Copy)]
enum Op {
    Alloc(u32),
    FreeOldest,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..=4096).prop_map(Op::Alloc),
        Just(Op::FreeOldest),
    ]
}

proptest! {
    /// Any interleaving of alloc/free that eventually frees everything it
    /// allocated returns the region to a single free segment, and every
    /// per-class list ends with at most the warm-buffer slab.
    #[test]
    fn alloc_free_balance_restores_full_region(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let allocator = Allocator::create(0, REGION_SLABS * SLAB_SIZE).unwrap();
        let mut live: Vec<u64> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(size) => {
                    if let Ok(offset) = allocator.alloc(size) {
                        live.push(offset);
                    }
                }
                Op::FreeOldest => {
                    if let Some(offset) = live.pop() {
                        allocator.free(offset);
                    }
                }
            }
        }
        for offset in live {
            allocator.free(offset);
        }

        let stats = allocator.stats();
        // Every class that ever allocated keeps exactly one warm-buffer
        // slab; an upper bound of min(SIZE_CLASSES.len(), REGION_SLABS)
        // live slabs always holds once everything has been freed.
        let max_live = (size_class::SIZE_CLASSES.len() as u64).min(REGION_SLABS);
        prop_assert!(stats.live_slabs as u64 <= max_live);
        prop_assert_eq!(stats.bytes_free, (REGION_SLABS - stats.live_slabs as u64) * SLAB_SIZE);
    }

    /// restore(offset, size) on a fresh allocator reaches the same
    /// live-slab count and free-byte total as alloc(size) on another
    /// fresh allocator of the same shape, for any in-range size.
    #[test]
    fn restore_matches_alloc_on_fresh_allocator(size in 1u32..=4096) {
        let allocated = Allocator::create(0, REGION_SLABS * SLAB_SIZE).unwrap();
        let offset = allocated.alloc(size).unwrap();

        let restored = Allocator::create(0, REGION_SLABS * SLAB_SIZE).unwrap();
        restored.restore(offset, size).unwrap();

        prop_assert_eq!(allocated.stats().live_slabs, restored.stats().live_slabs);
        prop_assert_eq!(allocated.stats().bytes_free, restored.stats().bytes_free);
    }
}
