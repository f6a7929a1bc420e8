//! Fixed size-class table and size -> class mapping.

use static_assertions::const_assert;

/// Size of a slab extent, in bytes. Every slab base offset is a multiple of
/// this, and so is the NVM region's start offset.
pub const SLAB_SIZE: u64 = 2 * 1024 * 1024;

/// The fixed block sizes this allocator supports, smallest first.
pub const SIZE_CLASSES: &[u32] = &[8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096];

/// Depth of a slab's FIFO free-block cache.
pub const CACHE_CAPACITY: usize = 64;

const_assert!(SIZE_CLASSES[0] > 0);
const_assert!(SLAB_SIZE % SIZE_CLASSES[SIZE_CLASSES.len() - 1] as u64 == 0);
const_assert!(CACHE_CAPACITY > 0);

/// Initial capacity of the slab index's bucket array, a prime near the
/// expected live-slab count for modest regions (mirrors the original
/// implementation's `INITIAL_HASHTABLE_CAPACITY`).
pub const DEFAULT_INDEX_CAPACITY: usize = 101;

/// Maps a requested allocation size to the smallest size class whose block
/// size is at least `size`. Returns `None` if `size` is zero or exceeds the
/// largest class.
pub fn classify(size: u32) -> Option<usize> {
    if size == 0 {
        return None;
    }
    SIZE_CLASSES.iter().position(|&block_size| size <= block_size)
}

/// Block size for a given size-class index.
pub fn block_size(class: usize) -> u32 {
    SIZE_CLASSES[class]
}

/// Number of blocks a slab of this size class holds.
pub fn total_blocks(class: usize) -> u32 {
    (SLAB_SIZE / block_size(class) as u64) as u32
}
