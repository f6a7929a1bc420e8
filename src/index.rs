//! Separately-chained hash table mapping slab-base-offset -> slab handle,
//! giving `free`/`restore` O(1) lookup on the fast path.

use std::sync::Arc;

use spin::RwLock;

use crate::size_class::SLAB_SIZE;
use crate::slab::Slab;

struct Entry {
    offset: u64,
    slab: Arc<Slab>,
}

struct Table {
    buckets: Vec<Vec<Entry>>,
    count: usize,
}

/// Fixed-capacity index from slab-base-offset to slab. Does not resize:
/// the number of live slabs is bounded by `region_size / SLAB_SIZE`, so a
/// fixed bucket count chosen up front (a prime near the expected slab
/// count) is sufficient.
pub struct SlabIndex {
    table: RwLock<Table>,
    capacity: usize,
}

impl SlabIndex {
    /// Creates an index with `capacity` buckets. `capacity` should be
    /// nonzero; degenerate capacities of 1 still work, just with every
    /// entry in one chain.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            table: RwLock::new(Table {
                buckets: (0..capacity).map(|_| Vec::new()).collect(),
                count: 0,
            }),
            capacity,
        }
    }

    /// Divides by `SLAB_SIZE` before taking the modulus so consecutive
    /// slabs land in consecutive buckets.
    fn bucket_for(&self, offset: u64) -> usize {
        ((offset / SLAB_SIZE) % self.capacity as u64) as usize
    }

    /// Inserts `slab` keyed by `offset`. Returns `false` without modifying
    /// the table if the key is already present.
    pub fn insert(&self, offset: u64, slab: Arc<Slab>) -> bool {
        let bucket = self.bucket_for(offset);
        let mut table = self.table.write();
        if table.buckets[bucket].iter().any(|e| e.offset == offset) {
            return false;
        }
        table.buckets[bucket].push(Entry { offset, slab });
        table.count += 1;
        true
    }

    /// Looks up the slab at `offset`, if any.
    pub fn lookup(&self, offset: u64) -> Option<Arc<Slab>> {
        let bucket = self.bucket_for(offset);
        let table = self.table.read();
        table.buckets[bucket]
            .iter()
            .find(|e| e.offset == offset)
            .map(|e| Arc::clone(&e.slab))
    }

    /// Removes and returns the slab at `offset`, if any.
    pub fn remove(&self, offset: u64) -> Option<Arc<Slab>> {
        let bucket = self.bucket_for(offset);
        let mut table = self.table.write();
        let chain = &mut table.buckets[bucket];
        let pos = chain.iter().position(|e| e.offset == offset)?;
        let entry = chain.remove(pos);
        table.count -= 1;
        Some(entry.slab)
    }

    /// Total number of entries currently stored.
    pub fn len(&self) -> usize {
        self.table.read().count
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
