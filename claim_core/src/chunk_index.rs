//! Chunk-bucketed index of top-level claims.
//!
//! Every chunk a claim's footprint touches holds the claim's id. Buckets are
//! immutable `Arc<[ClaimId]>` slices replaced wholesale on every mutation, so
//! a reader holding a bucket snapshot never observes a half-applied change.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::claim::{ClaimId, ClaimRecord};
use crate::geometry::{BlockPos, ClaimBounds};

/// Default log2 of the chunk edge length (16 blocks).
pub const DEFAULT_CHUNK_SHIFT: u32 = 4;

/// Largest shift an `i32` block coordinate can take.
pub const MAX_CHUNK_SHIFT: u32 = 31;

/// Packed `(chunk_x, chunk_z)` pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey(u64);

impl ChunkKey {
    pub fn new(chunk_x: i32, chunk_z: i32) -> Self {
        Self((u64::from(chunk_x as u32) << 32) | u64::from(chunk_z as u32))
    }

    /// Chunk holding the given block column. Arithmetic shift floors negatives.
    pub fn containing(x: i32, z: i32, shift: u32) -> Self {
        Self::new(x >> shift, z >> shift)
    }

    pub fn for_block(pos: BlockPos, shift: u32) -> Self {
        Self::containing(pos.x, pos.z, shift)
    }

    pub fn x(&self) -> i32 {
        (self.0 >> 32) as u32 as i32
    }

    pub fn z(&self) -> i32 {
        self.0 as u32 as i32
    }

    pub fn packed(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkKey({}, {})", self.x(), self.z())
    }
}

#[derive(Debug, Clone)]
pub struct ChunkIndex {
    shift: u32,
    buckets: HashMap<ChunkKey, Arc<[ClaimId]>>,
}

impl Default for ChunkIndex {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SHIFT)
    }
}

impl ChunkIndex {
    pub fn new(shift: u32) -> Self {
        Self {
            shift: shift.min(MAX_CHUNK_SHIFT),
            buckets: HashMap::new(),
        }
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    /// Number of chunks [`ChunkIndex::chunks_for`] would return, without
    /// building the list.
    pub fn chunk_count(&self, bounds: &ClaimBounds) -> u64 {
        let lesser = bounds.lesser();
        let greater = bounds.greater();
        let span_x = i64::from(greater.x >> self.shift) - i64::from(lesser.x >> self.shift) + 1;
        let span_z = i64::from(greater.z >> self.shift) - i64::from(lesser.z >> self.shift) + 1;
        (span_x as u64).saturating_mul(span_z as u64)
    }

    /// Every chunk the footprint touches, partial edge chunks included.
    ///
    /// Allocates one key per chunk; callers bound the footprint first.
    pub fn chunks_for(&self, bounds: &ClaimBounds) -> Vec<ChunkKey> {
        let lesser = bounds.lesser();
        let greater = bounds.greater();
        let (min_cx, min_cz) = (lesser.x >> self.shift, lesser.z >> self.shift);
        let (max_cx, max_cz) = (greater.x >> self.shift, greater.z >> self.shift);
        let mut keys = Vec::with_capacity(self.chunk_count(bounds).min(1 << 16) as usize);
        for cx in min_cx..=max_cx {
            for cz in min_cz..=max_cz {
                keys.push(ChunkKey::new(cx, cz));
            }
        }
        keys
    }

    /// Add the claim to every bucket it touches. Re-inserting is a no-op.
    pub fn insert(&mut self, claim: &ClaimRecord) {
        self.insert_bounds(claim.id(), claim.bounds());
    }

    pub(crate) fn insert_bounds(&mut self, id: ClaimId, bounds: &ClaimBounds) {
        for key in self.chunks_for(bounds) {
            let bucket = self
                .buckets
                .entry(key)
                .or_insert_with(|| Arc::from(Vec::new()));
            if bucket.contains(&id) {
                continue;
            }
            let mut next = Vec::with_capacity(bucket.len() + 1);
            next.extend_from_slice(&bucket[..]);
            next.push(id);
            *bucket = Arc::from(next);
        }
    }

    /// Drop the claim from every bucket it touches; empty buckets are pruned.
    pub fn remove(&mut self, claim: &ClaimRecord) {
        self.remove_bounds(claim.id(), claim.bounds());
    }

    pub(crate) fn remove_bounds(&mut self, id: ClaimId, bounds: &ClaimBounds) {
        for key in self.chunks_for(bounds) {
            let Some(bucket) = self.buckets.get_mut(&key) else {
                continue;
            };
            if !bucket.contains(&id) {
                continue;
            }
            let next: Vec<ClaimId> = bucket.iter().copied().filter(|c| *c != id).collect();
            if next.is_empty() {
                self.buckets.remove(&key);
            } else {
                *bucket = Arc::from(next);
            }
        }
    }

    /// Snapshot of the claims listed for a chunk. Callers filter out inactive ids.
    pub fn candidates_at(&self, key: ChunkKey) -> Arc<[ClaimId]> {
        self.buckets
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total number of (chunk, claim) entries.
    pub fn entry_count(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.len()).sum()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
