//! Batched shard edits and change suppression.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use glam::IVec3;

use crate::math::shard_origin;
use crate::tensor::{encode_chunk_pos, ArrayPos, Chunk, RangesBuilder, CHUNK_VOLUME};
use crate::world::map::WorldMap;

/// Buffers voxel writes per shard and commits them chunk-wise.
///
/// `get` observes the pending state, so relaxation loops can read their
/// own writes before the flush. `flush` rebuilds each dirty chunk
/// through a [`RangesBuilder`] and returns the dirty shard origins so
/// the owner can signal downstream.
pub struct ShardWriter<'a, T> {
    map: &'a mut WorldMap<T>,
    pending: HashMap<IVec3, HashMap<ArrayPos, T>>,
}

impl<'a, T: Copy + Eq> ShardWriter<'a, T> {
    pub fn new(map: &'a mut WorldMap<T>) -> Self {
        Self {
            map,
            pending: HashMap::new(),
        }
    }

    fn split(pos: IVec3) -> (IVec3, ArrayPos) {
        let origin = shard_origin(pos);
        (origin, encode_chunk_pos((pos - origin).as_uvec3()))
    }

    /// Whether the underlying map covers `pos`.
    pub fn contains(&self, pos: IVec3) -> bool {
        self.map.contains(pos)
    }

    /// Value at `pos`, including pending writes.
    pub fn get(&self, pos: IVec3) -> T {
        let (origin, local) = Self::split(pos);
        if let Some(edits) = self.pending.get(&origin) {
            if let Some(&val) = edits.get(&local) {
                return val;
            }
        }
        self.map.get(pos)
    }

    /// Record a write; committed on `flush`.
    pub fn set(&mut self, pos: IVec3, val: T) {
        assert!(self.map.contains(pos), "write outside the map");
        let (origin, local) = Self::split(pos);
        self.pending.entry(origin).or_default().insert(local, val);
    }

    /// Shards with uncommitted writes.
    pub fn dirty_count(&self) -> usize {
        self.pending.len()
    }

    /// Commit all pending writes and return the dirty shard origins.
    pub fn flush(self) -> Vec<IVec3> {
        let mut flushed = Vec::with_capacity(self.pending.len());
        for (origin, edits) in self.pending {
            let old = self.map.chunk(origin).clone();
            let mut builder = RangesBuilder::new(CHUNK_VOLUME, old.array.get(0));
            old.array
                .scan(|run, val| builder.add_range(run.pos, run.end(), val));
            for (&local, &val) in &edits {
                builder.add(local, val);
            }
            self.map.set_chunk(origin, Arc::new(Chunk::new(builder.build())));
            flushed.push(origin);
        }
        flushed
    }
}

/// Remembers the last observed checksum per shard so unchanged chunk
/// rewrites do not fan out as change events.
#[derive(Debug, Default)]
pub struct ChecksumMap {
    sums: HashMap<IVec3, u64>,
}

impl ChecksumMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the chunk's checksum; true when it differs from the last
    /// observation (or there was none).
    pub fn update<T: Copy + Eq + Hash>(&mut self, pos: IVec3, chunk: &Chunk<T>) -> bool {
        let mut hasher = DefaultHasher::new();
        chunk.hash(&mut hasher);
        let sum = hasher.finish();
        self.sums.insert(pos, sum) != Some(sum)
    }
}
