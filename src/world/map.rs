//! Tensors anchored to world-space boxes.
//!
//! A world map pairs a tensor with a voxel-aligned box; translating a
//! world position to a chunk is one subtraction and one floor division.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{IVec3, UVec3};

use crate::math::{floor_div, is_shard_aligned, Aabb};
use crate::tensor::{ChunkHandle, Tensor, CHUNK_DIM, CHUNK_SHAPE};

/// A tensor covering the world box `aabb`.
#[derive(Clone, Debug)]
pub struct WorldMap<T> {
    pub aabb: Aabb,
    pub tensor: Tensor<T>,
}

impl<T: Copy + Eq> WorldMap<T> {
    pub fn new(aabb: Aabb, tensor: Tensor<T>) -> Self {
        assert!(is_shard_aligned(aabb.min), "world map must be shard aligned");
        assert_eq!(
            tensor.shape(),
            aabb.size().as_uvec3(),
            "tensor shape must match the box"
        );
        Self { aabb, tensor }
    }

    /// A map holding one value across the whole box.
    pub fn filled(aabb: Aabb, value: T) -> Self {
        Self::new(aabb, Tensor::filled(aabb.size().as_uvec3(), value))
    }

    pub fn contains(&self, pos: IVec3) -> bool {
        self.aabb.contains(pos)
    }

    pub fn world_to_tensor(&self, pos: IVec3) -> UVec3 {
        (pos - self.aabb.min).as_uvec3()
    }

    pub fn tensor_to_world(&self, pos: UVec3) -> IVec3 {
        self.aabb.min + pos.as_ivec3()
    }

    /// Value at a world position inside the box.
    pub fn get(&self, pos: IVec3) -> T {
        assert!(self.contains(pos), "world position out of range");
        self.tensor.get(self.world_to_tensor(pos))
    }

    /// Value at a world position, or `None` outside the box.
    pub fn maybe_get(&self, pos: IVec3) -> Option<T> {
        if self.contains(pos) {
            Some(self.tensor.get(self.world_to_tensor(pos)))
        } else {
            None
        }
    }

    fn chunk_grid_pos(&self, pos: IVec3) -> UVec3 {
        assert!(self.contains(pos), "world position out of range");
        floor_div(pos - self.aabb.min, CHUNK_DIM as i32).as_uvec3()
    }

    /// Handle of the chunk containing a world position.
    pub fn chunk(&self, pos: IVec3) -> &ChunkHandle<T> {
        self.tensor.chunk(self.chunk_grid_pos(pos))
    }

    /// Replace the chunk containing a world position.
    pub fn set_chunk(&mut self, pos: IVec3, chunk: ChunkHandle<T>) {
        let cpos = self.chunk_grid_pos(pos);
        self.tensor.set_chunk(cpos, chunk);
    }

    pub fn storage_size(&self) -> usize {
        std::mem::size_of::<Aabb>() + self.tensor.storage_size()
    }
}

/// A map over the intersection of `aabb` with the source box, sharing
/// the source's chunk handles.
pub fn sub_world_map<T: Copy + Eq>(map: &WorldMap<T>, aabb: Aabb) -> WorldMap<T> {
    let aabb = map.aabb.intersect(&aabb);
    assert!(!aabb.is_empty(), "sub box does not overlap the map");
    assert!(
        is_shard_aligned(aabb.min) && is_shard_aligned(aabb.max),
        "sub box must be shard aligned"
    );

    let grid = (aabb.size() / CHUNK_DIM as i32).as_uvec3();
    let base = floor_div(aabb.min - map.aabb.min, CHUNK_DIM as i32).as_uvec3();
    let mut chunks = Vec::with_capacity((grid.x * grid.y * grid.z) as usize);
    for cz in 0..grid.z {
        for cy in 0..grid.y {
            for cx in 0..grid.x {
                chunks.push(map.tensor.chunk(base + glam::uvec3(cx, cy, cz)).clone());
            }
        }
    }
    WorldMap::new(aabb, Tensor::from_chunks(aabb.size().as_uvec3(), chunks))
}

/// Accumulates per-shard chunk assignments and densifies them into one
/// world map.
#[derive(Debug)]
pub struct WorldMapBuilder<T> {
    aabb: Aabb,
    chunks: HashMap<IVec3, ChunkHandle<T>>,
}

impl<T: Copy + Eq> WorldMapBuilder<T> {
    pub fn new() -> Self {
        Self {
            aabb: Aabb::empty(),
            chunks: HashMap::new(),
        }
    }

    /// Install the single-chunk tensor `block` at the shard `pos`.
    pub fn assign_block(&mut self, pos: IVec3, block: &Tensor<T>) {
        assert!(is_shard_aligned(pos), "shard position must be aligned");
        assert_eq!(block.shape(), CHUNK_SHAPE, "block must be one chunk");
        self.chunks.insert(pos, block.chunk(UVec3::ZERO).clone());
        self.aabb = self
            .aabb
            .union(&Aabb::cube(CHUNK_DIM as i32).shift(pos));
    }

    /// Union box of all assignments so far.
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    /// Number of shards assigned so far.
    pub fn assigned_count(&self) -> usize {
        self.chunks.len()
    }

    /// Densify into a map over `aabb`; unassigned shards hold `fill`.
    pub fn build(self, aabb: Aabb, fill: T) -> WorldMap<T> {
        assert!(!aabb.is_empty(), "cannot build an empty world map");
        let mut map = WorldMap::filled(aabb, fill);
        for (pos, chunk) in self.chunks {
            if aabb.contains(pos) {
                map.set_chunk(pos, chunk);
            }
        }
        map
    }
}

impl<T: Copy + Eq> Default for WorldMapBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Chunk;
    use glam::{ivec3, uvec3};

    #[test]
    fn test_world_translation() {
        let aabb = Aabb::new(ivec3(-32, 0, 32), ivec3(32, 32, 64));
        let map = WorldMap::filled(aabb, 0u8);

        assert!(map.contains(ivec3(-32, 0, 32)));
        assert!(!map.contains(ivec3(32, 0, 32)));
        assert_eq!(map.world_to_tensor(ivec3(-32, 0, 32)), uvec3(0, 0, 0));
        assert_eq!(map.tensor_to_world(uvec3(63, 31, 31)), ivec3(31, 31, 63));
        assert_eq!(map.maybe_get(ivec3(0, 0, 40)), Some(0));
        assert_eq!(map.maybe_get(ivec3(0, 32, 40)), None);
    }

    #[test]
    fn test_set_chunk_copy_on_write() {
        let aabb = Aabb::new(ivec3(0, 0, 0), ivec3(64, 32, 32));
        let mut map = WorldMap::filled(aabb, 0u8);
        let shared = map.clone();

        map.set_chunk(ivec3(32, 0, 0), Arc::new(Chunk::fill(9)));
        assert_eq!(map.get(ivec3(40, 5, 5)), 9);
        assert_eq!(shared.get(ivec3(40, 5, 5)), 0);
        // The untouched chunk is still shared.
        assert!(Arc::ptr_eq(map.chunk(ivec3(0, 0, 0)), shared.chunk(ivec3(0, 0, 0))));
    }

    #[test]
    fn test_sub_world_map_shares_chunks() {
        let aabb = Aabb::new(ivec3(0, 0, 0), ivec3(96, 96, 96));
        let tensor = Tensor::filled(uvec3(96, 96, 96), 0u32)
            .map_chunks(|index, _, _| Arc::new(Chunk::fill(index as u32)));
        let map = WorldMap::new(aabb, tensor);

        let sub = sub_world_map(&map, Aabb::new(ivec3(0, 0, 0), ivec3(32, 32, 32)));
        assert_eq!(sub.tensor.shape(), uvec3(32, 32, 32));
        assert_eq!(sub.get(ivec3(0, 0, 0)), 0);

        let sub = sub_world_map(&map, Aabb::new(ivec3(32, 0, 0), ivec3(64, 32, 32)));
        assert_eq!(sub.get(ivec3(32, 0, 0)), 1);

        let sub = sub_world_map(&map, Aabb::new(ivec3(0, 32, 0), ivec3(32, 64, 32)));
        assert_eq!(sub.get(ivec3(0, 32, 0)), 3);

        let sub = sub_world_map(&map, Aabb::new(ivec3(0, 0, 32), ivec3(32, 32, 64)));
        assert_eq!(sub.get(ivec3(0, 0, 32)), 9);

        let sub = sub_world_map(&map, Aabb::new(ivec3(0, 0, 0), ivec3(64, 64, 64)));
        assert_eq!(sub.tensor.shape(), uvec3(64, 64, 64));
        assert_eq!(sub.get(ivec3(0, 0, 0)), 0);
        assert_eq!(sub.get(ivec3(32, 0, 0)), 1);
        assert_eq!(sub.get(ivec3(0, 32, 0)), 3);
        assert_eq!(sub.get(ivec3(0, 0, 32)), 9);
        assert_eq!(sub.get(ivec3(0, 32, 32)), 12);
        assert_eq!(sub.get(ivec3(32, 32, 32)), 13);
        assert!(Arc::ptr_eq(sub.chunk(ivec3(0, 0, 0)), map.chunk(ivec3(0, 0, 0))));
    }

    #[test]
    fn test_sub_world_map_clamps_to_intersection() {
        let map = WorldMap::filled(Aabb::new(ivec3(0, 0, 0), ivec3(64, 64, 64)), 5u8);
        let sub = sub_world_map(&map, Aabb::new(ivec3(32, 32, 32), ivec3(128, 128, 128)));
        assert_eq!(sub.aabb, Aabb::new(ivec3(32, 32, 32), ivec3(64, 64, 64)));
    }

    #[test]
    fn test_builder_fills_holes() {
        let mut builder = WorldMapBuilder::new();
        builder.assign_block(ivec3(0, 0, 0), &crate::tensor::make_chunk_tensor(1u8));
        builder.assign_block(ivec3(64, 0, 0), &crate::tensor::make_chunk_tensor(3u8));
        assert_eq!(builder.aabb(), Aabb::new(ivec3(0, 0, 0), ivec3(96, 32, 32)));
        assert_eq!(builder.assigned_count(), 2);

        let aabb = builder.aabb();
        let map = builder.build(aabb, 0u8);
        assert_eq!(map.get(ivec3(5, 5, 5)), 1);
        assert_eq!(map.get(ivec3(40, 5, 5)), 0); // hole
        assert_eq!(map.get(ivec3(70, 5, 5)), 3);
    }
}
