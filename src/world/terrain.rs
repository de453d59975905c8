//! Layered terrain storage.
//!
//! A terrain map is a set of co-shaped world maps over one box: the
//! generated seed layer, an optional per-voxel diff layer of edits, the
//! materialised effective terrain (diff over seed), and the attribute
//! layers the simulators read and write. Updates are shard-aligned
//! chunk replacements; a diff update re-derives the effective terrain
//! for that shard.

use std::sync::Arc;

use glam::{IVec3, UVec3};

use crate::math::{is_shard_aligned, Aabb};
use crate::tensor::{array, decode_chunk_pos, Chunk, Tensor, CHUNK_SHAPE, CHUNK_VOLUME};
use crate::world::map::{WorldMap, WorldMapBuilder};
use crate::world::stream::Stream;

/// Identifier of a terrain block or flora.
pub type TerrainId = u32;

/// Flora ids live above this base; everything below is a block.
const FLORA_ID_BASE: TerrainId = 1 << 24;

/// Whether the id names a solid block (as opposed to air or flora).
pub fn is_block(id: TerrainId) -> bool {
    id != 0 && id < FLORA_ID_BASE
}

/// Blocks occlude sky light.
pub fn is_occlusive(id: TerrainId) -> bool {
    is_block(id)
}

/// Blocks collide; air and flora do not.
pub fn is_collidable(id: TerrainId) -> bool {
    is_block(id)
}

/// Water can pass through air and non-collidable terrain.
pub fn is_flowable(id: TerrainId) -> bool {
    id == 0 || !is_collidable(id)
}

/// A single-chunk tensor of terrain ids.
pub type VolumeChunk = Tensor<TerrainId>;
/// A single-chunk tensor of optional terrain overrides.
pub type SparseChunk = Tensor<Option<TerrainId>>;
/// A single-chunk tensor of byte attributes (dye, growth, water,
/// occlusion).
pub type ByteChunk = Tensor<u8>;
/// A single-chunk tensor of packed irradiance values.
pub type IrradianceChunk = Tensor<u32>;

/// Stream of world positions whose terrain changed.
pub type TerrainStream = Stream<IVec3>;

/// The layered terrain state of a world region.
#[derive(Clone, Debug)]
pub struct TerrainMap {
    pub seeds: WorldMap<TerrainId>,
    pub diffs: WorldMap<Option<TerrainId>>,
    pub terrains: WorldMap<TerrainId>,
    pub dyes: WorldMap<u8>,
    pub growths: WorldMap<u8>,
    pub waters: WorldMap<u8>,
    pub irradiances: WorldMap<u32>,
    pub occlusions: WorldMap<u8>,
}

impl TerrainMap {
    pub fn aabb(&self) -> Aabb {
        self.seeds.aabb
    }

    pub fn contains(&self, pos: IVec3) -> bool {
        self.seeds.contains(pos)
    }

    pub fn get_seed(&self, pos: IVec3) -> TerrainId {
        self.seeds.get(pos)
    }

    pub fn get_diff(&self, pos: IVec3) -> Option<TerrainId> {
        self.diffs.get(pos)
    }

    pub fn get_dye(&self, pos: IVec3) -> u8 {
        self.dyes.get(pos)
    }

    pub fn get_growth(&self, pos: IVec3) -> u8 {
        self.growths.get(pos)
    }

    /// Effective terrain via the merge rule (diff overrides seed).
    pub fn get(&self, pos: IVec3) -> TerrainId {
        self.get_diff(pos).unwrap_or_else(|| self.get_seed(pos))
    }

    /// Effective terrain from the materialised layer.
    pub fn get_terrain(&self, pos: IVec3) -> TerrainId {
        self.terrains.get(pos)
    }

    /// Visit every world position whose effective terrain equals `id`.
    pub fn find(&self, id: TerrainId, mut fn_: impl FnMut(IVec3)) {
        self.seeds.tensor.find(
            |val| val == id,
            |pos, _| {
                let world = self.seeds.tensor_to_world(pos);
                if self.get_diff(world).is_none() {
                    fn_(world);
                }
            },
        );
        self.diffs
            .tensor
            .find(|val| val == Some(id), |pos, _| fn_(self.diffs.tensor_to_world(pos)));
    }

    fn check_update(&self, pos: IVec3, shape: UVec3) {
        assert_eq!(shape, CHUNK_SHAPE, "update must be one chunk");
        assert!(is_shard_aligned(pos), "update must be shard aligned");
        assert!(self.contains(pos), "update outside the map");
    }

    /// Install a diff chunk and re-derive the effective terrain there.
    pub fn update_diff(&mut self, pos: IVec3, diff: &SparseChunk) {
        self.check_update(pos, diff.shape());
        self.diffs.set_chunk(pos, diff.chunk(UVec3::ZERO).clone());
        self.update_terrain(pos);
    }

    pub fn update_water(&mut self, pos: IVec3, water: &ByteChunk) {
        self.check_update(pos, water.shape());
        self.waters.set_chunk(pos, water.chunk(UVec3::ZERO).clone());
    }

    pub fn update_irradiance(&mut self, pos: IVec3, irradiance: &IrradianceChunk) {
        self.check_update(pos, irradiance.shape());
        self.irradiances
            .set_chunk(pos, irradiance.chunk(UVec3::ZERO).clone());
    }

    pub fn update_dye(&mut self, pos: IVec3, dye: &ByteChunk) {
        self.check_update(pos, dye.shape());
        self.dyes.set_chunk(pos, dye.chunk(UVec3::ZERO).clone());
    }

    pub fn update_growth(&mut self, pos: IVec3, growth: &ByteChunk) {
        self.check_update(pos, growth.shape());
        self.growths.set_chunk(pos, growth.chunk(UVec3::ZERO).clone());
    }

    pub fn update_occlusion(&mut self, pos: IVec3, occlusion: &ByteChunk) {
        self.check_update(pos, occlusion.shape());
        self.occlusions
            .set_chunk(pos, occlusion.chunk(UVec3::ZERO).clone());
    }

    fn update_terrain(&mut self, pos: IVec3) {
        let merged = array::merge(
            &self.seeds.chunk(pos).array,
            &self.diffs.chunk(pos).array,
            |seed, diff| diff.unwrap_or(seed),
        );
        self.terrains.set_chunk(pos, Arc::new(Chunk::new(merged)));
    }

    pub fn storage_size(&self) -> usize {
        self.seeds.storage_size()
            + self.diffs.storage_size()
            + self.terrains.storage_size()
            + self.dyes.storage_size()
            + self.growths.storage_size()
            + self.waters.storage_size()
            + self.irradiances.storage_size()
            + self.occlusions.storage_size()
    }
}

/// Accumulates per-shard layer assignments and builds a [`TerrainMap`].
#[derive(Debug, Default)]
pub struct TerrainMapBuilder {
    seeds: WorldMapBuilder<TerrainId>,
    diffs: WorldMapBuilder<Option<TerrainId>>,
    waters: WorldMapBuilder<u8>,
    irradiances: WorldMapBuilder<u32>,
    dyes: WorldMapBuilder<u8>,
    growths: WorldMapBuilder<u8>,
    occlusions: WorldMapBuilder<u8>,
}

impl TerrainMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign_seed_block(&mut self, pos: IVec3, seed: &VolumeChunk) {
        self.seeds.assign_block(pos, seed);
    }

    pub fn assign_diff_block(&mut self, pos: IVec3, diff: &SparseChunk) {
        self.diffs.assign_block(pos, diff);
    }

    pub fn assign_water_block(&mut self, pos: IVec3, water: &ByteChunk) {
        self.waters.assign_block(pos, water);
    }

    pub fn assign_irradiance_block(&mut self, pos: IVec3, irradiance: &IrradianceChunk) {
        self.irradiances.assign_block(pos, irradiance);
    }

    pub fn assign_dye_block(&mut self, pos: IVec3, dye: &ByteChunk) {
        self.dyes.assign_block(pos, dye);
    }

    pub fn assign_growth_block(&mut self, pos: IVec3, growth: &ByteChunk) {
        self.growths.assign_block(pos, growth);
    }

    pub fn assign_occlusion_block(&mut self, pos: IVec3, occlusion: &ByteChunk) {
        self.occlusions.assign_block(pos, occlusion);
    }

    /// Union box of every assignment so far.
    pub fn aabb(&self) -> Aabb {
        self.seeds
            .aabb()
            .union(&self.diffs.aabb())
            .union(&self.waters.aabb())
            .union(&self.irradiances.aabb())
            .union(&self.dyes.aabb())
            .union(&self.growths.aabb())
            .union(&self.occlusions.aabb())
    }

    /// Number of shards the union box spans.
    pub fn shard_count(&self) -> u32 {
        (self.aabb().volume() / CHUNK_VOLUME as u64) as u32
    }

    /// Shards in the union box with no seed assignment.
    pub fn hole_count(&self) -> u32 {
        self.shard_count()
            .saturating_sub(self.seeds.assigned_count() as u32)
    }

    pub fn build(self) -> TerrainMap {
        let aabb = self.aabb();
        assert!(!aabb.is_empty(), "terrain builder received no shards");

        let seeds = self.seeds.build(aabb, 0);
        let diffs = self.diffs.build(aabb, None);
        let terrains = WorldMap::new(
            aabb,
            crate::tensor::tensor::merge(&seeds.tensor, &diffs.tensor, |seed, diff| {
                diff.unwrap_or(seed)
            }),
        );

        let map = TerrainMap {
            seeds,
            diffs,
            terrains,
            dyes: self.dyes.build(aabb, 0),
            growths: self.growths.build(aabb, 0),
            waters: self.waters.build(aabb, 0),
            irradiances: self.irradiances.build(aabb, 0),
            occlusions: self.occlusions.build(aabb, 0),
        };
        log::debug!(
            "built terrain map over {:?}, {} bytes",
            map.aabb(),
            map.storage_size()
        );
        map
    }
}

/// Applies shard edits and publishes the changed voxel positions.
pub struct TerrainWriter<'a> {
    map: &'a mut TerrainMap,
    stream: &'a mut TerrainStream,
}

impl<'a> TerrainWriter<'a> {
    pub fn new(map: &'a mut TerrainMap, stream: &'a mut TerrainStream) -> Self {
        Self { map, stream }
    }

    /// Replace the diff chunk at `pos`, emitting the world position of
    /// every voxel whose diff value changed. Returns whether anything
    /// changed.
    pub fn update_diff(&mut self, pos: IVec3, diff: &SparseChunk) -> bool {
        let old = self.map.diffs.chunk(pos).clone();
        let changed = self.publish_changes(pos, &old.array, &diff.chunk(UVec3::ZERO).array);
        self.map.update_diff(pos, diff);
        changed
    }

    /// Replace the dye chunk at `pos`, emitting changed positions.
    pub fn update_dye(&mut self, pos: IVec3, dye: &ByteChunk) -> bool {
        let old = self.map.dyes.chunk(pos).clone();
        let changed = self.publish_changes(pos, &old.array, &dye.chunk(UVec3::ZERO).array);
        self.map.update_dye(pos, dye);
        changed
    }

    fn publish_changes<T: Copy + Eq>(
        &mut self,
        pos: IVec3,
        old: &crate::tensor::RleArray<T>,
        new: &crate::tensor::RleArray<T>,
    ) -> bool {
        let mut changed = false;
        old.diff(new, |run, _, _| {
            changed = true;
            for i in run.pos..run.end() {
                self.stream.write(pos + decode_chunk_pos(i).as_ivec3());
            }
        });
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{chunk_tensor_from_fn, make_chunk_tensor};
    use glam::ivec3;

    fn three_shard_map() -> TerrainMap {
        let mut builder = TerrainMapBuilder::new();
        builder.assign_seed_block(ivec3(0, 0, 0), &make_chunk_tensor(1));
        builder.assign_seed_block(ivec3(32, 0, 0), &make_chunk_tensor(2));
        builder.assign_seed_block(ivec3(64, 0, 0), &make_chunk_tensor(3));
        builder.assign_diff_block(ivec3(32, 0, 0), &make_chunk_tensor(Some(4)));
        builder.build()
    }

    #[test]
    fn test_merge_rule() {
        let map = three_shard_map();

        assert_eq!(map.get(ivec3(13, 10, 9)), 1);
        assert_eq!(map.get(ivec3(33, 10, 9)), 4);
        assert_eq!(map.get(ivec3(64, 10, 9)), 3);

        assert_eq!(map.get_seed(ivec3(13, 10, 9)), 1);
        assert_eq!(map.get_seed(ivec3(33, 10, 9)), 2);
        assert_eq!(map.get_seed(ivec3(64, 10, 9)), 3);

        assert_eq!(map.get_diff(ivec3(13, 10, 9)), None);
        assert_eq!(map.get_diff(ivec3(64, 10, 9)), None);
        assert_eq!(map.get_diff(ivec3(33, 10, 9)), Some(4));

        // The materialised layer agrees with the merge rule everywhere.
        for &pos in &[ivec3(13, 10, 9), ivec3(33, 10, 9), ivec3(64, 10, 9)] {
            assert_eq!(map.get_terrain(pos), map.get(pos));
        }
    }

    #[test]
    fn test_update_diff_rederives_terrain() {
        let mut map = three_shard_map();
        map.update_diff(ivec3(0, 0, 0), &make_chunk_tensor(Some(9)));
        assert_eq!(map.get_terrain(ivec3(5, 5, 5)), 9);

        map.update_diff(ivec3(0, 0, 0), &make_chunk_tensor(None));
        assert_eq!(map.get_terrain(ivec3(5, 5, 5)), 1);
    }

    #[test]
    fn test_hole_count() {
        let mut builder = TerrainMapBuilder::new();
        builder.assign_seed_block(ivec3(0, 0, 0), &make_chunk_tensor(1));
        builder.assign_seed_block(ivec3(64, 0, 0), &make_chunk_tensor(1));
        assert_eq!(builder.shard_count(), 3);
        assert_eq!(builder.hole_count(), 1);

        let map = builder.build();
        assert_eq!(map.get_seed(ivec3(40, 0, 0)), 0);
    }

    #[test]
    fn test_find_respects_diff_mask() {
        let mut builder = TerrainMapBuilder::new();
        builder.assign_seed_block(ivec3(0, 0, 0), &chunk_tensor_from_fn(|pos| {
            if pos == glam::uvec3(1, 2, 3) { 7 } else { 0 }
        }));
        builder.assign_diff_block(ivec3(0, 0, 0), &chunk_tensor_from_fn(|pos| {
            if pos == glam::uvec3(1, 2, 3) {
                Some(0)
            } else if pos == glam::uvec3(4, 4, 4) {
                Some(7)
            } else {
                None
            }
        }));
        let map = builder.build();

        let mut found = Vec::new();
        map.find(7, |pos| found.push(pos));
        // The seeded 7 is masked by a diff; the diffed 7 is reported.
        assert_eq!(found, vec![ivec3(4, 4, 4)]);
    }

    #[test]
    fn test_writer_emits_changed_positions() {
        let mut map = three_shard_map();
        let mut stream = TerrainStream::new();
        let mut sub = stream.subscribe();

        let diff = chunk_tensor_from_fn(|pos| {
            if pos.y == 0 && pos.z == 0 && pos.x < 2 {
                Some(5)
            } else {
                None
            }
        });
        let mut writer = TerrainWriter::new(&mut map, &mut stream);
        assert!(writer.update_diff(ivec3(64, 0, 0), &diff));

        let events = sub.read();
        assert_eq!(events.as_slice(), &[ivec3(64, 0, 0), ivec3(65, 0, 0)]);
        assert_eq!(map.get_terrain(ivec3(64, 0, 0)), 5);
        assert_eq!(map.get_terrain(ivec3(66, 0, 0)), 3);

        // Re-applying the same chunk changes nothing and emits nothing.
        let mut writer = TerrainWriter::new(&mut map, &mut stream);
        assert!(!writer.update_diff(ivec3(64, 0, 0), &diff));
        assert!(sub.read().is_empty());
    }

    #[test]
    fn test_classifiers() {
        assert!(!is_block(0));
        assert!(is_block(1));
        assert!(is_block(64));
        assert!(!is_block(16777231));

        assert!(is_occlusive(2));
        assert!(!is_occlusive(16777263));

        assert!(is_flowable(0));
        assert!(is_flowable(16777263));
        assert!(!is_flowable(3));
    }
}
