//! Water flow simulation.
//!
//! One pass recomputes a single chunk from the 3x3x3 neighbourhood of
//! water values around it. Water spreads sideways with one step of
//! decay, except from cells that are falling: water with flowable,
//! unsaturated space below it goes down instead of out.

use std::sync::Arc;

use glam::{ivec3, IVec3};

use crate::math::{is_shard_aligned, Aabb};
use crate::tensor::{array, decode_chunk_pos, Chunk, RleArrayBuilder, Tensor, CHUNK_DIM, CHUNK_SHAPE};
use crate::world::map::WorldMap;
use crate::world::terrain::{is_flowable, TerrainMap};

/// Fully saturated water level.
pub const MAX_WATER: u8 = 15;

const MASK_DIM: i32 = 3 * CHUNK_DIM as i32;

/// Dense water levels over a chunk and its 26 neighbours, indexed by
/// chunk-local positions in `[-32, 64)`.
struct WaterMask {
    values: Vec<u8>,
}

impl WaterMask {
    fn build(water: &WorldMap<u8>, chunk_pos: IVec3) -> Self {
        let mut values = vec![0u8; (MASK_DIM * MASK_DIM * MASK_DIM) as usize];
        let step = CHUNK_DIM as i32;
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let offset = step * ivec3(dx, dy, dz);
                    if !water.contains(chunk_pos + offset) {
                        continue;
                    }
                    let base = offset + IVec3::splat(step);
                    water.chunk(chunk_pos + offset).array.scan(|run, val| {
                        if val == 0 {
                            return;
                        }
                        for i in run.pos..run.end() {
                            let pos = base + decode_chunk_pos(i).as_ivec3();
                            values[Self::index(pos)] = val;
                        }
                    });
                }
            }
        }
        Self { values }
    }

    #[inline]
    fn index(pos: IVec3) -> usize {
        (pos.x + MASK_DIM * (pos.y + MASK_DIM * pos.z)) as usize
    }

    /// Water level at a chunk-local position in `[-32, 64)`; missing
    /// chunks read as dry.
    #[inline]
    fn get(&self, pos: IVec3) -> u8 {
        self.values[Self::index(pos + IVec3::splat(CHUNK_DIM as i32))]
    }
}

/// One relaxation pass over the chunk at `chunk_pos`. Returns the new
/// water chunk anchored at its box; the caller decides whether to
/// install it.
pub fn update_water(map: &TerrainMap, chunk_pos: IVec3) -> WorldMap<u8> {
    assert!(is_shard_aligned(chunk_pos), "chunk position must be aligned");
    assert!(map.contains(chunk_pos), "chunk outside the map");

    let mask = WaterMask::build(&map.waters, chunk_pos);

    // Flowability of the chunk's own terrain, diff over seed.
    let flow_shard = array::merge(
        &map.seeds.chunk(chunk_pos).array,
        &map.diffs.chunk(chunk_pos).array,
        |seed, diff| is_flowable(diff.unwrap_or(seed)),
    );

    // Falling water drops instead of spreading: there is flowable,
    // unsaturated space below it.
    let is_falling = |pos: IVec3| {
        let below = pos - IVec3::Y;
        let world = chunk_pos + below;
        map.contains(world)
            && is_flowable(map.get_terrain(world))
            && mask.get(below) != MAX_WATER
    };

    let mut out = RleArrayBuilder::new();
    flow_shard.scan(|run, flowable| {
        if !flowable {
            out.add_run(run.len, 0);
            return;
        }
        for i in run.pos..run.end() {
            let pos = decode_chunk_pos(i).as_ivec3();
            let val = mask.get(pos);
            if val >= MAX_WATER {
                out.add(MAX_WATER);
                continue;
            }

            let mut x_neg = mask.get(pos - IVec3::X);
            let mut x_pos = mask.get(pos + IVec3::X);
            let y_pos = mask.get(pos + IVec3::Y);
            let mut z_neg = mask.get(pos - IVec3::Z);
            let mut z_pos = mask.get(pos + IVec3::Z);

            if val == 0 && x_neg == 0 && x_pos == 0 && y_pos == 0 && z_neg == 0 && z_pos == 0 {
                out.add(0);
                continue;
            }

            if x_neg > 0 && is_falling(pos - IVec3::X) {
                x_neg = 0;
            }
            if x_pos > 0 && is_falling(pos + IVec3::X) {
                x_pos = 0;
            }
            if z_neg > 0 && is_falling(pos - IVec3::Z) {
                z_neg = 0;
            }
            if z_pos > 0 && is_falling(pos + IVec3::Z) {
                z_pos = 0;
            }

            let d_max = x_neg.max(x_pos).max(z_neg).max(z_pos);
            if y_pos >= d_max {
                // A column above keeps this cell saturated minus one.
                out.add((MAX_WATER - 1).min(y_pos));
            } else {
                out.add(d_max - 1);
            }
        }
    });

    WorldMap::new(
        Aabb::cube(CHUNK_DIM as i32).shift(chunk_pos),
        Tensor::from_chunks(CHUNK_SHAPE, vec![Arc::new(Chunk::new(out.build()))]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::chunk_tensor_from_fn;
    use crate::world::terrain::TerrainMapBuilder;
    use glam::uvec3;

    fn map_with(
        terrain: impl FnMut(glam::UVec3) -> u32,
        water: impl FnMut(glam::UVec3) -> u8,
    ) -> TerrainMap {
        let mut builder = TerrainMapBuilder::new();
        builder.assign_seed_block(IVec3::ZERO, &chunk_tensor_from_fn(terrain));
        builder.assign_water_block(IVec3::ZERO, &chunk_tensor_from_fn(water));
        builder.build()
    }

    #[test]
    fn test_water_falls_before_spreading() {
        // A source hanging in the open: it fills the cell below and
        // does not spread sideways.
        let source = uvec3(16, 16, 16);
        let map = map_with(|_| 0, |pos| if pos == source { MAX_WATER } else { 0 });

        let result = update_water(&map, IVec3::ZERO);
        assert_eq!(result.get(ivec3(16, 16, 16)), MAX_WATER);
        assert_eq!(result.get(ivec3(16, 15, 16)), MAX_WATER - 1);
        assert_eq!(result.get(ivec3(17, 16, 16)), 0);
        assert_eq!(result.get(ivec3(16, 16, 17)), 0);
    }

    #[test]
    fn test_water_spreads_on_a_floor() {
        // A source resting on stone spreads sideways with one step of
        // decay, and stops at a wall.
        let source = uvec3(16, 16, 16);
        let map = map_with(
            |pos| {
                if pos.y == 15 {
                    1 // floor
                } else if pos.x == 18 && pos.y == 16 {
                    1 // wall two steps east
                } else {
                    0
                }
            },
            |pos| if pos == source { MAX_WATER } else { 0 },
        );

        let result = update_water(&map, IVec3::ZERO);
        assert_eq!(result.get(ivec3(16, 16, 16)), MAX_WATER);
        assert_eq!(result.get(ivec3(17, 16, 16)), MAX_WATER - 1);
        assert_eq!(result.get(ivec3(15, 16, 16)), MAX_WATER - 1);
        assert_eq!(result.get(ivec3(16, 16, 17)), MAX_WATER - 1);
        // The wall itself holds no water.
        assert_eq!(result.get(ivec3(18, 16, 16)), 0);
        // The floor holds no water either.
        assert_eq!(result.get(ivec3(16, 15, 16)), 0);
    }

    #[test]
    fn test_spread_decays_to_zero() {
        // Iterate to quiescence: level drops by one per step from the
        // source and dies out at distance 15.
        let source = uvec3(4, 16, 16);
        let mut map = map_with(
            |pos| if pos.y == 15 { 1 } else { 0 },
            |pos| if pos == source { MAX_WATER } else { 0 },
        );

        for _ in 0..20 {
            let result = update_water(&map, IVec3::ZERO);
            map.update_water(IVec3::ZERO, &Tensor::from_chunks(
                CHUNK_SHAPE,
                vec![result.chunk(result.aabb.min).clone()],
            ));
        }

        for dx in 0..28 {
            let expected = (MAX_WATER as i32 - dx).max(0) as u8;
            assert_eq!(
                map.waters.get(ivec3(4 + dx, 16, 16)),
                expected,
                "distance {dx}"
            );
        }
    }

    #[test]
    fn test_saturated_column_stays_saturated() {
        // A full column above keeps the cell at 14 even with dry
        // horizontal neighbours.
        let map = map_with(
            |pos| if pos.y < 10 { 1 } else { 0 },
            |pos| {
                if pos.x == 16 && pos.z == 16 && pos.y >= 11 {
                    MAX_WATER
                } else {
                    0
                }
            },
        );

        let result = update_water(&map, IVec3::ZERO);
        assert_eq!(result.get(ivec3(16, 20, 16)), MAX_WATER);
        assert_eq!(result.get(ivec3(16, 10, 16)), MAX_WATER - 1);
    }
}
