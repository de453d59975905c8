//! Sky-occlusion simulation.
//!
//! Occlusion is an estimate of how much sky light reaches a voxel:
//! 0 is fully lit, [`MAX_OCCLUSION`] fully shadowed. Columns are
//! initialised with a top-down scan that shadows everything below the
//! first occlusive block, then a BFS relaxation lets light bleed
//! sideways into the shadowed region, one step of attenuation per
//! voxel.

use std::collections::VecDeque;
use std::sync::Arc;

use glam::{ivec3, IVec2, IVec3};

use crate::math::{Aabb, is_shard_aligned};
use crate::tensor::{decode_chunk_pos, Chunk, CHUNK_DIM};
use crate::world::map::{sub_world_map, WorldMap};
use crate::world::terrain::{is_occlusive, TerrainMap};
use crate::world::writer::ShardWriter;

/// Fully shadowed occlusion value.
pub const MAX_OCCLUSION: u8 = 15;

/// Attenuation per voxel of sideways propagation.
pub const OCCLUSION_STEP: u8 = 1;

const LAYER_SIZE: u32 = CHUNK_DIM * CHUNK_DIM;

/// Whether the shard at `pos` contains no occlusive terrain.
fn is_empty_shard(map: &TerrainMap, pos: IVec3) -> bool {
    !map.terrains.chunk(pos).array.any(is_occlusive)
}

/// Recompute the occlusion chunks of one (x, z) column from the terrain
/// alone, top to bottom. Returns the written shard origins.
pub fn initialize_column(
    map: &TerrainMap,
    occlusions: &mut WorldMap<u8>,
    column: IVec2,
) -> Vec<IVec3> {
    let (sx, sz) = (column.x, column.y);
    let Aabb { min: v0, max: v1 } = occlusions.aabb;

    let step = CHUNK_DIM as i32;
    let mut written = Vec::new();
    let mut sy = v1.y - step;

    // Emit the transparent prefix.
    while sy >= v0.y && is_empty_shard(map, ivec3(sx, sy, sz)) {
        occlusions.set_chunk(ivec3(sx, sy, sz), Arc::new(Chunk::fill(0)));
        written.push(ivec3(sx, sy, sz));
        sy -= step;
    }

    // Walk the mixed shards, tracking which (x, z) cells have passed
    // under an occlusive block. Each chunk array is reversed so the scan
    // runs top-down, then reversed back on the way out; the reversal
    // also mirrors x and z, but every shard in the column is mirrored
    // the same way, so the tracked cells line up across shards.
    let mut shadowed = [false; LAYER_SIZE as usize];
    while sy >= v0.y && !shadowed.iter().all(|&cell| cell) {
        let src = map.terrains.chunk(ivec3(sx, sy, sz)).array.reversed();
        let dst = src.map_dense(|pos, id| {
            let cell = (pos % LAYER_SIZE) as usize;
            if is_occlusive(id) {
                shadowed[cell] = true;
            }
            if shadowed[cell] { MAX_OCCLUSION } else { 0 }
        });
        occlusions.set_chunk(ivec3(sx, sy, sz), Arc::new(Chunk::new(dst.reversed())));
        written.push(ivec3(sx, sy, sz));
        sy -= step;
    }

    // Everything below is fully shadowed.
    while sy >= v0.y {
        occlusions.set_chunk(ivec3(sx, sy, sz), Arc::new(Chunk::fill(MAX_OCCLUSION)));
        written.push(ivec3(sx, sy, sz));
        sy -= step;
    }

    written
}

/// Seed the relaxation queue with the fully shadowed voxels of a column
/// that border an at-least-partly-lit cell.
pub fn schedule_column(
    map: &TerrainMap,
    occlusions: &WorldMap<u8>,
    column: IVec2,
) -> VecDeque<IVec3> {
    let (sx, sz) = (column.x, column.y);
    let Aabb { min: v0, max: v1 } = occlusions.aabb;

    let step = CHUNK_DIM as i32;
    let mut sy = v1.y - step;

    // Skip the fully transparent prefix.
    while sy >= v0.y && is_empty_shard(map, ivec3(sx, sy, sz)) {
        sy -= step;
    }

    let get_default = |pos: IVec3| {
        occlusions
            .maybe_get(pos)
            .or_else(|| map.occlusions.maybe_get(pos))
            .unwrap_or(MAX_OCCLUSION)
    };
    let lit = |pos: IVec3| get_default(pos) < MAX_OCCLUSION - 1;

    let mut queue = VecDeque::new();
    while sy >= v0.y {
        let origin = ivec3(sx, sy, sz);
        occlusions.chunk(origin).array.scan(|run, value| {
            if value != MAX_OCCLUSION {
                return;
            }
            for i in run.pos..run.end() {
                let pos = origin + decode_chunk_pos(i).as_ivec3();
                // Runs break on x faces, so only the run edges can have
                // a lit x neighbour.
                if i == run.pos && lit(pos - IVec3::X) {
                    queue.push_back(pos);
                    continue;
                }
                if i == run.end() - 1 && lit(pos + IVec3::X) {
                    queue.push_back(pos);
                    continue;
                }
                if lit(pos - IVec3::Z) || lit(pos + IVec3::Z) {
                    queue.push_back(pos);
                }
            }
        });
        sy -= step;
    }

    queue
}

fn get_default(writer: &ShardWriter<'_, u8>, pos: IVec3) -> u8 {
    if writer.contains(pos) {
        writer.get(pos)
    } else {
        MAX_OCCLUSION
    }
}

/// Relax the queued voxels until quiescent: each non-occlusive voxel
/// settles at one attenuation step above its least-occluded neighbour.
/// Returns the flushed shard origins.
pub fn process_queue(
    map: &TerrainMap,
    occlusions: &mut WorldMap<u8>,
    queue: &mut VecDeque<IVec3>,
) -> Vec<IVec3> {
    let mut writer = ShardWriter::new(occlusions);

    while let Some(pos) = queue.pop_front() {
        if !writer.contains(pos) {
            continue;
        }
        if is_occlusive(map.get_terrain(pos)) {
            continue;
        }

        let x_neg = get_default(&writer, pos - IVec3::X);
        let x_pos = get_default(&writer, pos + IVec3::X);
        let y_neg = get_default(&writer, pos - IVec3::Y);
        let y_pos = get_default(&writer, pos + IVec3::Y);
        let z_neg = get_default(&writer, pos - IVec3::Z);
        let z_pos = get_default(&writer, pos + IVec3::Z);
        let d_min = x_neg
            .min(x_pos)
            .min(y_neg)
            .min(y_pos)
            .min(z_neg)
            .min(z_pos);

        let old_val = writer.get(pos);
        let new_val = MAX_OCCLUSION.min(d_min + OCCLUSION_STEP);
        if old_val > new_val {
            writer.set(pos, new_val);
        } else {
            continue;
        }

        // Revisit each neighbour that might still relax downward.
        let mut push_if = |condition: bool, pos: IVec3| {
            if condition {
                queue.push_back(pos);
            }
        };
        push_if(x_neg > new_val + OCCLUSION_STEP, pos - IVec3::X);
        push_if(x_pos > new_val + OCCLUSION_STEP, pos + IVec3::X);
        push_if(y_neg > new_val + OCCLUSION_STEP, pos - IVec3::Y);
        push_if(y_pos > new_val + OCCLUSION_STEP, pos + IVec3::Y);
        push_if(z_neg > new_val + OCCLUSION_STEP, pos - IVec3::Z);
        push_if(z_pos > new_val + OCCLUSION_STEP, pos + IVec3::Z);
    }

    writer.flush()
}

/// Recompute the occlusion map of one chunk column, reading the
/// neighbouring columns for boundary light. Returns the map over the
/// column box only.
pub fn update_occlusion(map: &TerrainMap, column: IVec2) -> WorldMap<u8> {
    let step = CHUNK_DIM as i32;
    assert!(
        is_shard_aligned(ivec3(column.x, 0, column.y)),
        "column must be chunk aligned"
    );

    let column_aabb = Aabb::new(
        ivec3(column.x, map.aabb().min.y, column.y),
        ivec3(column.x + step, map.aabb().max.y, column.y + step),
    );
    let aabb = map
        .aabb()
        .intersect(&column_aabb.expand_chunks(ivec3(1, 0, 1), ivec3(1, 0, 1)));

    let mut working = sub_world_map(&map.occlusions, aabb);
    initialize_column(map, &mut working, column);
    let mut queue = schedule_column(map, &working, column);
    process_queue(map, &mut working, &mut queue);

    sub_world_map(&working, column_aabb)
}
