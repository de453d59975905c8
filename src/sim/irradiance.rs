//! Coloured light simulation.
//!
//! Irradiance is a per-voxel `(r, g, b, intensity)` value. Two paths
//! compute it: an incremental per-channel flood fill driven by terrain
//! changes, and a dense convolution that recomputes one shard from a
//! padded window around it.
//!
//! The flood fill runs a two-phase update: a decreasing edit first
//! propagates a wave of zeros outward, and any neighbour that remains
//! bright re-illuminates the darkened cells. Dropping either phase
//! leaves light stuck on or off after edits.

use std::collections::VecDeque;

use glam::{IVec3, UVec3, Vec3};

use crate::math::{is_shard_aligned, Aabb};
use crate::tensor::{Tensor, CHUNK_DIM, CHUNK_SHAPE};
use crate::world::emissive::{emissive_channels, emissiveness, is_emissive, Colour, MAX_INTENSITY};
use crate::world::map::{sub_world_map, WorldMap};
use crate::world::terrain::{is_occlusive, TerrainId, TerrainMap};
use crate::world::writer::ShardWriter;

/// Unpacked per-voxel irradiance: r, g, b, intensity.
pub type Rgba = [u8; 4];

fn channel_default(writer: &ShardWriter<'_, Rgba>, pos: IVec3, channel: usize) -> u8 {
    if writer.contains(pos) {
        writer.get(pos)[channel]
    } else {
        0
    }
}

/// Flood-fill the irradiance map from the seed positions, one colour
/// channel at a time. Returns the flushed shard origins.
pub fn process_irradiance_queue(
    terrain: &TerrainMap,
    irradiance: &mut WorldMap<Rgba>,
    seeds: &[IVec3],
) -> Vec<IVec3> {
    let mut writer = ShardWriter::new(irradiance);

    for channel in 0..3 {
        let mut queue: VecDeque<IVec3> = seeds.iter().copied().collect();

        while let Some(pos) = queue.pop_front() {
            if !writer.contains(pos) {
                continue;
            }

            let x_neg = channel_default(&writer, pos - IVec3::X, channel);
            let x_pos = channel_default(&writer, pos + IVec3::X, channel);
            let y_neg = channel_default(&writer, pos - IVec3::Y, channel);
            let y_pos = channel_default(&writer, pos + IVec3::Y, channel);
            let z_neg = channel_default(&writer, pos - IVec3::Z, channel);
            let z_pos = channel_default(&writer, pos + IVec3::Z, channel);
            let d_max = x_neg
                .max(x_pos)
                .max(y_neg)
                .max(y_pos)
                .max(z_neg)
                .max(z_pos);

            let new_val = {
                let id = terrain.get_terrain(pos);
                if is_emissive(id) || is_occlusive(id) {
                    let dye = terrain.get_dye(pos);
                    let growth = terrain.get_growth(pos);
                    emissive_channels(id, dye, growth)[channel]
                } else {
                    d_max.saturating_sub(1)
                }
            };

            let old = writer.get(pos);
            if old[channel] > new_val {
                // Start of the dark wave: zero first, relight later.
                let mut val = old;
                val[channel] = 0;
                writer.set(pos, val);
            } else if old[channel] < new_val {
                let mut val = old;
                val[channel] = new_val;
                writer.set(pos, val);
            } else {
                continue;
            }

            // A neighbour needs a revisit if the new value can still
            // brighten it, or if it was supported by this cell's old
            // value and must re-derive its own.
            let old_c = old[channel] as i32;
            let new_c = new_val as i32;
            let mut push_if = |condition: bool, pos: IVec3| {
                if condition {
                    queue.push_back(pos);
                }
            };
            push_if(
                (x_neg as i32) < new_c - 1 || x_neg as i32 == old_c - 1,
                pos - IVec3::X,
            );
            push_if(
                (x_pos as i32) < new_c - 1 || x_pos as i32 == old_c - 1,
                pos + IVec3::X,
            );
            push_if(
                (y_neg as i32) < new_c - 1 || y_neg as i32 == old_c - 1,
                pos - IVec3::Y,
            );
            push_if(
                (y_pos as i32) < new_c - 1 || y_pos as i32 == old_c - 1,
                pos + IVec3::Y,
            );
            push_if(
                (z_neg as i32) < new_c - 1 || z_neg as i32 == old_c - 1,
                pos - IVec3::Z,
            );
            push_if(
                (z_pos as i32) < new_c - 1 || z_pos as i32 == old_c - 1,
                pos + IVec3::Z,
            );
            if old[channel] > new_val {
                // The darkened cell may be re-lit by a neighbour that
                // stayed bright.
                push_if(d_max > 1, pos);
            }
        }
    }

    writer.flush()
}

const WORK_DIM: i32 = 64;
const WORK_VOLUME: usize = (WORK_DIM * WORK_DIM * WORK_DIM) as usize;
const WINDOW_DIM: u32 = 96;
const HALO: i32 = 16;

const X_STRIDE: usize = 1;
const Y_STRIDE: usize = WORK_DIM as usize;
const Z_STRIDE: usize = (WORK_DIM * WORK_DIM) as usize;

#[inline]
fn to_index(pos: IVec3) -> usize {
    (pos.x + WORK_DIM * (pos.y + WORK_DIM * pos.z)) as usize
}

#[inline]
fn in_work_box(pos: IVec3) -> bool {
    pos.cmpge(IVec3::ZERO).all() && pos.cmplt(IVec3::splat(WORK_DIM)).all()
}

#[inline]
fn in_interior(pos: IVec3) -> bool {
    pos.cmpge(IVec3::ONE).all() && pos.cmplt(IVec3::splat(WORK_DIM - 1)).all()
}

fn set_neighbors(update: &mut [bool], occlusive: &[bool], i: usize) {
    update[i + X_STRIDE] = !occlusive[i + X_STRIDE];
    update[i - X_STRIDE] = !occlusive[i - X_STRIDE];
    update[i + Y_STRIDE] = !occlusive[i + Y_STRIDE];
    update[i - Y_STRIDE] = !occlusive[i - Y_STRIDE];
    update[i + Z_STRIDE] = !occlusive[i + Z_STRIDE];
    update[i - Z_STRIDE] = !occlusive[i - Z_STRIDE];
}

/// Intensity-weighted mean of the six neighbour colours, one step of
/// attenuation down from the brightest.
fn blend(colours: [Colour; 6]) -> Colour {
    let mut rgb = Vec3::ZERO;
    let mut brightest = 0.0f32;
    let mut total = 0.0f32;
    for colour in colours {
        rgb += colour.rgb * colour.intensity;
        brightest = brightest.max(colour.intensity);
        total += colour.intensity;
    }
    Colour {
        rgb: if total != 0.0 { rgb / total } else { Vec3::ZERO },
        intensity: if brightest != 0.0 { brightest - 1.0 } else { 0.0 },
    }
}

/// Owned working buffers for the dense convolution path. One instance
/// per simulator; the buffers are reused across shards.
pub struct IrradianceConv {
    out: Vec<Colour>,
    occlusive: Vec<bool>,
    curr: Vec<bool>,
    next: Vec<bool>,
}

impl IrradianceConv {
    pub fn new() -> Self {
        Self {
            out: vec![Colour::default(); WORK_VOLUME],
            occlusive: vec![false; WORK_VOLUME],
            curr: vec![false; WORK_VOLUME],
            next: vec![false; WORK_VOLUME],
        }
    }

    /// Recompute the irradiance of the shard at `pos` from a 96-wide
    /// window of the terrain around it, merging in the non-terrain
    /// light sources. Returns the packed 32^3 result anchored at `pos`.
    pub fn update_shard(
        &mut self,
        map: &TerrainMap,
        pos: IVec3,
        sources: &Tensor<u32>,
    ) -> WorldMap<u32> {
        assert!(is_shard_aligned(pos), "shard position must be aligned");
        let window = Aabb::cube(WINDOW_DIM as i32).shift(pos - IVec3::splat(CHUNK_DIM as i32));
        let terrain = sub_world_map(&map.terrains, window);
        let dyes = sub_world_map(&map.dyes, window);
        let growths = sub_world_map(&map.growths, window);

        let out = self.update(&terrain.tensor, &dyes.tensor, &growths.tensor, sources);
        WorldMap::new(Aabb::cube(CHUNK_DIM as i32).shift(pos), out)
    }

    /// The raw convolution: a 96^3 terrain window with its dye and
    /// growth layers, plus a 64^3 tensor of packed non-terrain light
    /// sources aligned to the working box. Returns the packed central
    /// 32^3 region.
    pub fn update(
        &mut self,
        terrain: &Tensor<TerrainId>,
        dyes: &Tensor<u8>,
        growths: &Tensor<u8>,
        sources: &Tensor<u32>,
    ) -> Tensor<u32> {
        assert_eq!(terrain.shape(), UVec3::splat(WINDOW_DIM), "bad window shape");
        assert_eq!(dyes.shape(), UVec3::splat(WINDOW_DIM), "bad window shape");
        assert_eq!(growths.shape(), UVec3::splat(WINDOW_DIM), "bad window shape");
        assert_eq!(
            sources.shape(),
            UVec3::splat(WORK_DIM as u32),
            "bad sources shape"
        );

        self.out.fill(Colour::default());
        self.occlusive.fill(false);
        self.curr.fill(false);
        self.next.fill(false);

        // Occlusive mask over the working box.
        terrain.scan_dense(|pos, id| {
            let ipos = pos.as_ivec3() - IVec3::splat(HALO);
            if in_work_box(ipos) {
                self.occlusive[to_index(ipos)] = is_occlusive(id);
            }
        });

        // Write the light sources and seed the frontier.
        terrain.scan_dense(|pos, id| {
            let ipos = pos.as_ivec3() - IVec3::splat(HALO);
            if in_work_box(ipos) {
                let index = to_index(ipos);
                let colour = emissiveness(id, dyes.get(pos), growths.get(pos));
                self.out[index] = colour;
                if in_interior(ipos) && colour.intensity > 0.0 {
                    set_neighbors(&mut self.curr, &self.occlusive, index);
                }
            }
        });

        // Merge in the non-terrain light sources.
        sources.scan_sparse(|pos, rgba| {
            let ipos = pos.as_ivec3();
            let index = to_index(ipos);
            let colour = Colour::unpack(rgba);
            self.out[index] = colour;
            if in_interior(ipos) && colour.intensity > 0.0 {
                set_neighbors(&mut self.curr, &self.occlusive, index);
            }
        });

        // Double-buffered relaxation passes, one per intensity step.
        for _ in 0..MAX_INTENSITY - 1 {
            for z in 1..WORK_DIM - 1 {
                for y in 1..WORK_DIM - 1 {
                    for x in 1..WORK_DIM - 1 {
                        let i = to_index(IVec3::new(x, y, z));
                        if !self.curr[i] {
                            continue;
                        }
                        let before = self.out[i];
                        let val = blend([
                            self.out[i - X_STRIDE],
                            self.out[i + X_STRIDE],
                            self.out[i - Y_STRIDE],
                            self.out[i + Y_STRIDE],
                            self.out[i - Z_STRIDE],
                            self.out[i + Z_STRIDE],
                        ]);
                        self.out[i] = val;
                        if val.intensity > before.intensity {
                            set_neighbors(&mut self.next, &self.occlusive, i);
                        }
                    }
                }
            }
            self.curr.fill(false);
            std::mem::swap(&mut self.curr, &mut self.next);
        }

        // Pack the central chunk.
        let out = &self.out;
        Tensor::filled(CHUNK_SHAPE, 0u32).map_dense(|pos, _| {
            out[to_index(pos.as_ivec3() + IVec3::splat(HALO))].pack()
        })
    }
}

impl Default for IrradianceConv {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot convolution update of the shard at `pos`.
pub fn update_irradiance(
    map: &TerrainMap,
    pos: IVec3,
    sources: &Tensor<u32>,
) -> WorldMap<u32> {
    IrradianceConv::new().update_shard(map, pos, sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::chunk_tensor_from_fn;
    use crate::world::terrain::TerrainMapBuilder;
    use glam::{ivec3, uvec3};

    /// An empty lower chunk under a fully emissive upper chunk.
    fn emissive_ceiling_map() -> TerrainMap {
        let mut builder = TerrainMapBuilder::new();
        builder.assign_seed_block(ivec3(0, 0, 0), &chunk_tensor_from_fn(|_| 0));
        builder.assign_seed_block(ivec3(0, 32, 0), &chunk_tensor_from_fn(|_| 64));
        builder.build()
    }

    #[test]
    fn test_flood_fill_attenuates_with_distance() {
        let map = emissive_ceiling_map();
        let mut irradiance = WorldMap::filled(map.aabb(), [0u8; 4]);

        process_irradiance_queue(&map, &mut irradiance, &[ivec3(15, 32, 15)]);

        for dy in 0..32 {
            let intensity = 15i32.saturating_sub(dy).max(0) as u8;
            let value = irradiance.get(ivec3(15, 32 - dy, 15));
            assert_eq!(
                value,
                [intensity, intensity, intensity, 0],
                "distance {dy} below the ceiling"
            );
        }
    }

    #[test]
    fn test_darken_then_relight() {
        // Two flora light sources on an empty chunk.
        let source_a = ivec3(8, 16, 16);
        let source_b = ivec3(24, 16, 16);
        let mut builder = TerrainMapBuilder::new();
        builder.assign_seed_block(ivec3(0, 0, 0), &chunk_tensor_from_fn(|_| 0));
        let mut map = builder.build();

        let flare = 16777231;
        map.update_diff(
            ivec3(0, 0, 0),
            &chunk_tensor_from_fn(|pos| {
                if pos.as_ivec3() == source_a || pos.as_ivec3() == source_b {
                    Some(flare)
                } else {
                    None
                }
            }),
        );

        let mut irradiance = WorldMap::filled(map.aabb(), [0u8; 4]);
        process_irradiance_queue(&map, &mut irradiance, &[source_a, source_b]);

        assert_eq!(irradiance.get(source_a), [15, 15, 15, 0]);
        assert_eq!(irradiance.get(ivec3(10, 16, 16)), [13, 13, 13, 0]);
        assert_eq!(irradiance.get(ivec3(16, 16, 16)), [7, 7, 7, 0]);

        // Remove source A; the dark wave must clear its halo and the
        // remaining source must re-light what it can reach.
        map.update_diff(
            ivec3(0, 0, 0),
            &chunk_tensor_from_fn(|pos| {
                if pos.as_ivec3() == source_b {
                    Some(flare)
                } else {
                    None
                }
            }),
        );
        process_irradiance_queue(&map, &mut irradiance, &[source_a]);

        // L1 distance from source B decides everything now.
        assert_eq!(irradiance.get(source_a), [0, 0, 0, 0]);
        assert_eq!(irradiance.get(ivec3(10, 16, 16)), [1, 1, 1, 0]);
        assert_eq!(irradiance.get(ivec3(16, 16, 16)), [7, 7, 7, 0]);
        assert_eq!(irradiance.get(ivec3(20, 16, 16)), [11, 11, 11, 0]);
    }

    #[test]
    fn test_occlusive_blocks_absorb() {
        // A lamp against a full stone wall: nothing crosses it.
        let mut builder = TerrainMapBuilder::new();
        builder.assign_seed_block(
            ivec3(0, 0, 0),
            &chunk_tensor_from_fn(|pos| {
                if pos.x == 12 {
                    1
                } else if pos == uvec3(11, 16, 16) {
                    64
                } else {
                    0
                }
            }),
        );
        let map = builder.build();

        let mut irradiance = WorldMap::filled(map.aabb(), [0u8; 4]);
        process_irradiance_queue(&map, &mut irradiance, &[ivec3(11, 16, 16)]);

        assert_eq!(irradiance.get(ivec3(11, 16, 16)), [15, 15, 15, 0]);
        assert_eq!(irradiance.get(ivec3(10, 16, 16)), [14, 14, 14, 0]);
        assert_eq!(irradiance.get(ivec3(12, 16, 16)), [0, 0, 0, 0]);
        assert_eq!(irradiance.get(ivec3(13, 16, 16)), [0, 0, 0, 0]);
    }

    fn window_tensor(f: impl FnMut(UVec3) -> TerrainId) -> Tensor<TerrainId> {
        Tensor::from_fn(UVec3::splat(WINDOW_DIM), f)
    }

    #[test]
    fn test_conv_single_source() {
        let terrain = window_tensor(|pos| {
            if pos == UVec3::splat(48) { 64 } else { 0 }
        });
        let zeros = Tensor::filled(UVec3::splat(WINDOW_DIM), 0u8);
        let sources = Tensor::filled(UVec3::splat(WORK_DIM as u32), 0u32);

        let mut conv = IrradianceConv::new();
        let out = conv.update(&terrain, &zeros, &zeros, &sources);

        // The source voxel itself.
        assert_eq!(out.get(uvec3(16, 16, 16)), 0xffffff0f);
        // Intensity drops by one per L1 step, colour stays white.
        assert_eq!(out.get(uvec3(17, 16, 16)), 0xffffff0e);
        assert_eq!(out.get(uvec3(16, 18, 16)), 0xffffff0d);
        assert_eq!(out.get(uvec3(21, 16, 16)), 0xffffff0a);
        // Beyond the attenuation radius everything is dark.
        assert_eq!(out.get(uvec3(16, 16, 0)), 0);
    }

    #[test]
    fn test_conv_occluder_shadows() {
        // A solid floor one step below the source.
        let terrain = window_tensor(|pos| {
            if pos == UVec3::splat(48) {
                64
            } else if pos.y == 47 {
                1
            } else {
                0
            }
        });
        let zeros = Tensor::filled(UVec3::splat(WINDOW_DIM), 0u8);
        let sources = Tensor::filled(UVec3::splat(WORK_DIM as u32), 0u32);

        let mut conv = IrradianceConv::new();
        let out = conv.update(&terrain, &zeros, &zeros, &sources);

        // Above the floor the light spreads.
        assert_eq!(out.get(uvec3(17, 16, 16)), 0xffffff0e);
        // Cells below the floor receive nothing.
        assert_eq!(out.get(uvec3(16, 14, 16)), 0);
        assert_eq!(out.get(uvec3(18, 13, 16)), 0);
    }

    #[test]
    fn test_conv_extra_sources() {
        let terrain = window_tensor(|_| 0);
        let zeros = Tensor::filled(UVec3::splat(WINDOW_DIM), 0u8);
        let sources = Tensor::from_fn(UVec3::splat(WORK_DIM as u32), |pos| {
            if pos == UVec3::splat(32) {
                Colour::new(255.0, 0.0, 0.0, 15.0).pack()
            } else {
                0
            }
        });

        let mut conv = IrradianceConv::new();
        let out = conv.update(&terrain, &zeros, &zeros, &sources);

        assert_eq!(out.get(uvec3(16, 16, 16)), 0xff00000f);
        assert_eq!(out.get(uvec3(16, 17, 16)), 0xff00000e);
    }

    #[test]
    fn test_update_shard_window() {
        // A 96^3 world with an emissive block in the centre shard.
        let mut builder = TerrainMapBuilder::new();
        for z in 0..3 {
            for y in 0..3 {
                for x in 0..3 {
                    let origin = 32 * ivec3(x, y, z);
                    builder.assign_seed_block(
                        origin,
                        &chunk_tensor_from_fn(move |pos| {
                            if origin == ivec3(32, 32, 32) && pos == UVec3::splat(16) {
                                64
                            } else {
                                0
                            }
                        }),
                    );
                }
            }
        }
        let map = builder.build();
        let sources = Tensor::filled(UVec3::splat(WORK_DIM as u32), 0u32);

        let result = update_irradiance(&map, ivec3(32, 32, 32), &sources);
        assert_eq!(
            result.aabb,
            Aabb::new(ivec3(32, 32, 32), ivec3(64, 64, 64))
        );
        assert_eq!(result.get(ivec3(48, 48, 48)), 0xffffff0f);
        assert_eq!(result.get(ivec3(50, 48, 48)), 0xffffff0d);
    }
}
