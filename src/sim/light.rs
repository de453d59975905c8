//! Light simulation driver.
//!
//! Owns the sky-occlusion and irradiance output maps and advances them
//! from a terrain-change subscription. Each tick re-initialises every
//! column within the sky radius of a change, relaxes the occlusion
//! queue, then floods irradiance from the changed positions. Changed
//! output shards fan out through checksummed streams.

use std::collections::{HashSet, VecDeque};

use glam::{ivec2, IVec2, IVec3, Vec3Swizzles};
use serde::{Deserialize, Serialize};

use crate::core::{Error, Lazy, Result};
use crate::math::{shard_origin, Aabb};
use crate::sim::irradiance::{process_irradiance_queue, Rgba};
use crate::sim::occlusion::{
    initialize_column, process_queue, schedule_column, MAX_OCCLUSION,
};
use crate::sim::scanner::ColumnScanner;
use crate::tensor::{chunk_div, CHUNK_DIM};
use crate::world::emissive::is_emissive;
use crate::world::map::WorldMap;
use crate::world::stream::{Stream, StreamReader};
use crate::world::terrain::TerrainMap;
use crate::world::writer::ChecksumMap;

/// Tuning knobs of the light simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LightConfig {
    /// Chance per tick of opportunistically refreshing one column from
    /// the round-robin scan, on top of the edit-driven columns.
    pub column_scan_chance: f32,
    /// Seed of the scan-choice RNG, for reproducible ticks.
    pub rng_seed: u64,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            column_scan_chance: 0.5,
            rng_seed: 0,
        }
    }
}

impl LightConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Argument(format!("bad light config: {e}")))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("light config serializes")
    }
}

/// Sky-occlusion plus irradiance simulation over one terrain map.
pub struct LightSimulation {
    config: LightConfig,
    rng: fastrand::Rng,
    subscription: StreamReader<IVec3>,
    occlusions: Lazy<WorldMap<u8>>,
    irradiance: Lazy<WorldMap<Rgba>>,
    occlusion_checksums: ChecksumMap,
    irradiance_checksums: ChecksumMap,
    occlusion_stream: Stream<IVec3>,
    irradiance_stream: Stream<IVec3>,
    column_scanner: Lazy<ColumnScanner>,
}

impl LightSimulation {
    /// Create a simulation fed by a terrain-change subscription. Call
    /// [`init`](Self::init) before the first tick.
    pub fn new(subscription: StreamReader<IVec3>, config: LightConfig) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(config.rng_seed),
            config,
            subscription,
            occlusions: Lazy::new(),
            irradiance: Lazy::new(),
            occlusion_checksums: ChecksumMap::new(),
            irradiance_checksums: ChecksumMap::new(),
            occlusion_stream: Stream::new(),
            irradiance_stream: Stream::new(),
            column_scanner: Lazy::new(),
        }
    }

    /// Shard positions whose occlusion chunk changed.
    pub fn subscribe_occlusion(&mut self) -> StreamReader<IVec3> {
        self.occlusion_stream.subscribe()
    }

    /// Shard positions whose irradiance chunk changed.
    pub fn subscribe_irradiance(&mut self) -> StreamReader<IVec3> {
        self.irradiance_stream.subscribe()
    }

    pub fn occlusions(&self) -> &WorldMap<u8> {
        self.occlusions.get()
    }

    pub fn irradiance(&self) -> &WorldMap<Rgba> {
        self.irradiance.get()
    }

    /// Allocate the output maps and flood irradiance from every
    /// emissive block in the terrain.
    pub fn init(&mut self, terrain: &TerrainMap) {
        let aabb = terrain.aabb();
        let shape = aabb.size().as_uvec3();

        log::info!("initializing sky-occlusion map with shape {shape}");
        self.occlusions.set(WorldMap::filled(aabb, 0));
        self.column_scanner
            .set(ColumnScanner::new(chunk_div(shape).xz()));

        log::info!("initializing irradiance map with shape {shape}");
        self.irradiance.set(WorldMap::filled(aabb, [0; 4]));

        let mut seeds = Vec::new();
        terrain.seeds.tensor.find(is_emissive, |pos, _| {
            seeds.push(terrain.seeds.tensor_to_world(pos));
        });
        terrain.diffs.tensor.find(
            |diff| diff.is_some_and(is_emissive),
            |pos, _| seeds.push(terrain.diffs.tensor_to_world(pos)),
        );
        log::debug!("flood-filling irradiance from {} sources", seeds.len());

        let flushed = process_irradiance_queue(terrain, self.irradiance.get_mut(), &seeds);
        for pos in flushed {
            self.signal_irradiance(pos);
        }
    }

    /// Drain the terrain changes and advance both maps to quiescence.
    pub fn tick(&mut self, terrain: &TerrainMap) {
        let changes = self.subscription.read();

        // Union of the columns whose sky light a change can reach.
        let mut columns: HashSet<IVec2> = HashSet::new();
        let step = CHUNK_DIM as i32;
        for &pos in &changes {
            let reach = sky_radius(pos).intersect(&terrain.aabb());
            if reach.is_empty() {
                continue;
            }
            let from = shard_origin(reach.min);
            let mut z = from.z;
            while z < reach.max.z {
                let mut x = from.x;
                while x < reach.max.x {
                    columns.insert(ivec2(x, z));
                    x += step;
                }
                z += step;
            }
        }

        // Opportunistically refresh the next column in the scan.
        if self.rng.f32() < self.config.column_scan_chance {
            let next = self.column_scanner.get_mut().next();
            columns.insert(terrain.aabb().min.xz() + step * next.as_ivec2());
        }

        let mut queue = VecDeque::new();
        for &column in &columns {
            let written = initialize_column(terrain, self.occlusions.get_mut(), column);
            for pos in written {
                self.signal_occlusion(pos);
            }
            queue.extend(schedule_column(terrain, self.occlusions.get(), column));
        }
        let flushed = process_queue(terrain, self.occlusions.get_mut(), &mut queue);
        for pos in flushed {
            self.signal_occlusion(pos);
        }

        // Re-derive irradiance around the changed voxels.
        let seeds: Vec<IVec3> = changes.iter().copied().collect();
        let flushed = process_irradiance_queue(terrain, self.irradiance.get_mut(), &seeds);
        for pos in flushed {
            self.signal_irradiance(pos);
        }
    }

    fn signal_occlusion(&mut self, pos: IVec3) {
        if self
            .occlusion_checksums
            .update(pos, self.occlusions.get().chunk(pos))
        {
            self.occlusion_stream.write(pos);
        }
    }

    fn signal_irradiance(&mut self, pos: IVec3) {
        if self
            .irradiance_checksums
            .update(pos, self.irradiance.get().chunk(pos))
        {
            self.irradiance_stream.write(pos);
        }
    }
}

/// The box a terrain change can influence through sky light.
fn sky_radius(change: IVec3) -> Aabb {
    let radius = IVec3::splat(MAX_OCCLUSION as i32);
    Aabb::new(change - radius, change + radius + IVec3::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::chunk_tensor_from_fn;
    use crate::world::terrain::{TerrainMapBuilder, TerrainStream, TerrainWriter};
    use glam::{ivec3, uvec3};

    fn no_scan_config() -> LightConfig {
        LightConfig {
            column_scan_chance: 0.0,
            rng_seed: 7,
        }
    }

    fn empty_column_map() -> TerrainMap {
        let mut builder = TerrainMapBuilder::new();
        builder.assign_seed_block(ivec3(0, 0, 0), &chunk_tensor_from_fn(|_| 0));
        builder.assign_seed_block(ivec3(0, 32, 0), &chunk_tensor_from_fn(|_| 0));
        builder.build()
    }

    #[test]
    fn test_init_floods_from_emissive_seeds() {
        let mut builder = TerrainMapBuilder::new();
        builder.assign_seed_block(
            ivec3(0, 0, 0),
            &chunk_tensor_from_fn(|pos| if pos == uvec3(16, 16, 16) { 64 } else { 0 }),
        );
        let map = builder.build();

        let mut stream = TerrainStream::new();
        let mut sim = LightSimulation::new(stream.subscribe(), no_scan_config());
        let mut events = sim.subscribe_irradiance();
        sim.init(&map);

        assert_eq!(sim.irradiance().get(ivec3(16, 16, 16)), [15, 15, 15, 0]);
        assert_eq!(sim.irradiance().get(ivec3(16, 20, 16)), [11, 11, 11, 0]);
        assert_eq!(events.read().as_slice(), &[ivec3(0, 0, 0)]);
    }

    #[test]
    fn test_tick_updates_shadow_and_signals() {
        let mut map = empty_column_map();
        let mut stream = TerrainStream::new();
        let mut sim = LightSimulation::new(stream.subscribe(), no_scan_config());
        sim.init(&map);
        let mut occlusion_events = sim.subscribe_occlusion();

        // Drop a block into the lower chunk.
        let mut writer = TerrainWriter::new(&mut map, &mut stream);
        writer.update_diff(
            ivec3(0, 0, 0),
            &chunk_tensor_from_fn(|pos| {
                if pos == uvec3(5, 16, 7) { Some(1) } else { None }
            }),
        );

        sim.tick(&map);

        // Shadow below the block, relaxed one step by lit neighbours.
        assert_eq!(sim.occlusions().get(ivec3(5, 16, 7)), MAX_OCCLUSION);
        assert_eq!(sim.occlusions().get(ivec3(5, 10, 7)), 1);
        assert_eq!(sim.occlusions().get(ivec3(5, 20, 7)), 0);
        assert_eq!(sim.occlusions().get(ivec3(4, 10, 7)), 0);

        let events: Vec<IVec3> = occlusion_events.read().iter().copied().collect();
        assert!(events.contains(&ivec3(0, 0, 0)));
        assert!(events.contains(&ivec3(0, 32, 0)));

        // A quiescent tick signals nothing.
        sim.tick(&map);
        assert!(occlusion_events.read().is_empty());
    }

    #[test]
    fn test_tick_consumes_change_stream() {
        let mut map = empty_column_map();
        let mut stream = TerrainStream::new();
        let mut sim = LightSimulation::new(stream.subscribe(), no_scan_config());
        sim.init(&map);

        let mut writer = TerrainWriter::new(&mut map, &mut stream);
        writer.update_diff(
            ivec3(0, 32, 0),
            &chunk_tensor_from_fn(|pos| {
                if pos == uvec3(0, 0, 0) { Some(16777231) } else { None }
            }),
        );
        sim.tick(&map);

        // The flora light landed in the irradiance map.
        assert_eq!(sim.irradiance().get(ivec3(0, 32, 0)), [15, 15, 15, 0]);
        assert_eq!(sim.irradiance().get(ivec3(0, 35, 0)), [12, 12, 12, 0]);
        // Flora does not occlude, so the column stays lit.
        assert_eq!(sim.occlusions().get(ivec3(0, 32, 0)), 0);
    }

    #[test]
    fn test_scan_column_refresh() {
        let map = empty_column_map();
        let mut stream = TerrainStream::new();
        let mut sim = LightSimulation::new(
            stream.subscribe(),
            LightConfig {
                column_scan_chance: 1.0,
                rng_seed: 1,
            },
        );
        sim.init(&map);
        let mut occlusion_events = sim.subscribe_occlusion();

        // No changes, but the scan refreshes the only column; the first
        // checksum observation of each chunk signals.
        sim.tick(&map);
        let events: Vec<IVec3> = occlusion_events.read().iter().copied().collect();
        assert!(events.contains(&ivec3(0, 0, 0)));
        assert!(events.contains(&ivec3(0, 32, 0)));

        // The second scan pass produces identical chunks: no signals.
        sim.tick(&map);
        assert!(occlusion_events.read().is_empty());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = LightConfig {
            column_scan_chance: 0.25,
            rng_seed: 42,
        };
        let restored = LightConfig::from_json(&config.to_json()).unwrap();
        assert_eq!(restored.column_scan_chance, config.column_scan_chance);
        assert_eq!(restored.rng_seed, config.rng_seed);

        assert!(LightConfig::from_json("{").is_err());
    }
}
