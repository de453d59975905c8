//! World-anchored storage: maps, terrain layers, edit and change plumbing.

pub mod emissive;
pub mod map;
pub mod stream;
pub mod surfaces;
pub mod terrain;
pub mod writer;

pub use map::{sub_world_map, WorldMap, WorldMapBuilder};
pub use stream::{Stream, StreamReader};
pub use terrain::{TerrainId, TerrainMap, TerrainMapBuilder, TerrainWriter};
pub use writer::{ChecksumMap, ShardWriter};
