//! Integer math for voxel-aligned geometry.

pub mod aabb;

pub use aabb::{floor_div, is_shard_aligned, shard_origin, Aabb};
