//! Voxflow - run-length-encoded voxel world storage with flood-fill
//! light and water simulation.
//!
//! The storage side is a chunked tensor whose 32x32x32 chunks are
//! run-length encoded over a succinct rank/select dictionary, giving
//! constant-time sparse lookups. The simulation side runs sky-occlusion,
//! coloured irradiance and water relaxation on top of that storage,
//! keeping work proportional to the set of changed voxels.

pub mod core;
pub mod mask;
pub mod math;
pub mod sim;
pub mod tensor;
pub mod world;
