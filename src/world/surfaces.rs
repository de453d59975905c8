//! Surface voxel queries.

use glam::{IVec3, UVec3};

use crate::tensor::Tensor;
use crate::world::terrain::TerrainId;

/// A terrain voxel exposed to the air above it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfacePoint {
    pub position: IVec3,
    pub terrain_id: TerrainId,
}

/// All non-empty voxels whose `+y` neighbour inside the tensor is
/// empty. The top row has no neighbour and is never reported.
pub fn find_surfaces(terrain: &Tensor<TerrainId>) -> Vec<SurfacePoint> {
    let shape = terrain.shape();
    let mut surface_points = Vec::new();
    terrain.scan_sparse(|pos, val| {
        if pos.y + 1 < shape.y && terrain.get(pos + UVec3::Y) == 0 {
            surface_points.push(SurfacePoint {
                position: pos.as_ivec3(),
                terrain_id: val,
            });
        }
    });
    surface_points
}
