//! Axis-aligned voxel box.
//!
//! Boxes are half-open integer ranges in world space: `min` is inclusive,
//! `max` exclusive. An empty box has `max <= min` on some axis.

use glam::IVec3;

use crate::tensor::CHUNK_DIM;

/// Axis-aligned box of voxels, `[min, max)` per axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Aabb {
    pub min: IVec3,
    pub max: IVec3,
}

impl Aabb {
    /// Create a box from min and max corners.
    pub fn new(min: IVec3, max: IVec3) -> Self {
        Self { min, max }
    }

    /// The canonical empty box. Unioning with it is the identity.
    pub fn empty() -> Self {
        Self {
            min: IVec3::splat(i32::MAX),
            max: IVec3::splat(i32::MIN),
        }
    }

    /// Cube of the given edge length with its min corner at the origin.
    pub fn cube(dim: i32) -> Self {
        Self::new(IVec3::ZERO, IVec3::splat(dim))
    }

    pub fn is_empty(&self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y || self.min.z >= self.max.z
    }

    /// Size (max - min), zero-clamped when empty.
    pub fn size(&self) -> IVec3 {
        (self.max - self.min).max(IVec3::ZERO)
    }

    pub fn volume(&self) -> u64 {
        let s = self.size();
        s.x as u64 * s.y as u64 * s.z as u64
    }

    pub fn contains(&self, pos: IVec3) -> bool {
        pos.x >= self.min.x && pos.x < self.max.x
            && pos.y >= self.min.y && pos.y < self.max.y
            && pos.z >= self.min.z && pos.z < self.max.z
    }

    /// Smallest box covering both. Empty boxes are the identity.
    pub fn union(&self, other: &Aabb) -> Aabb {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn intersect(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    /// Translate by the given offset.
    pub fn shift(&self, offset: IVec3) -> Aabb {
        Aabb {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Grow by whole chunks on each side.
    pub fn expand_chunks(&self, neg: IVec3, pos: IVec3) -> Aabb {
        let step = CHUNK_DIM as i32;
        Aabb {
            min: self.min - step * neg,
            max: self.max + step * pos,
        }
    }
}

/// Component-wise floor division, correct for negative positions.
#[inline]
pub fn floor_div(pos: IVec3, div: i32) -> IVec3 {
    pos.div_euclid(IVec3::splat(div))
}

/// Whether every component is a multiple of the chunk dimension.
#[inline]
pub fn is_shard_aligned(pos: IVec3) -> bool {
    pos.rem_euclid(IVec3::splat(CHUNK_DIM as i32)) == IVec3::ZERO
}

/// Origin of the shard containing `pos`.
#[inline]
pub fn shard_origin(pos: IVec3) -> IVec3 {
    CHUNK_DIM as i32 * floor_div(pos, CHUNK_DIM as i32)
}
