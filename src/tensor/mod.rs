//! Run-length-encoded tensor storage.
//!
//! A tensor partitions a 3D grid into 32x32x32 chunks. Each chunk holds
//! its voxels as runs over a succinct rank/select dictionary, so lookups
//! cost a handful of popcounts and memory stays proportional to the run
//! count.

pub mod array;
pub mod buffer;
pub mod dict;
pub mod tensor;
pub mod transport;

pub use array::{ArrayPos, RangesBuilder, RleArray, RleArrayBuilder, Run};
pub use buffer::{Buffer, BufferBuilder};
pub use dict::{make_dict, DictKey, RankDict, RankDictScanner};
pub use tensor::{chunk_tensor_from_fn, make_chunk_tensor, Chunk, ChunkHandle, Tensor};

use glam::{uvec3, UVec3};

/// Chunk edge length in voxels.
pub const CHUNK_DIM: u32 = 32;

/// Chunk shape, one chunk per 32^3 voxels.
pub const CHUNK_SHAPE: UVec3 = UVec3::splat(CHUNK_DIM);

/// Number of voxels in a chunk.
pub const CHUNK_VOLUME: u32 = CHUNK_DIM * CHUNK_DIM * CHUNK_DIM;

/// Encode a chunk-local position as an array index.
///
/// The layout is y-major with x innermost: `x | z << 5 | y << 10`, so
/// runs break on x faces. Reversing a whole chunk array mirrors all
/// three axes (index `i` maps to `N - 1 - i`). The sky-occlusion column
/// scan exploits the y part of that mirroring to walk top-down; the x/z
/// mirroring is harmless there because the same bijection is applied on
/// both the forward and the write-back reversal within one column, so
/// per-(x, z) state stays consistent.
#[inline]
pub fn encode_chunk_pos(pos: UVec3) -> u32 {
    debug_assert!(pos.x < CHUNK_DIM && pos.y < CHUNK_DIM && pos.z < CHUNK_DIM);
    pos.x | (pos.z << 5) | (pos.y << 10)
}

/// Decode an array index back into a chunk-local position.
#[inline]
pub fn decode_chunk_pos(index: u32) -> UVec3 {
    debug_assert!(index < CHUNK_VOLUME);
    uvec3(index & 31, index >> 10, (index >> 5) & 31)
}

/// Shape of the chunk grid covering a voxel shape.
#[inline]
pub fn chunk_div(shape: UVec3) -> UVec3 {
    debug_assert!(shape % CHUNK_DIM == UVec3::ZERO);
    shape / CHUNK_DIM
}
