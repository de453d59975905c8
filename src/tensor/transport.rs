//! Tensor serialization with optional zstd compression.
//!
//! The encoding is the run representation itself: per chunk, the
//! run-end keys and the parallel value buffer. Headers are little-endian,
//! value payloads are raw `Pod` bytes.

use std::sync::Arc;

use bytemuck::Pod;
use glam::uvec3;

use crate::core::{Error, Result};
use crate::tensor::dict::DictKey;
use crate::tensor::tensor::{Chunk, ChunkHandle, Tensor};

const MAGIC: &[u8; 4] = b"VXTN";
const VERSION: u32 = 1;

/// zstd level used for [`compress`].
pub const COMPRESSION_LEVEL: i32 = 7;

/// Serialize a tensor into a standalone byte blob.
pub fn serialize_tensor<T: Pod + Copy + Eq>(tensor: &Tensor<T>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());

    let shape = tensor.shape();
    for dim in [shape.x, shape.y, shape.z] {
        out.extend_from_slice(&dim.to_le_bytes());
    }
    out.extend_from_slice(&(tensor.chunk_count() as u32).to_le_bytes());

    tensor.scan_chunks(|_, _, chunk| {
        let mut ends: Vec<DictKey> = Vec::new();
        let mut vals: Vec<T> = Vec::new();
        chunk.array.scan(|run, val| {
            ends.push((run.end() - 1) as DictKey);
            vals.push(val);
        });
        out.extend_from_slice(&(ends.len() as u32).to_le_bytes());
        out.extend_from_slice(bytemuck::cast_slice(&ends));
        out.extend_from_slice(bytemuck::cast_slice(&vals));
    });
    out
}

/// Rebuild a tensor from [`serialize_tensor`] output.
pub fn deserialize_tensor<T: Pod + Copy + Eq>(bytes: &[u8]) -> Result<Tensor<T>> {
    let mut reader = Reader { bytes, pos: 0 };

    if reader.take(4)? != MAGIC {
        return Err(Error::Codec("bad tensor magic".into()));
    }
    let version = reader.read_u32()?;
    if version != VERSION {
        return Err(Error::Codec(format!("unsupported tensor version {version}")));
    }

    let shape = uvec3(reader.read_u32()?, reader.read_u32()?, reader.read_u32()?);
    if shape.cmpeq(glam::UVec3::ZERO).any() || (shape % crate::tensor::CHUNK_DIM).cmpne(glam::UVec3::ZERO).any() {
        return Err(Error::Codec(format!("bad tensor shape {shape}")));
    }
    let chunk_count = reader.read_u32()? as usize;
    let grid = shape / crate::tensor::CHUNK_DIM;
    if chunk_count != (grid.x * grid.y * grid.z) as usize {
        return Err(Error::Codec("chunk count does not match shape".into()));
    }

    let mut chunks: Vec<ChunkHandle<T>> = Vec::with_capacity(chunk_count);
    for _ in 0..chunk_count {
        let run_count = reader.read_u32()? as usize;
        let ends: Vec<DictKey> =
            bytemuck::pod_collect_to_vec(reader.take(run_count * size_of::<DictKey>())?);
        let vals: Vec<T> =
            bytemuck::pod_collect_to_vec(reader.take(run_count * size_of::<T>())?);
        if ends.last() != Some(&((crate::tensor::CHUNK_VOLUME - 1) as DictKey))
            || ends.windows(2).any(|pair| pair[0] >= pair[1])
        {
            return Err(Error::Codec("malformed chunk run encoding".into()));
        }
        chunks.push(Arc::new(Chunk::new(crate::tensor::RleArray::from_parts(
            &ends, vals,
        ))));
    }
    if reader.pos != bytes.len() {
        return Err(Error::Codec("trailing bytes after tensor".into()));
    }
    Ok(Tensor::from_chunks(shape, chunks))
}

/// Compress a serialized blob with zstd.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(bytes, COMPRESSION_LEVEL)
        .map_err(|e| Error::Codec(format!("zstd compression failed: {e}")))
}

/// Decompress a [`compress`]ed blob.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(bytes).map_err(|e| Error::Codec(format!("zstd decompression failed: {e}")))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.bytes.len());
        let end = end.ok_or_else(|| Error::Codec("truncated tensor blob".into()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }
}
