//! Chunked tensors over shared-ownership chunks.
//!
//! A tensor is a 3D grid of 32^3 chunks in z-major order. Chunks are
//! handed around behind `Arc`, so tensors that differ only locally share
//! storage; mutation replaces the handle rather than writing through it.

use std::sync::Arc;

use glam::{uvec3, UVec3};

use crate::tensor::array::{self, RleArray, RleArrayBuilder};
use crate::tensor::{chunk_div, decode_chunk_pos, encode_chunk_pos, CHUNK_DIM, CHUNK_VOLUME};

/// Shared reference to a chunk.
pub type ChunkHandle<T> = Arc<Chunk<T>>;

/// One 32^3 region stored as a run-length-encoded array.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Chunk<T> {
    pub array: RleArray<T>,
}

impl<T: Copy + Eq> Chunk<T> {
    pub fn new(array: RleArray<T>) -> Self {
        assert_eq!(array.len(), CHUNK_VOLUME, "chunk array must cover 32^3");
        Self { array }
    }

    /// A chunk holding a single value everywhere.
    pub fn fill(value: T) -> Self {
        Self {
            array: RleArray::fill(CHUNK_VOLUME, value),
        }
    }

    /// Value at a chunk-local position.
    pub fn get(&self, pos: UVec3) -> T {
        self.array.get(encode_chunk_pos(pos))
    }

    pub fn storage_size(&self) -> usize {
        self.array.storage_size()
    }
}

/// A 3D grid of chunk handles.
#[derive(Clone, Debug)]
pub struct Tensor<T> {
    shape: UVec3,
    chunks: Vec<ChunkHandle<T>>,
}

impl<T: Copy + Eq> Tensor<T> {
    /// A tensor holding a single value everywhere. All chunk slots share
    /// one handle until written.
    pub fn filled(shape: UVec3, value: T) -> Self {
        let grid = Self::check_shape(shape);
        let chunk = Arc::new(Chunk::fill(value));
        Self {
            shape,
            chunks: vec![chunk; (grid.x * grid.y * grid.z) as usize],
        }
    }

    /// Build position by position from a function.
    pub fn from_fn(shape: UVec3, mut f: impl FnMut(UVec3) -> T) -> Self {
        let grid = Self::check_shape(shape);
        let mut chunks = Vec::with_capacity((grid.x * grid.y * grid.z) as usize);
        for cz in 0..grid.z {
            for cy in 0..grid.y {
                for cx in 0..grid.x {
                    let origin = CHUNK_DIM * uvec3(cx, cy, cz);
                    let mut builder = RleArrayBuilder::new();
                    for i in 0..CHUNK_VOLUME {
                        builder.add(f(origin + decode_chunk_pos(i)));
                    }
                    chunks.push(Arc::new(Chunk::new(builder.build())));
                }
            }
        }
        Self { shape, chunks }
    }

    fn check_shape(shape: UVec3) -> UVec3 {
        assert!(
            shape.x > 0 && shape.y > 0 && shape.z > 0,
            "tensor shape must be positive"
        );
        assert!(
            shape % CHUNK_DIM == UVec3::ZERO,
            "tensor shape must be a multiple of the chunk dim"
        );
        chunk_div(shape)
    }

    /// Reassemble a tensor from its chunk handles in storage order.
    pub fn from_chunks(shape: UVec3, chunks: Vec<ChunkHandle<T>>) -> Self {
        let grid = Self::check_shape(shape);
        assert_eq!(
            chunks.len(),
            (grid.x * grid.y * grid.z) as usize,
            "chunk count does not match shape"
        );
        Self { shape, chunks }
    }

    pub fn shape(&self) -> UVec3 {
        self.shape
    }

    /// Shape of the chunk grid.
    pub fn grid(&self) -> UVec3 {
        chunk_div(self.shape)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Storage index of a chunk grid position.
    pub fn chunk_index(&self, cpos: UVec3) -> usize {
        let grid = self.grid();
        assert!(
            cpos.x < grid.x && cpos.y < grid.y && cpos.z < grid.z,
            "chunk position out of range"
        );
        (cpos.x + grid.x * (cpos.y + grid.y * cpos.z)) as usize
    }

    pub fn chunk(&self, cpos: UVec3) -> &ChunkHandle<T> {
        &self.chunks[self.chunk_index(cpos)]
    }

    /// Replace a chunk handle (copy-on-write at the chunk level).
    pub fn set_chunk(&mut self, cpos: UVec3, chunk: ChunkHandle<T>) {
        let index = self.chunk_index(cpos);
        self.chunks[index] = chunk;
    }

    /// Value at a tensor position.
    pub fn get(&self, pos: UVec3) -> T {
        assert!(
            pos.x < self.shape.x && pos.y < self.shape.y && pos.z < self.shape.z,
            "tensor position out of range"
        );
        self.chunk(pos / CHUNK_DIM).get(pos % CHUNK_DIM)
    }

    /// Visit every chunk in storage order with its voxel origin.
    pub fn scan_chunks(&self, mut fn_: impl FnMut(usize, UVec3, &ChunkHandle<T>)) {
        let grid = self.grid();
        let mut index = 0;
        for cz in 0..grid.z {
            for cy in 0..grid.y {
                for cx in 0..grid.x {
                    fn_(index, CHUNK_DIM * uvec3(cx, cy, cz), &self.chunks[index]);
                    index += 1;
                }
            }
        }
    }

    /// Rebuild chunk by chunk. Returning the input handle shares the
    /// chunk with this tensor.
    pub fn map_chunks<U: Copy + Eq>(
        &self,
        mut f: impl FnMut(usize, UVec3, &ChunkHandle<T>) -> ChunkHandle<U>,
    ) -> Tensor<U> {
        let mut chunks = Vec::with_capacity(self.chunks.len());
        self.scan_chunks(|index, origin, chunk| {
            chunks.push(f(index, origin, chunk));
        });
        Tensor {
            shape: self.shape,
            chunks,
        }
    }

    /// Visit every position once, in storage order.
    pub fn scan_dense(&self, mut fn_: impl FnMut(UVec3, T)) {
        self.scan_chunks(|_, origin, chunk| {
            chunk.array.scan(|run, val| {
                for i in run.pos..run.end() {
                    fn_(origin + decode_chunk_pos(i), val);
                }
            });
        });
    }

    /// Visit the positions whose run value satisfies the predicate.
    pub fn find(&self, pred: impl Fn(T) -> bool, mut fn_: impl FnMut(UVec3, T)) {
        self.scan_chunks(|_, origin, chunk| {
            chunk.array.scan(|run, val| {
                if pred(val) {
                    for i in run.pos..run.end() {
                        fn_(origin + decode_chunk_pos(i), val);
                    }
                }
            });
        });
    }

    /// Element-wise transform.
    pub fn map<U: Copy + Eq>(&self, mut f: impl FnMut(T) -> U) -> Tensor<U> {
        self.map_chunks(|_, _, chunk| Arc::new(Chunk::new(chunk.array.map(&mut f))))
    }

    /// Position-wise transform.
    pub fn map_dense<U: Copy + Eq>(&self, mut f: impl FnMut(UVec3, T) -> U) -> Tensor<U> {
        self.map_chunks(|_, origin, chunk| {
            Arc::new(Chunk::new(chunk.array.map_dense(|pos, val| {
                f(origin + decode_chunk_pos(pos), val)
            })))
        })
    }

    /// Visit every position where the two tensors disagree.
    pub fn diff(&self, other: &Tensor<T>, mut fn_: impl FnMut(UVec3, T, T)) {
        assert_eq!(self.shape, other.shape, "diff shape mismatch");
        self.scan_chunks(|index, origin, chunk| {
            let other_chunk = &other.chunks[index];
            if Arc::ptr_eq(chunk, other_chunk) {
                return;
            }
            chunk.array.diff(&other_chunk.array, |run, va, vb| {
                for i in run.pos..run.end() {
                    fn_(origin + decode_chunk_pos(i), va, vb);
                }
            });
        });
    }

    pub fn storage_size(&self) -> usize {
        self.chunks.iter().map(|c| c.storage_size()).sum()
    }
}

impl<T: Copy + Eq + Default> Tensor<T> {
    /// Visit only the positions holding a non-default value.
    pub fn scan_sparse(&self, fn_: impl FnMut(UVec3, T)) {
        self.find(|val| val != T::default(), fn_);
    }
}

/// Element-wise combination of two co-shaped tensors.
pub fn merge<A, B, O>(
    a: &Tensor<A>,
    b: &Tensor<B>,
    mut f: impl FnMut(A, B) -> O,
) -> Tensor<O>
where
    A: Copy + Eq,
    B: Copy + Eq,
    O: Copy + Eq,
{
    assert_eq!(a.shape(), b.shape(), "merge shape mismatch");
    a.map_chunks(|index, _, chunk| {
        Arc::new(Chunk::new(array::merge(
            &chunk.array,
            &b.chunks[index].array,
            &mut f,
        )))
    })
}

/// A 32^3 single-chunk tensor, the unit of shard assignment.
pub fn make_chunk_tensor<T: Copy + Eq>(value: T) -> Tensor<T> {
    Tensor::filled(UVec3::splat(CHUNK_DIM), value)
}

/// Build a single-chunk tensor position by position.
pub fn chunk_tensor_from_fn<T: Copy + Eq>(f: impl FnMut(UVec3) -> T) -> Tensor<T> {
    Tensor::from_fn(UVec3::splat(CHUNK_DIM), f)
}
