//! Maximal all-true box in a 3D mask.
//!
//! The exact solver intersects every layer range and asks the 2D
//! solver for the best rectangle of the intersection; the approximate
//! variant only merges each layer's own best rectangle.

use glam::{uvec3, UVec2, UVec3};

use crate::mask::subquad::{self, Quad};

/// A half-open box `[v0, v1)` in mask coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Box3 {
    pub v0: UVec3,
    pub v1: UVec3,
}

impl Box3 {
    pub fn volume(&self) -> u32 {
        let size = self.v1 - self.v0.min(self.v1);
        size.x * size.y * size.z
    }
}

/// Largest all-true box in a layer-major mask of the given shape.
pub fn solve(mask: &[bool], shape: UVec3) -> Box3 {
    let (w, h, d) = (shape.x, shape.y, shape.z);
    let layer_size = (w * h) as usize;
    assert_eq!(mask.len(), layer_size * d as usize, "mask does not match shape");

    let mut ret = Box3::default();
    let mut layer = vec![true; layer_size];
    for i in 0..d {
        layer.fill(true);
        for j in i..d {
            // Intersect the layers from i to j.
            for k in 0..layer_size {
                layer[k] = layer[k] && mask[layer_size * j as usize + k];
            }

            let Quad { v0, v1 } = subquad::solve(&layer, UVec2::new(w, h));
            let area = (v1.x - v0.x) * (v1.y - v0.y);
            if area == 0 {
                break; // All deeper intersections are empty too.
            }
            let best = ret.volume();
            if (j - i + 1) * area > best {
                ret = Box3 {
                    v0: uvec3(v0.x, v0.y, i),
                    v1: uvec3(v1.x, v1.y, j + 1),
                };
            } else if (d - i) * area <= best {
                break; // This start layer can never win.
            }
        }
    }

    ret
}

/// Cheaper variant that merges per-layer best rectangles instead of
/// solving every intersection.
pub fn solve_approx(mask: &[bool], shape: UVec3) -> Box3 {
    let (w, h, d) = (shape.x, shape.y, shape.z);
    let layer_size = (w * h) as usize;
    assert_eq!(mask.len(), layer_size * d as usize, "mask does not match shape");

    let mut layers = Vec::with_capacity(d as usize);
    let mut layer_mask = vec![false; layer_size];
    for i in 0..d as usize {
        layer_mask.copy_from_slice(&mask[i * layer_size..(i + 1) * layer_size]);
        layers.push(subquad::solve(&layer_mask, UVec2::new(w, h)));
    }

    let mut ret = Box3::default();
    for i in 0..d {
        let mut v0 = layers[i as usize].v0;
        let mut v1 = layers[i as usize].v1;
        for j in i..d {
            v0 = v0.max(layers[j as usize].v0);
            v1 = v1.min(layers[j as usize].v1);
            let size = v1 - v0.min(v1);
            let area = size.x * size.y;
            if area == 0 {
                break;
            }
            let best = ret.volume();
            if (j - i + 1) * area > best {
                ret = Box3 {
                    v0: uvec3(v0.x, v0.y, i),
                    v1: uvec3(v1.x, v1.y, j + 1),
                };
            } else if (d - i) * area <= best {
                break;
            }
        }
    }

    ret
}
