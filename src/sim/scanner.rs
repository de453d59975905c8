//! Round-robin iteration over the columns of a chunk grid.

use glam::{uvec2, UVec2};

/// Cycles through every (x, z) chunk column of a grid, wrapping around
/// forever. The light simulation uses this to opportunistically refresh
/// columns that no edit has touched.
#[derive(Clone, Debug)]
pub struct ColumnScanner {
    shape: UVec2,
    next: UVec2,
}

impl ColumnScanner {
    pub fn new(shape: UVec2) -> Self {
        assert!(shape.x > 0 && shape.y > 0, "scanner grid must be non-empty");
        Self {
            shape,
            next: UVec2::ZERO,
        }
    }

    /// The next column index, advancing the cursor.
    pub fn next(&mut self) -> UVec2 {
        let current = self.next;
        self.next.x += 1;
        if self.next.x == self.shape.x {
            self.next = uvec2(0, self.next.y + 1);
            if self.next.y == self.shape.y {
                self.next = UVec2::ZERO;
            }
        }
        current
    }
}
