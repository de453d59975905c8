//! Maximal-region solvers over binary masks.

pub mod subbox;
pub mod subquad;

pub use subbox::Box3;
pub use subquad::Quad;
