//! Core utilities: errors, logging, bit twiddling, late-init cells.

pub mod bits;
pub mod error;
pub mod lazy;
pub mod logging;

pub use error::{Error, Result};
pub use lazy::Lazy;
