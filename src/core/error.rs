//! Error types for the voxflow crate.
//!
//! Programmer errors (shape mismatches, unaligned shard positions,
//! out-of-order dict keys) are asserted eagerly at the call site.
//! Lookups that can legitimately miss return `Option` (`maybe_get`).
//! This enum covers the conditions that are recoverable at an API
//! boundary, chiefly the transport layer.

use thiserror::Error;

/// Main error type for the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("invalid state: {0}")]
    State(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
