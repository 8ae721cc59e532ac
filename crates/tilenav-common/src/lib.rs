//! Common utilities shared by the tilenav core and driver crates

mod geometry;
mod vector;

pub use geometry::*;
pub use vector::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid navigation data: {0}")]
    InvalidData(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tilenav operations
pub type Result<T> = std::result::Result<T, Error>;
