//! Error types for mesh construction, region queries and trixel caching.
//!
//! | Variant | Raised by | Recoverable? |
//! |---------|-----------|--------------|
//! | [`InvalidLevel`](HtmError::InvalidLevel) | [`HtMesh::new`](crate::HtMesh::new) | No |
//! | [`CacheSizeTooLarge`](HtmError::CacheSizeTooLarge) | [`TrixelCache::new`](crate::TrixelCache::new), `resize` | No |
//! | [`BufferOverflow`](HtmError::BufferOverflow) | `intersect_*` queries | Yes |
//! | [`InvalidBuffer`](HtmError::InvalidBuffer) | any buffer-addressed call | No |
//! | [`InvalidTrixel`](HtmError::InvalidTrixel) | vertex / name lookups | No |
//! | [`InvalidName`](HtmError::InvalidName) | name parsing | No |
//! | [`Catalog`](HtmError::Catalog) | catalog reader | Depends |
//!
//! Buffer overflow is the only soft failure: the query still fills the buffer
//! up to its capacity, logs a warning and reports how many trixels were lost.

use crate::catalog::CatalogError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HtmError {
    #[error("Invalid mesh level {level}: {reason}")]
    InvalidLevel { level: u32, reason: &'static str },

    #[error("Cache size {cache_size} exceeds data size {data_size}")]
    CacheSizeTooLarge { cache_size: usize, data_size: usize },

    #[error("Result buffer {buffer} overflowed: dropped {dropped} of {requested} trixels")]
    BufferOverflow {
        buffer: usize,
        requested: usize,
        dropped: usize,
    },

    #[error("Buffer {buffer} out of range (mesh has {count} buffers)")]
    InvalidBuffer { buffer: usize, count: usize },

    #[error("Trixel {trixel} out of range (mesh has {size} trixels)")]
    InvalidTrixel { trixel: u64, size: u64 },

    #[error("Invalid trixel name {0:?}")]
    InvalidName(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl HtmError {
    pub fn invalid_level(level: u32, reason: &'static str) -> Self {
        Self::InvalidLevel { level, reason }
    }

    pub fn cache_size(cache_size: usize, data_size: usize) -> Self {
        Self::CacheSizeTooLarge {
            cache_size,
            data_size,
        }
    }

    /// Returns true when the caller can keep using the mesh after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::BufferOverflow { .. })
    }
}

pub type HtmResult<T> = std::result::Result<T, HtmError>;
