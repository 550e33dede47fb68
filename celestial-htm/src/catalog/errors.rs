use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Cannot open catalog {path}: {source}")]
    FileOpen { path: String, source: io::Error },

    #[error("Catalog ends prematurely while reading the {stage}")]
    PrematureEof { stage: &'static str },

    #[error("Field descriptor table truncated after {read} of {expected} fields")]
    FieldDescriptorTruncated { read: usize, expected: usize },

    #[error("Index table truncated after {read} of {expected} entries")]
    IndexTruncated { read: u32, expected: u32 },

    #[error("Index entry {position} has id {id}, beyond the table size {size}")]
    BadIndexId { position: u32, id: u32, size: u32 },

    #[error("Index entry {position} has id {id}")]
    IndexIdMismatch { position: u32, id: u32 },

    #[error("Index entry {trixel}: offsets imply {expected} records for the previous trixel, table says {found}")]
    BadIndexOffset { trixel: u32, expected: u32, found: u32 },

    #[error("Index entry {trixel}: records end at byte {end}, file has {length}")]
    RecordsPastEnd { trixel: u32, end: u64, length: u64 },

    #[error("{what} {value} does not fit the catalog's {limit}-bit field")]
    OffsetOverflow { what: &'static str, value: u64, limit: u8 },

    #[error("Catalog file is not open")]
    NotOpen,

    #[error("Catalog header has not been read")]
    HeaderNotRead,

    #[error("Trixel {trixel} out of range (index has {size} entries)")]
    TrixelOutOfRange { trixel: u64, size: u32 },

    #[error("Record truncated: expected {expected} bytes, got {actual}")]
    RecordTruncated { expected: usize, actual: usize },

    #[error("Value does not match the type of field {field:?}")]
    FieldTypeMismatch { field: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CatalogError {
    /// True for errors that describe a malformed file rather than misuse or I/O.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::PrematureEof { .. }
                | Self::FieldDescriptorTruncated { .. }
                | Self::IndexTruncated { .. }
                | Self::BadIndexId { .. }
                | Self::IndexIdMismatch { .. }
                | Self::BadIndexOffset { .. }
                | Self::RecordsPastEnd { .. }
        )
    }
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Maps an unexpected EOF to `on_eof`, passing other I/O errors through.
pub(crate) fn eof_as(err: io::Error, on_eof: impl FnOnce() -> CatalogError) -> CatalogError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        on_eof()
    } else {
        CatalogError::Io(err)
    }
}
