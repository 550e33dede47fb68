//! Trixel-indexed binary catalog files.
//!
//! A catalog stores fixed-size records grouped by trixel. The header describes
//! the record layout and maps every trixel to the offset and count of its
//! records, so a sky renderer can load just the trixels in view:
//!
//! | Section | Size |
//! |---------|------|
//! | free-text preamble | 124 bytes |
//! | endian marker `0x4B53` in producer byte order | 2 bytes |
//! | format version | 1 byte |
//! | field count `N` | 2 bytes |
//! | field descriptors | `N × 16` bytes |
//! | index size `M` | 4 bytes |
//! | index entries `{id, offset, record_count}` | `M × 12` bytes |
//! | records | `Σ record_count × record_size` |
//!
//! [`BinFileReader`] parses and validates the envelope; [`CatalogWriter`]
//! produces it in either byte order.

mod errors;
mod header;
mod reader;
mod writer;

pub use errors::{CatalogError, CatalogResult};
pub use header::{
    record_size, FieldDescriptor, FieldType, FieldValue, FileEndian, IndexEntry, ENDIAN_MARKER,
    FIELD_DESCRIPTOR_LEN, INDEX_ENTRY_LEN, PREAMBLE_LEN,
};
pub use reader::{unsigned_seek, BinFileReader, Records};
pub use writer::CatalogWriter;
