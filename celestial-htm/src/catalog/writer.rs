use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;

use super::errors::{CatalogError, CatalogResult};
use super::header::{
    record_size, FieldDescriptor, FieldValue, FileEndian, IndexEntry, ENDIAN_MARKER, FIELD_DESCRIPTOR_LEN, INDEX_ENTRY_LEN,
    PREAMBLE_LEN,
};
use crate::mesh::Trixel;

/// Builds a catalog file in memory, then writes the envelope in one go.
///
/// Records are grouped by trixel; offsets and counts in the index table are
/// derived from the grouping, so the written file always satisfies the
/// reader's index checks.
#[derive(Debug, Clone)]
pub struct CatalogWriter {
    endian: FileEndian,
    preamble: String,
    version: u8,
    fields: Vec<FieldDescriptor>,
    trixels: Vec<Vec<u8>>,
    counts: Vec<u32>,
}

impl CatalogWriter {
    /// A writer for `trixels` index entries in `endian` byte order.
    pub fn new(endian: FileEndian, trixels: usize) -> Self {
        Self {
            endian,
            preamble: String::new(),
            version: 1,
            fields: Vec::new(),
            trixels: vec![Vec::new(); trixels],
            counts: vec![0; trixels],
        }
    }

    pub fn with_preamble(mut self, text: &str) -> Self {
        self.preamble = text.to_string();
        self
    }

    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn record_size(&self) -> usize {
        record_size(&self.fields)
    }

    /// Appends one record, given field by field, under `trixel`.
    pub fn push_record(&mut self, trixel: Trixel, values: &[FieldValue]) -> CatalogResult<()> {
        let size = u32::try_from(self.trixels.len()).unwrap_or(u32::MAX);
        let slot = usize::try_from(trixel)
            .ok()
            .filter(|&t| t < self.trixels.len())
            .ok_or(CatalogError::TrixelOutOfRange { trixel, size })?;
        if values.len() != self.fields.len() {
            return Err(CatalogError::RecordTruncated {
                expected: self.fields.len(),
                actual: values.len(),
            });
        }

        let mut record = Vec::with_capacity(self.record_size());
        for (field, value) in self.fields.iter().zip(values) {
            field.encode(value, self.endian, &mut record)?;
        }
        self.push_raw(slot, &record)
    }

    /// Appends an already encoded record under trixel index `slot`.
    fn push_raw(&mut self, slot: usize, record: &[u8]) -> CatalogResult<()> {
        let expected = self.record_size();
        if record.len() != expected {
            return Err(CatalogError::RecordTruncated {
                expected,
                actual: record.len(),
            });
        }
        let count = self.counts[slot].checked_add(1).ok_or(CatalogError::OffsetOverflow {
            what: "record count",
            value: u64::from(u32::MAX) + 1,
            limit: 32,
        })?;
        self.trixels[slot].extend_from_slice(record);
        self.counts[slot] = count;
        Ok(())
    }

    fn header_len(&self) -> u64 {
        let fixed = PREAMBLE_LEN + 2 + 1 + 2 + 4;
        (fixed + self.fields.len() * FIELD_DESCRIPTOR_LEN + self.trixels.len() * INDEX_ENTRY_LEN) as u64
    }

    /// Index table for records laid out from `data_start` on.
    fn index_entries(&self, data_start: u64) -> CatalogResult<Vec<IndexEntry>> {
        let mut entries = Vec::with_capacity(self.trixels.len());
        let mut offset = data_start;
        for (id, (data, &record_count)) in self.trixels.iter().zip(&self.counts).enumerate() {
            entries.push(IndexEntry {
                id: fit_u32("trixel id", id as u64)?,
                offset: fit_u32("record offset", offset)?,
                record_count,
            });
            offset += data.len() as u64;
        }
        Ok(entries)
    }

    /// Writes the whole file, returning the number of bytes written.
    pub fn write_to<W: Write>(&self, w: &mut W) -> CatalogResult<u64> {
        let mut preamble = [0u8; PREAMBLE_LEN];
        let text = self.preamble.as_bytes();
        let n = text.len().min(PREAMBLE_LEN);
        preamble[..n].copy_from_slice(&text[..n]);

        let field_count = u16::try_from(self.fields.len()).map_err(|_| CatalogError::OffsetOverflow {
            what: "field count",
            value: self.fields.len() as u64,
            limit: 16,
        })?;
        let index_size = fit_u32("index size", self.trixels.len() as u64)?;
        let entries = self.index_entries(self.header_len())?;

        w.write_all(&preamble)?;
        self.endian.write_u16(w, ENDIAN_MARKER)?;
        w.write_all(&[self.version])?;
        self.endian.write_u16(w, field_count)?;
        for field in &self.fields {
            w.write_all(&field.to_bytes(self.endian))?;
        }

        self.endian.write_u32(w, index_size)?;
        for entry in &entries {
            self.endian.write_u32(w, entry.id)?;
            self.endian.write_u32(w, entry.offset)?;
            self.endian.write_u32(w, entry.record_count)?;
        }

        let mut written = self.header_len();
        for data in &self.trixels {
            w.write_all(data)?;
            written += data.len() as u64;
        }
        Ok(written)
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> CatalogResult<u64> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| CatalogError::FileOpen {
            path: path.display().to_string(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        let written = self.write_to(&mut writer)?;
        writer.flush()?;
        debug!("wrote catalog {} ({} bytes)", path.display(), written);
        Ok(written)
    }
}

fn fit_u32(what: &'static str, value: u64) -> CatalogResult<u32> {
    u32::try_from(value).map_err(|_| CatalogError::OffsetOverflow { what, value, limit: 32 })
}
