use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, warn};

use super::errors::{eof_as, CatalogError, CatalogResult};
use super::header::{
    record_size, FieldDescriptor, FieldValue, FileEndian, IndexEntry, FIELD_DESCRIPTOR_LEN, PREAMBLE_LEN,
};
use crate::mesh::Trixel;

/// Everything `read_header` learns; present only after a complete parse.
#[derive(Debug, Clone)]
struct ParsedHeader {
    preamble: String,
    endian: FileEndian,
    version: u8,
    fields: Vec<FieldDescriptor>,
    record_size: usize,
    index_table_offset: u64,
    index: Vec<IndexEntry>,
    data_offset: u64,
    record_count: u64,
}

/// Reader for the trixel-indexed binary catalog envelope.
///
/// ```text
/// [124B preamble][2B endian marker][1B version][2B field count N]
/// [N x 16B field descriptor][4B index size M][M x 12B index entry][records]
/// ```
///
/// [`read_header`](Self::read_header) parses everything up to the records and
/// validates the index table as it goes. A parse either succeeds completely or
/// leaves the reader in the "not loaded" state; metadata accessors return
/// zero or empty values until a parse succeeds.
pub struct BinFileReader<R> {
    source: Option<R>,
    preset_record_size: Option<usize>,
    header: Option<ParsedHeader>,
}

impl BinFileReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> CatalogResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CatalogError::FileOpen {
            path: path.display().to_string(),
            source,
        })?;
        debug!("opened catalog {}", path.display());
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: Read + Seek> BinFileReader<R> {
    pub fn from_reader(source: R) -> Self {
        Self {
            source: Some(source),
            preset_record_size: None,
            header: None,
        }
    }

    /// Overrides the record size normally inferred from the field table.
    pub fn set_record_size(&mut self, size: usize) {
        self.preset_record_size = Some(size);
    }

    /// Parses preamble, field table and index table from the start of the file.
    pub fn read_header(&mut self) -> CatalogResult<()> {
        self.header = None;
        let preset = self.preset_record_size;
        let source = self.source.as_mut().ok_or(CatalogError::NotOpen)?;

        match parse_header(source, preset) {
            Ok(header) => {
                debug!(
                    "catalog header: version {}, {} fields, {} trixels, {} records, {:?} endian",
                    header.version,
                    header.fields.len(),
                    header.index.len(),
                    header.record_count,
                    header.endian
                );
                self.header = Some(header);
                Ok(())
            }
            Err(err) => {
                warn!("rejected catalog header: {err}");
                Err(err)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// True once a header parse has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.header.is_some()
    }

    /// Drops the file handle and all parsed state.
    pub fn close(&mut self) {
        self.source = None;
        self.header = None;
    }

    pub fn header_text(&self) -> &str {
        self.header.as_ref().map_or("", |h| h.preamble.as_str())
    }

    pub fn byteswap(&self) -> bool {
        self.header.as_ref().is_some_and(|h| !h.endian.is_native())
    }

    pub fn endian(&self) -> Option<FileEndian> {
        self.header.as_ref().map(|h| h.endian)
    }

    pub fn version(&self) -> u8 {
        self.header.as_ref().map_or(0, |h| h.version)
    }

    pub fn field_count(&self) -> usize {
        self.header.as_ref().map_or(0, |h| h.fields.len())
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        self.header.as_ref().map(|h| h.fields.as_slice()).unwrap_or(&[])
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Bytes per record: the preset size, else the parsed one, else 0.
    pub fn record_size(&self) -> usize {
        match (&self.header, self.preset_record_size) {
            (Some(h), _) => h.record_size,
            (None, Some(size)) => size,
            (None, None) => 0,
        }
    }

    pub fn index_size(&self) -> u32 {
        self.header.as_ref().map_or(0, |h| h.index.len() as u32)
    }

    pub fn index(&self) -> &[IndexEntry] {
        self.header.as_ref().map(|h| h.index.as_slice()).unwrap_or(&[])
    }

    pub fn offset(&self, trixel: Trixel) -> u64 {
        self.entry(trixel).map_or(0, |e| u64::from(e.offset))
    }

    pub fn record_count(&self, trixel: Trixel) -> u32 {
        self.entry(trixel).map_or(0, |e| e.record_count)
    }

    /// Sum of the per-trixel record counts.
    pub fn total_records(&self) -> u64 {
        self.header.as_ref().map_or(0, |h| h.record_count)
    }

    pub fn index_table_offset(&self) -> u64 {
        self.header.as_ref().map_or(0, |h| h.index_table_offset)
    }

    pub fn data_offset(&self) -> u64 {
        self.header.as_ref().map_or(0, |h| h.data_offset)
    }

    fn entry(&self, trixel: Trixel) -> Option<&IndexEntry> {
        let index = usize::try_from(trixel).ok()?;
        self.header.as_ref()?.index.get(index)
    }

    fn loaded_entry(&self, trixel: Trixel) -> CatalogResult<IndexEntry> {
        if self.source.is_none() {
            return Err(CatalogError::NotOpen);
        }
        let header = self.header.as_ref().ok_or(CatalogError::HeaderNotRead)?;
        self.entry(trixel).copied().ok_or(CatalogError::TrixelOutOfRange {
            trixel,
            size: header.index.len() as u32,
        })
    }

    /// Positions the file at the first record of `trixel`.
    pub fn seek_to_trixel(&mut self, trixel: Trixel) -> CatalogResult<u64> {
        let entry = self.loaded_entry(trixel)?;
        let source = self.source.as_mut().ok_or(CatalogError::NotOpen)?;
        Ok(unsigned_seek(source, entry.offset)?)
    }

    /// Reads the raw records stored under `trixel`.
    pub fn read_records(&mut self, trixel: Trixel) -> CatalogResult<Records> {
        let entry = self.loaded_entry(trixel)?;
        let record_size = self.record_size();
        let source = self.source.as_mut().ok_or(CatalogError::NotOpen)?;
        unsigned_seek(source, entry.offset)?;

        let len = u64::from(entry.record_count) * record_size as u64;
        let data = read_at_most(source, len)?;
        Ok(Records { data, record_size })
    }

    /// Decodes every field of one record.
    pub fn decode_record(&self, record: &[u8]) -> CatalogResult<Vec<FieldValue>> {
        let header = self.header.as_ref().ok_or(CatalogError::HeaderNotRead)?;
        let mut values = Vec::with_capacity(header.fields.len());
        let mut at = 0;
        for field in &header.fields {
            let rest = record.get(at..).unwrap_or(&[]);
            values.push(field.decode(rest, header.endian)?);
            at += field.len();
        }
        Ok(values)
    }
}

/// Records of one trixel, `record_size` bytes each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Records {
    data: Vec<u8>,
    record_size: usize,
}

impl Records {
    pub fn len(&self) -> usize {
        if self.record_size == 0 {
            0
        } else {
            self.data.len() / self.record_size
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn iter(&self) -> std::slice::ChunksExact<'_, u8> {
        self.data.chunks_exact(self.record_size.max(1))
    }
}

/// Reads exactly `len` bytes, growing the buffer only as data arrives.
fn read_at_most<R: Read>(source: &mut R, len: u64) -> CatalogResult<Vec<u8>> {
    let mut data = Vec::new();
    source.by_ref().take(len).read_to_end(&mut data)?;
    if (data.len() as u64) < len {
        return Err(CatalogError::PrematureEof { stage: "records" });
    }
    Ok(data)
}

/// Seeks to an unsigned 32-bit file offset.
///
/// Targets past `i32::MAX` are reached in two steps: to `i32::MAX`, then
/// relative by the remainder.
pub fn unsigned_seek<S: Seek>(stream: &mut S, offset: u32) -> std::io::Result<u64> {
    let signed_max = i32::MAX as u32;
    if offset > signed_max {
        stream.seek(SeekFrom::Start(u64::from(signed_max)))?;
        stream.seek(SeekFrom::Current(i64::from(offset - signed_max)))
    } else {
        stream.seek(SeekFrom::Start(u64::from(offset)))
    }
}

fn parse_header<R: Read + Seek>(source: &mut R, preset_record_size: Option<usize>) -> CatalogResult<ParsedHeader> {
    source.seek(SeekFrom::Start(0))?;

    let mut preamble = [0u8; PREAMBLE_LEN];
    source
        .read_exact(&mut preamble)
        .map_err(|e| eof_as(e, || CatalogError::PrematureEof { stage: "preamble" }))?;
    let end = preamble.iter().position(|&b| b == 0).unwrap_or(PREAMBLE_LEN);
    let preamble = String::from_utf8_lossy(&preamble[..end]).trim_end().to_string();

    let mut marker = [0u8; 2];
    source
        .read_exact(&mut marker)
        .map_err(|e| eof_as(e, || CatalogError::PrematureEof { stage: "endian marker" }))?;
    let endian = FileEndian::from_marker(marker);

    let mut version = [0u8; 1];
    source
        .read_exact(&mut version)
        .map_err(|e| eof_as(e, || CatalogError::PrematureEof { stage: "version" }))?;
    let version = version[0];

    let field_count = endian
        .read_u16(source)
        .map_err(|e| eof_as(e, || CatalogError::PrematureEof { stage: "field count" }))?;
    let field_count = usize::from(field_count);

    let mut fields = Vec::with_capacity(field_count);
    for read in 0..field_count {
        let mut bytes = [0u8; FIELD_DESCRIPTOR_LEN];
        source.read_exact(&mut bytes).map_err(|e| {
            eof_as(e, || CatalogError::FieldDescriptorTruncated {
                read,
                expected: field_count,
            })
        })?;
        fields.push(FieldDescriptor::from_bytes(&bytes, endian));
    }
    let record_size = preset_record_size.unwrap_or_else(|| record_size(&fields));

    let index_size = endian.read_u32(source).map_err(|e| {
        eof_as(e, || CatalogError::IndexTruncated {
            read: 0,
            expected: 0,
        })
    })?;
    let index_table_offset = source.stream_position()?;

    let index = read_index(source, endian, index_size, record_size)?;
    let data_offset = source.stream_position()?;
    let length = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(data_offset))?;
    check_extents(&index, record_size, length)?;
    let record_count = index.iter().map(|e| u64::from(e.record_count)).sum();

    Ok(ParsedHeader {
        preamble,
        endian,
        version,
        fields,
        record_size,
        index_table_offset,
        index,
        data_offset,
        record_count,
    })
}

/// Every non-empty trixel's records must lie inside the file.
fn check_extents(index: &[IndexEntry], record_size: usize, length: u64) -> CatalogResult<()> {
    for entry in index.iter().filter(|e| e.record_count > 0) {
        let end = u64::from(entry.offset) + u64::from(entry.record_count) * record_size as u64;
        if end > length {
            return Err(CatalogError::RecordsPastEnd {
                trixel: entry.id,
                end,
                length,
            });
        }
    }
    Ok(())
}

fn read_index<R: Read>(
    source: &mut R,
    endian: FileEndian,
    size: u32,
    record_size: usize,
) -> CatalogResult<Vec<IndexEntry>> {
    let mut index = Vec::with_capacity(size.min(1 << 20) as usize);
    let mut prev: Option<IndexEntry> = None;

    for position in 0..size {
        let truncated = || CatalogError::IndexTruncated {
            read: position,
            expected: size,
        };
        let id = endian.read_u32(source).map_err(|e| eof_as(e, truncated))?;
        let offset = endian.read_u32(source).map_err(|e| eof_as(e, truncated))?;
        let record_count = endian.read_u32(source).map_err(|e| eof_as(e, truncated))?;

        if id >= size {
            return Err(CatalogError::BadIndexId { position, id, size });
        }
        if id != position {
            return Err(CatalogError::IndexIdMismatch { position, id });
        }
        if let Some(p) = prev.filter(|p| p.offset != 0 && record_size != 0) {
            let implied = offset
                .checked_sub(p.offset)
                .map(|bytes| bytes as usize / record_size);
            if implied != Some(p.record_count as usize) {
                return Err(CatalogError::BadIndexOffset {
                    trixel: id,
                    expected: implied.map_or(0, |n| n as u32),
                    found: p.record_count,
                });
            }
        }

        let entry = IndexEntry {
            id,
            offset,
            record_count,
        };
        index.push(entry);
        prev = Some(entry);
    }
    Ok(index)
}
