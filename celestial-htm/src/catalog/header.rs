//! Fixed-layout pieces of the catalog envelope: byte order, field descriptors
//! and index entries.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian, ReadBytesExt, WriteBytesExt};

use super::errors::{CatalogError, CatalogResult};

/// Length of the free-text preamble.
pub const PREAMBLE_LEN: usize = 124;
/// Endian marker as written in the producer's byte order.
pub const ENDIAN_MARKER: u16 = 0x4B53;
/// On-disk size of one field descriptor.
pub const FIELD_DESCRIPTOR_LEN: usize = 16;
/// On-disk size of one index entry.
pub const INDEX_ENTRY_LEN: usize = 12;
/// Length of a field name, NUL padded.
pub const FIELD_NAME_LEN: usize = 10;

/// Byte order of the multi-byte values in a catalog file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileEndian {
    Little,
    Big,
}

impl FileEndian {
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::Little
        } else {
            Self::Big
        }
    }

    pub fn swapped(self) -> Self {
        match self {
            Self::Little => Self::Big,
            Self::Big => Self::Little,
        }
    }

    /// Interprets the two marker bytes. Anything but the marker in host order
    /// means the file has to be byte-swapped.
    pub fn from_marker(bytes: [u8; 2]) -> Self {
        if NativeEndian::read_u16(&bytes) == ENDIAN_MARKER {
            Self::native()
        } else {
            Self::native().swapped()
        }
    }

    pub fn is_native(self) -> bool {
        self == Self::native()
    }

    pub(crate) fn read_u16<R: Read>(self, r: &mut R) -> io::Result<u16> {
        match self {
            Self::Little => r.read_u16::<LittleEndian>(),
            Self::Big => r.read_u16::<BigEndian>(),
        }
    }

    pub(crate) fn read_u32<R: Read>(self, r: &mut R) -> io::Result<u32> {
        match self {
            Self::Little => r.read_u32::<LittleEndian>(),
            Self::Big => r.read_u32::<BigEndian>(),
        }
    }

    pub(crate) fn write_u16<W: Write>(self, w: &mut W, v: u16) -> io::Result<()> {
        match self {
            Self::Little => w.write_u16::<LittleEndian>(v),
            Self::Big => w.write_u16::<BigEndian>(v),
        }
    }

    pub(crate) fn write_u32<W: Write>(self, w: &mut W, v: u32) -> io::Result<()> {
        match self {
            Self::Little => w.write_u32::<LittleEndian>(v),
            Self::Big => w.write_u32::<BigEndian>(v),
        }
    }

    fn get_u16(self, buf: &[u8]) -> u16 {
        match self {
            Self::Little => LittleEndian::read_u16(buf),
            Self::Big => BigEndian::read_u16(buf),
        }
    }

    fn get_u32(self, buf: &[u8]) -> u32 {
        match self {
            Self::Little => LittleEndian::read_u32(buf),
            Self::Big => BigEndian::read_u32(buf),
        }
    }

    fn put_u16(self, buf: &mut [u8], v: u16) {
        match self {
            Self::Little => LittleEndian::write_u16(buf, v),
            Self::Big => BigEndian::write_u16(buf, v),
        }
    }

    fn put_u32(self, buf: &mut [u8], v: u32) {
        match self {
            Self::Little => LittleEndian::write_u32(buf, v),
            Self::Big => BigEndian::write_u32(buf, v),
        }
    }
}

/// Type tag of a field descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldType {
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    /// Fixed-length character array.
    CharVec,
    /// NUL-terminated string, bounded by the field size.
    Str,
    /// Producer-specific bit layout.
    Special,
    Unknown(u8),
}

impl FieldType {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::Char,
            1 => Self::Int8,
            2 => Self::UInt8,
            3 => Self::Int16,
            4 => Self::UInt16,
            5 => Self::Int32,
            6 => Self::UInt32,
            7 => Self::CharVec,
            8 => Self::Str,
            128 => Self::Special,
            other => Self::Unknown(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Char => 0,
            Self::Int8 => 1,
            Self::UInt8 => 2,
            Self::Int16 => 3,
            Self::UInt16 => 4,
            Self::Int32 => 5,
            Self::UInt32 => 6,
            Self::CharVec => 7,
            Self::Str => 8,
            Self::Special => 128,
            Self::Unknown(tag) => tag,
        }
    }

    /// Bytes needed by scalar types.
    pub fn width(self) -> Option<usize> {
        match self {
            Self::Char | Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 => Some(4),
            _ => None,
        }
    }
}

/// Decoded value of one field.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldValue {
    Char(char),
    Int(i64),
    UInt(u64),
    Text(String),
    Raw(Vec<u8>),
}

impl FieldValue {
    /// Numeric value divided by the field's fixed-point `scale`.
    ///
    /// A scale of 0 or 1 leaves the value unchanged.
    pub fn scaled(&self, scale: i32) -> Option<f64> {
        let raw = match self {
            Self::Int(v) => *v as f64,
            Self::UInt(v) => *v as f64,
            _ => return None,
        };
        if scale == 0 {
            Some(raw)
        } else {
            Some(raw / f64::from(scale))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDescriptor {
    pub name: String,
    pub size: i8,
    pub field_type: FieldType,
    pub scale: i32,
}

impl FieldDescriptor {
    pub fn new(name: &str, size: i8, field_type: FieldType, scale: i32) -> Self {
        Self {
            name: name.to_string(),
            size,
            field_type,
            scale,
        }
    }

    /// Field size in bytes; negative sizes count as empty.
    pub fn len(&self) -> usize {
        usize::try_from(self.size).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn from_bytes(bytes: &[u8; FIELD_DESCRIPTOR_LEN], endian: FileEndian) -> Self {
        let name_bytes = &bytes[..FIELD_NAME_LEN];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(FIELD_NAME_LEN);
        Self {
            name: String::from_utf8_lossy(&name_bytes[..end]).into_owned(),
            size: bytes[10] as i8,
            field_type: FieldType::from_tag(bytes[11]),
            scale: endian.get_u32(&bytes[12..16]) as i32,
        }
    }

    pub fn to_bytes(&self, endian: FileEndian) -> [u8; FIELD_DESCRIPTOR_LEN] {
        let mut bytes = [0u8; FIELD_DESCRIPTOR_LEN];
        let name = self.name.as_bytes();
        let n = name.len().min(FIELD_NAME_LEN);
        bytes[..n].copy_from_slice(&name[..n]);
        bytes[10] = self.size as u8;
        bytes[11] = self.field_type.tag();
        endian.put_u32(&mut bytes[12..16], self.scale as u32);
        bytes
    }

    /// Declared size, rejected when narrower than the field type.
    fn checked_len(&self) -> CatalogResult<usize> {
        match self.field_type.width() {
            Some(width) if self.len() < width => Err(CatalogError::FieldTypeMismatch {
                field: self.name.clone(),
            }),
            _ => Ok(self.len()),
        }
    }

    /// Decodes this field from the start of `bytes`, reading exactly `len()` bytes.
    pub fn decode(&self, bytes: &[u8], endian: FileEndian) -> CatalogResult<FieldValue> {
        let needed = self.checked_len()?;
        if bytes.len() < needed {
            return Err(CatalogError::RecordTruncated {
                expected: needed,
                actual: bytes.len(),
            });
        }
        let field = &bytes[..needed];

        let value = match self.field_type {
            FieldType::Char => FieldValue::Char(char::from(field[0])),
            FieldType::Int8 => FieldValue::Int(i64::from(field[0] as i8)),
            FieldType::UInt8 => FieldValue::UInt(u64::from(field[0])),
            FieldType::Int16 => FieldValue::Int(i64::from(endian.get_u16(field) as i16)),
            FieldType::UInt16 => FieldValue::UInt(u64::from(endian.get_u16(field))),
            FieldType::Int32 => FieldValue::Int(i64::from(endian.get_u32(field) as i32)),
            FieldType::UInt32 => FieldValue::UInt(u64::from(endian.get_u32(field))),
            FieldType::CharVec => FieldValue::Text(String::from_utf8_lossy(field).into_owned()),
            FieldType::Str => {
                let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
                FieldValue::Text(String::from_utf8_lossy(&field[..end]).into_owned())
            }
            FieldType::Special | FieldType::Unknown(_) => FieldValue::Raw(field.to_vec()),
        };
        Ok(value)
    }

    /// Appends `value` in this field's layout.
    pub fn encode(&self, value: &FieldValue, endian: FileEndian, out: &mut Vec<u8>) -> CatalogResult<()> {
        let mismatch = || CatalogError::FieldTypeMismatch {
            field: self.name.clone(),
        };
        let mut field = vec![0u8; self.checked_len()?];

        match (self.field_type, value) {
            (FieldType::Char, FieldValue::Char(c)) if c.is_ascii() => field[0] = *c as u8,
            (FieldType::Int8, FieldValue::Int(v)) => {
                field[0] = i8::try_from(*v).map_err(|_| mismatch())? as u8;
            }
            (FieldType::UInt8, FieldValue::UInt(v)) => {
                field[0] = u8::try_from(*v).map_err(|_| mismatch())?;
            }
            (FieldType::Int16, FieldValue::Int(v)) => {
                let v = i16::try_from(*v).map_err(|_| mismatch())?;
                endian.put_u16(&mut field, v as u16);
            }
            (FieldType::UInt16, FieldValue::UInt(v)) => {
                endian.put_u16(&mut field, u16::try_from(*v).map_err(|_| mismatch())?);
            }
            (FieldType::Int32, FieldValue::Int(v)) => {
                let v = i32::try_from(*v).map_err(|_| mismatch())?;
                endian.put_u32(&mut field, v as u32);
            }
            (FieldType::UInt32, FieldValue::UInt(v)) => {
                endian.put_u32(&mut field, u32::try_from(*v).map_err(|_| mismatch())?);
            }
            (FieldType::CharVec | FieldType::Str, FieldValue::Text(s)) => copy_truncated(&mut field, s.as_bytes()),
            (_, FieldValue::Raw(bytes)) => copy_truncated(&mut field, bytes),
            _ => return Err(mismatch()),
        }

        out.extend_from_slice(&field);
        Ok(())
    }
}

fn copy_truncated(dst: &mut [u8], src: &[u8]) {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
}

/// Bytes per record implied by a field layout.
pub fn record_size(fields: &[FieldDescriptor]) -> usize {
    fields.iter().map(FieldDescriptor::len).sum()
}

/// One row of the index table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexEntry {
    pub id: u32,
    /// Absolute file offset of the trixel's first record.
    pub offset: u32,
    pub record_count: u32,
}
