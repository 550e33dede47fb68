use celestial_htm::catalog::{
    BinFileReader, CatalogError, CatalogWriter, FieldDescriptor, FieldType, FieldValue, FileEndian,
    FIELD_DESCRIPTOR_LEN, INDEX_ENTRY_LEN, PREAMBLE_LEN,
};
use celestial_htm::{HtMesh, HtmError, HtmResult};
use std::fs;

const TRIXELS: usize = 32;

fn fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("RA", 4, FieldType::Int32, 1_000_000),
        FieldDescriptor::new("Dec", 4, FieldType::Int32, 1_000_000),
        FieldDescriptor::new("mag", 2, FieldType::Int16, 100),
        FieldDescriptor::new("spec", 2, FieldType::CharVec, 0),
        FieldDescriptor::new("flags", 1, FieldType::UInt8, 0),
    ]
}

fn star(ra: f64, dec: f64, mag: f64, spec: &str, flags: u64) -> Vec<FieldValue> {
    vec![
        FieldValue::Int((ra * 1e6).round() as i64),
        FieldValue::Int((dec * 1e6).round() as i64),
        FieldValue::Int((mag * 100.0).round() as i64),
        FieldValue::Text(spec.to_string()),
        FieldValue::UInt(flags),
    ]
}

/// Level-1 mesh catalog with stars placed by their own positions.
fn catalog(endian: FileEndian) -> (CatalogWriter, Vec<u32>) {
    let mesh = HtMesh::new(1, 1, 1).unwrap();
    assert_eq!(mesh.size() as usize, TRIXELS);

    let mut writer = fields()
        .into_iter()
        .fold(CatalogWriter::new(endian, TRIXELS).with_preamble("synthetic star data").with_version(1), |w, f| {
            w.with_field(f)
        });
    let mut counts = vec![0u32; TRIXELS];
    let stars = [
        (101.287, -16.716, -1.46, "A1", 1),
        (95.988, -52.696, -0.74, "F0", 0),
        (219.902, -60.834, -0.27, "G2", 2),
        (213.915, 19.182, -0.05, "K1", 0),
        (279.234, 38.784, 0.03, "A0", 4),
        (79.172, 45.998, 0.08, "G5", 0),
        (78.634, -8.202, 0.13, "B8", 0),
        (114.825, 5.225, 0.34, "F5", 1),
    ];
    for &(ra, dec, mag, spec, flags) in &stars {
        let t = mesh.index(ra, dec);
        writer.push_record(t, &star(ra, dec, mag, spec, flags)).unwrap();
        counts[t as usize] += 1;
    }
    (writer, counts)
}

#[test]
fn written_catalog_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stars.dat");
    let (writer, counts) = catalog(FileEndian::native());
    let written = writer.write_file(&path).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), written);

    let mut reader = BinFileReader::open(&path).unwrap();
    reader.read_header().unwrap();
    assert!(!reader.byteswap());
    assert_eq!(reader.header_text(), "synthetic star data");
    assert_eq!(reader.field_count(), 5);
    assert_eq!(reader.record_size(), 13);
    assert_eq!(reader.index_size() as usize, TRIXELS);
    assert_eq!(reader.total_records(), 8);
    assert_eq!(
        reader.total_records(),
        (0..TRIXELS as u64).map(|t| u64::from(reader.record_count(t))).sum::<u64>()
    );
    for (t, &count) in counts.iter().enumerate() {
        assert_eq!(reader.record_count(t as u64), count);
    }

    let expected_data = PREAMBLE_LEN + 5 + 5 * FIELD_DESCRIPTOR_LEN + 4 + TRIXELS * INDEX_ENTRY_LEN;
    assert_eq!(reader.data_offset(), expected_data as u64);
}

#[test]
fn records_decode_with_field_scales() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stars.dat");
    catalog(FileEndian::native()).0.write_file(&path).unwrap();

    let mesh = HtMesh::new(1, 1, 1).unwrap();
    let vega = mesh.index(279.234, 38.784);

    let mut reader = BinFileReader::open(&path).unwrap();
    reader.read_header().unwrap();
    let records = reader.read_records(vega).unwrap();
    let decoded: Vec<Vec<FieldValue>> = records.iter().map(|r| reader.decode_record(r).unwrap()).collect();
    let row = decoded
        .iter()
        .find(|row| row[3] == FieldValue::Text("A0".into()))
        .expect("Vega is stored in its own trixel");

    let mag = reader.field("mag").unwrap();
    approx::assert_abs_diff_eq!(row[2].scaled(mag.scale).unwrap(), 0.03, epsilon = 1e-9);
    let ra = reader.field("RA").unwrap();
    approx::assert_abs_diff_eq!(row[0].scaled(ra.scale).unwrap(), 279.234, epsilon = 1e-6);
    assert_eq!(row[4], FieldValue::UInt(4));
}

#[test]
fn foreign_byte_order_is_swapped() {
    let (native, _) = catalog(FileEndian::native());
    let (foreign, _) = catalog(FileEndian::native().swapped());
    let mut native_bytes = Vec::new();
    native.write_to(&mut native_bytes).unwrap();
    let mut foreign_bytes = Vec::new();
    foreign.write_to(&mut foreign_bytes).unwrap();
    assert_ne!(native_bytes, foreign_bytes);

    let mut a = BinFileReader::from_reader(std::io::Cursor::new(native_bytes));
    let mut b = BinFileReader::from_reader(std::io::Cursor::new(foreign_bytes));
    a.read_header().unwrap();
    b.read_header().unwrap();
    assert!(!a.byteswap());
    assert!(b.byteswap());
    assert_eq!(a.index(), b.index());
    assert_eq!(a.fields(), b.fields());

    for t in 0..TRIXELS as u64 {
        let ra = a.read_records(t).unwrap();
        let rb = b.read_records(t).unwrap();
        let da: Vec<_> = ra.iter().map(|r| a.decode_record(r).unwrap()).collect();
        let db: Vec<_> = rb.iter().map(|r| b.decode_record(r).unwrap()).collect();
        assert_eq!(da, db);
    }
}

#[test]
fn swapped_index_ids_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.dat");
    let endian = FileEndian::Little;
    let mut bytes = Vec::new();
    catalog(endian).0.write_to(&mut bytes).unwrap();

    // Swap the ids of index entries 0 and 1.
    let index_start = PREAMBLE_LEN + 5 + 5 * FIELD_DESCRIPTOR_LEN + 4;
    bytes[index_start..index_start + 4].copy_from_slice(&1u32.to_le_bytes());
    let second = index_start + INDEX_ENTRY_LEN;
    bytes[second..second + 4].copy_from_slice(&0u32.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    let mut reader = BinFileReader::open(&path).unwrap();
    let err = reader.read_header().unwrap_err();
    assert!(matches!(err, CatalogError::IndexIdMismatch { position: 0, id: 1 }));
    assert!(err.is_format_error());
    assert!(!reader.is_loaded());
    assert_eq!(reader.total_records(), 0);
    assert!((0..TRIXELS as u64).all(|t| reader.record_count(t) == 0));
    assert!(matches!(reader.read_records(0), Err(CatalogError::HeaderNotRead)));
}

#[test]
fn truncated_file_is_rejected() {
    let mut bytes = Vec::new();
    catalog(FileEndian::native()).0.write_to(&mut bytes).unwrap();
    bytes.truncate(PREAMBLE_LEN + 5 + 5 * FIELD_DESCRIPTOR_LEN + 4 + 10 * INDEX_ENTRY_LEN + 6);

    let mut reader = BinFileReader::from_reader(std::io::Cursor::new(bytes));
    assert!(matches!(
        reader.read_header(),
        Err(CatalogError::IndexTruncated { read: 10, expected: 32 })
    ));
}

#[test]
fn missing_file_surfaces_as_htm_error() {
    fn open(path: &std::path::Path) -> HtmResult<()> {
        let mut reader = BinFileReader::open(path)?;
        reader.read_header()?;
        Ok(())
    }

    let dir = tempfile::tempdir().unwrap();
    let err = open(&dir.path().join("absent.dat")).unwrap_err();
    assert!(matches!(err, HtmError::Catalog(CatalogError::FileOpen { .. })));
    assert!(err.to_string().contains("absent.dat"));
}

#[test]
fn close_releases_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stars.dat");
    catalog(FileEndian::native()).0.write_file(&path).unwrap();

    let mut reader = BinFileReader::open(&path).unwrap();
    reader.read_header().unwrap();
    assert!(reader.is_open());
    reader.close();
    assert!(!reader.is_open());
    assert_eq!(reader.header_text(), "");
    assert!(matches!(reader.seek_to_trixel(0), Err(CatalogError::NotOpen)));
}
