use celestial_htm::catalog::{BinFileReader, CatalogWriter, FieldDescriptor, FieldType, FieldValue, FileEndian};
use celestial_htm::{BufferId, HtMesh, TrixelCache};

const LEVEL: u32 = 3;

fn main() -> anyhow::Result<()> {
    let mut mesh = HtMesh::new(LEVEL, LEVEL, 1)?;

    // A synthetic star catalog: one star every 3° in RA and Dec.
    let mut writer = CatalogWriter::new(FileEndian::native(), mesh.size() as usize)
        .with_preamble("synthetic grid catalog")
        .with_field(FieldDescriptor::new("RA", 4, FieldType::Int32, 1_000_000))
        .with_field(FieldDescriptor::new("Dec", 4, FieldType::Int32, 1_000_000))
        .with_field(FieldDescriptor::new("mag", 2, FieldType::Int16, 100));
    for i in 0..120 {
        for j in 0..59 {
            let (ra, dec) = (i as f64 * 3.0, j as f64 * 3.0 - 87.0);
            let mag = ((i * 7 + j * 13) % 900) as i64;
            writer.push_record(
                mesh.index(ra, dec),
                &[
                    FieldValue::Int((ra * 1e6) as i64),
                    FieldValue::Int((dec * 1e6) as i64),
                    FieldValue::Int(mag),
                ],
            )?;
        }
    }

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("grid.dat");
    writer.write_file(&path)?;

    let mut reader = BinFileReader::open(&path)?;
    reader.read_header()?;
    println!(
        "{}: {} stars in {} trixels",
        reader.header_text(),
        reader.total_records(),
        reader.index_size()
    );

    let mut cache: TrixelCache<Vec<(f64, f64, f64)>> = TrixelCache::new(mesh.size() as usize, 48)?;
    let view = BufferId::new(0);

    // Pan a 20° field of view along the ecliptic-ish band.
    for frame in 0..8 {
        let (ra, dec) = (frame as f64 * 15.0, 10.0);
        mesh.intersect_circle(ra, dec, 20.0, view)?;

        let mut loaded = 0;
        let mut visible = 0;
        for &trixel in mesh.buffer(view)? {
            let slot = cache.get_mut(trixel as usize);
            if !slot.is_set() {
                let records = reader.read_records(trixel)?;
                let mut stars = Vec::with_capacity(records.len());
                for record in records.iter() {
                    let values = reader.decode_record(record)?;
                    let scaled: Vec<f64> = values
                        .iter()
                        .zip(reader.fields())
                        .filter_map(|(v, f)| v.scaled(f.scale))
                        .collect();
                    if let [ra, dec, mag] = scaled[..] {
                        stars.push((ra, dec, mag));
                    }
                }
                cache.get_mut(trixel as usize).set(stars);
                loaded += 1;
            }
            visible += cache[trixel as usize].data().len();
        }

        cache.prune(mesh.intersect_size(view)?);
        println!(
            "frame {frame}: view ({ra:6.1}, {dec:+5.1}) {:3} trixels, {visible:4} stars, {loaded:3} loaded, {:3} cached",
            mesh.intersect_size(view)?,
            cache.current_usage()
        );
    }

    reader.close();
    Ok(())
}
