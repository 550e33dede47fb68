use anyhow::Context;
use celestial_htm::catalog::{BinFileReader, FieldValue};
use celestial_htm::{BufferId, HtMesh, MeshConfig, Trixel};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Parser)]
#[command(name = "htm")]
#[command(about = "Hierarchical Triangular Mesh lookups and catalog inspection")]
struct Cli {
    /// Mesh level (8·4^level trixels)
    #[arg(long, default_value = "5")]
    level: u32,

    /// Depth of the stored quad-tree
    #[arg(long, default_value = "3")]
    build_level: u32,

    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trixel containing a position
    Index {
        /// Right ascension in degrees
        ra: f64,
        /// Declination in degrees
        #[arg(allow_hyphen_values = true)]
        dec: f64,
    },
    /// Trixels overlapping a circle
    Circle {
        /// Right ascension in degrees
        ra: f64,
        /// Declination in degrees
        #[arg(allow_hyphen_values = true)]
        dec: f64,
        /// Radius in degrees
        #[arg(long, default_value = "1.0")]
        radius: f64,
    },
    /// Corner positions of a trixel
    Vertices { trixel: Trixel },
    /// Convert between trixel ids and HTM names (e.g. N3120)
    Name { value: String },
    /// Print a catalog's header, fields and index summary
    Inspect { catalog: PathBuf },
    /// Decode the records stored under one trixel
    Records {
        catalog: PathBuf,
        trixel: Trixel,
        /// Maximum number of records to print
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = MeshConfig::new(cli.level, cli.build_level, 1);

    match cli.command {
        Commands::Index { ra, dec } => {
            let mesh = HtMesh::from_config(&config)?;
            let trixel = mesh.index(ra, dec);
            let name = mesh.trixel_name(trixel)?;
            match cli.format {
                OutputFormat::Table => println!("{trixel} {name}"),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({ "trixel": trixel, "name": name }))?
                ),
                OutputFormat::Csv => println!("trixel,name\n{trixel},{name}"),
            }
        }
        Commands::Circle { ra, dec, radius } => {
            let mut mesh = HtMesh::from_config(&config)?;
            let buf = BufferId::new(0);
            mesh.intersect_circle(ra, dec, radius, buf)?;
            let trixels = mesh.buffer(buf)?.as_slice();
            match cli.format {
                OutputFormat::Table => {
                    for chunk in trixels.chunks(10) {
                        let line: Vec<String> = chunk.iter().map(|t| format!("{t:>8}")).collect();
                        println!("{}", line.join(""));
                    }
                    println!("\nTotal trixels: {}", trixels.len());
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(trixels)?),
                OutputFormat::Csv => {
                    println!("trixel");
                    for t in trixels {
                        println!("{t}");
                    }
                }
            }
        }
        Commands::Vertices { trixel } => {
            let mesh = HtMesh::from_config(&config)?;
            let corners = mesh.vertices(trixel)?;
            match cli.format {
                OutputFormat::Table => {
                    for (i, (ra, dec)) in corners.iter().enumerate() {
                        println!("v{i}: RA={ra:.6}° Dec={dec:+.6}°");
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&corners)?),
                OutputFormat::Csv => {
                    println!("ra_deg,dec_deg");
                    for (ra, dec) in corners {
                        println!("{ra},{dec}");
                    }
                }
            }
        }
        Commands::Name { value } => {
            let mesh = HtMesh::from_config(&config)?;
            match value.parse::<Trixel>() {
                Ok(trixel) => println!("{}", mesh.trixel_name(trixel)?),
                Err(_) => println!("{}", mesh.trixel_by_name(&value)?),
            }
        }
        Commands::Inspect { catalog } => {
            let reader = open_catalog(&catalog)?;
            match cli.format {
                OutputFormat::Table => print_inspect_table(&reader),
                OutputFormat::Json => print_inspect_json(&reader)?,
                OutputFormat::Csv => print_inspect_csv(&reader),
            }
        }
        Commands::Records {
            catalog,
            trixel,
            limit,
        } => {
            let mut reader = open_catalog(&catalog)?;
            let records = reader
                .read_records(trixel)
                .with_context(|| format!("Cannot read records of trixel {trixel}"))?;
            let rows = records
                .iter()
                .take(limit.unwrap_or(usize::MAX))
                .map(|r| reader.decode_record(r))
                .collect::<Result<Vec<_>, _>>()?;
            let names: Vec<&str> = reader.fields().iter().map(|f| f.name.as_str()).collect();

            match cli.format {
                OutputFormat::Table | OutputFormat::Csv => {
                    println!("{}", names.join(","));
                    for row in &rows {
                        let cells: Vec<String> = row
                            .iter()
                            .zip(reader.fields())
                            .map(|(v, f)| format_value(v, f.scale))
                            .collect();
                        println!("{}", cells.join(","));
                    }
                }
                OutputFormat::Json => {
                    let mut objects = Vec::with_capacity(rows.len());
                    for row in &rows {
                        let mut object = serde_json::Map::new();
                        for (name, value) in names.iter().zip(row) {
                            object.insert(name.to_string(), serde_json::to_value(value)?);
                        }
                        objects.push(object);
                    }
                    println!("{}", serde_json::to_string_pretty(&objects)?);
                }
            }
        }
    }

    Ok(())
}

fn open_catalog(path: &Path) -> anyhow::Result<BinFileReader<std::io::BufReader<std::fs::File>>> {
    let mut reader = BinFileReader::open(path)?;
    reader
        .read_header()
        .with_context(|| format!("Invalid catalog {}", path.display()))?;
    Ok(reader)
}

fn format_value(value: &FieldValue, scale: i32) -> String {
    match value {
        FieldValue::Char(c) => c.to_string(),
        FieldValue::Text(s) => s.clone(),
        FieldValue::Raw(bytes) => bytes.iter().map(|b| format!("{b:02x}")).collect(),
        FieldValue::Int(_) | FieldValue::UInt(_) if scale > 1 => {
            value.scaled(scale).map_or_else(String::new, |v| v.to_string())
        }
        FieldValue::Int(v) => v.to_string(),
        FieldValue::UInt(v) => v.to_string(),
    }
}

fn print_inspect_table<R: std::io::Read + std::io::Seek>(reader: &BinFileReader<R>) {
    println!("Preamble:     {}", reader.header_text());
    println!("Version:      {}", reader.version());
    println!("Byte swapped: {}", reader.byteswap());
    println!("Record size:  {} bytes", reader.record_size());
    println!("Trixels:      {}", reader.index_size());
    println!("Records:      {}", reader.total_records());
    println!("Data offset:  {}", reader.data_offset());
    println!("\nFields:");
    for f in reader.fields() {
        println!("  {:<10} {:>3} bytes  {:?}  scale {}", f.name, f.size, f.field_type, f.scale);
    }
    let populated = reader.index().iter().filter(|e| e.record_count > 0).count();
    println!("\nPopulated trixels: {populated}");
}

fn print_inspect_json<R: std::io::Read + std::io::Seek>(reader: &BinFileReader<R>) -> anyhow::Result<()> {
    let summary = serde_json::json!({
        "preamble": reader.header_text(),
        "version": reader.version(),
        "byteswap": reader.byteswap(),
        "record_size": reader.record_size(),
        "total_records": reader.total_records(),
        "data_offset": reader.data_offset(),
        "fields": reader.fields(),
        "index": reader.index(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn print_inspect_csv<R: std::io::Read + std::io::Seek>(reader: &BinFileReader<R>) {
    println!("id,offset,record_count");
    for e in reader.index() {
        println!("{},{},{}", e.id, e.offset, e.record_count);
    }
}
