use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

use trip_volume::{DataType, DicomBridge, Endian, GdTable, ImportOptions, LookupTable, metadata};

/// Convert a DICOM image series into a native or TRiP98 cube
#[derive(Parser, Debug)]
#[command(name = "dicom2trip", version, author, long_about = None)]
struct Args {
    /// Directory holding the .dcm files of the series
    input: PathBuf,

    /// Output cube; .hed/.ctx/.dos/.let write TRiP98, anything else the native format
    output: PathBuf,

    /// SeriesInstanceUID to import when the directory holds several series
    #[arg(long)]
    series: Option<String>,

    /// Voxel type of the cube (i8, u8, i16, u16, i32, u32, f32, f64)
    #[arg(long = "type")]
    data_type: Option<DataType>,

    /// gd table mapping rescaled values through a lookup (e.g. an HLUT)
    #[arg(long)]
    hlut: Option<PathBuf>,

    /// Column of the lookup table holding the mapped values
    #[arg(long, default_value_t = 1)]
    hlut_column: usize,

    /// Write big endian ("aix") data
    #[arg(long, default_value_t = false)]
    big_endian: bool,

    /// Native header version (1 or 2)
    #[arg(long, default_value_t = 2)]
    format_version: u16,

    /// Enable verbose logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let lookup = match &args.hlut {
        Some(path) => {
            info!("Loading lookup table from: {}", path.display());
            Some(LookupTable::from_gd_table(&GdTable::read_file(path)?, args.hlut_column)?)
        }
        None => None,
    };

    let options = ImportOptions {
        series_uid: args.series.clone(),
        target_type: args.data_type,
        lookup: lookup.as_ref(),
    };
    info!("Importing DICOM series from: {}", args.input.display());
    let imported = DicomBridge::import_directory(&args.input, &options)?;
    if imported.clamped > 0 {
        warn!("{} voxels were clamped into the target type", imported.clamped);
    }

    let byte_order = if args.big_endian { Endian::Big } else { Endian::Little };
    let mut cube = imported.cube.with_byte_order(byte_order);
    cube.metadata_mut()
        .set(metadata::CREATED_BY, concat!("dicom2trip ", env!("CARGO_PKG_VERSION")));

    if trip_volume::trip98::is_trip98_path(&args.output) {
        let paths = cube.write_trip98(&args.output)?;
        info!("Wrote {} and {}", paths.header.display(), paths.data.display());
    } else {
        cube = cube.with_format_version(args.format_version)?;
        cube.write_file(&args.output)?;
        info!("Wrote {}", args.output.display());
    }
    Ok(())
}
