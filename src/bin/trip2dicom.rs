use clap::Parser;
use log::info;
use std::path::PathBuf;

use trip_volume::{DicomBridge, ExportMetadata, VoxelCube};

/// Convert a native or TRiP98 cube into a DICOM image series
#[derive(Parser, Debug)]
#[command(name = "trip2dicom", version, author, long_about = None)]
struct Args {
    /// Cube file (.cube, or .hed/.ctx/.dos/.let for TRiP98)
    input: PathBuf,

    /// Directory receiving one .dcm file per slice
    output: PathBuf,

    /// DICOM modality, defaults to the cube's own
    #[arg(long)]
    modality: Option<String>,

    /// Patient name written into every slice
    #[arg(long)]
    patient_name: Option<String>,

    /// Patient ID written into every slice
    #[arg(long)]
    patient_id: Option<String>,

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

    info!("Reading cube from: {}", args.input.display());
    let cube = VoxelCube::open(&args.input)?;
    let (nx, ny, nz) = cube.dimensions();
    info!("  {}x{}x{} voxels of {}", nx, ny, nz, cube.data_type());

    let mut metadata = ExportMetadata::from_cube(&cube);
    if args.modality.is_some() {
        metadata.modality = args.modality;
    }
    if args.patient_name.is_some() {
        metadata.patient_name = args.patient_name;
    }
    if args.patient_id.is_some() {
        metadata.patient_id = args.patient_id;
    }

    let paths = DicomBridge::export_to_directory(&cube, cube.frame(), &metadata, &args.output)?;
    info!("Wrote {} slices to {}", paths.len(), args.output.display());
    Ok(())
}
