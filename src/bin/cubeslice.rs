use clap::{Parser, ValueEnum};
use log::info;
use std::path::PathBuf;

use trip_volume::{Orientation, VoxelCube};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Axis {
    Axial,
    Coronal,
    Sagittal,
}

impl From<Axis> for Orientation {
    fn from(axis: Axis) -> Self {
        match axis {
            Axis::Axial => Orientation::Axial,
            Axis::Coronal => Orientation::Coronal,
            Axis::Sagittal => Orientation::Sagittal,
        }
    }
}

/// Render one slice of a cube as an 8-bit grayscale image
#[derive(Parser, Debug)]
#[command(name = "cubeslice", version, author, long_about = None)]
struct Args {
    /// Cube file (.cube, or .hed/.ctx/.dos/.let for TRiP98)
    input: PathBuf,

    /// Output image, format chosen by extension (e.g. .png)
    output: PathBuf,

    /// Slice index, defaults to the centre of the volume
    #[arg(short, long)]
    index: Option<usize>,

    /// Slicing axis
    #[arg(short, long, value_enum, default_value_t = Axis::Axial)]
    axis: Axis,

    /// Lower bound of the value window
    #[arg(long, requires = "max")]
    min: Option<f64>,

    /// Upper bound of the value window
    #[arg(long, requires = "min")]
    max: Option<f64>,

    /// Print min/max/mean of the cube
    #[arg(long, default_value_t = false)]
    stats: bool,

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

    let cube = VoxelCube::open(&args.input)?;
    let (nx, ny, nz) = cube.dimensions();
    if args.stats {
        let stats = cube.statistics();
        info!("min {} max {} mean {}", stats.min, stats.max, stats.mean);
    }

    let orientation = Orientation::from(args.axis);
    let index = args.index.unwrap_or(match orientation {
        Orientation::Axial => nz / 2,
        Orientation::Coronal => ny / 2,
        Orientation::Sagittal => nx / 2,
    });
    let window = args.min.zip(args.max);

    let image = cube.slice_image(index, orientation, window)?;
    image.save(&args.output)?;
    info!("Wrote {:?} slice {} to {}", orientation, index, args.output.display());
    Ok(())
}
