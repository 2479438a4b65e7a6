//! # TRiP volume library
//!
//! This crate handles the volumetric data of ion-beam treatment planning:
//! voxel cubes holding CT numbers, dose or LET, their conversion to and from
//! DICOM image series, and the raster scan paths that drive the accelerator.
//!
//! Cubes are stored in a self-describing binary format (see [`cube_format`])
//! or in the TRiP98 header plus raw data layout (see [`trip98`]). Every cube
//! carries a [`CoordinateFrame`] with one explicit z position per slice, so
//! series with uneven slice spacing or descending acquisition order keep
//! their geometry exactly.
//!
//! DICOM series are assumed to have the following attributes:
//!  - Axial images (`ImageOrientationPatient` of `[1,0,0,0,1,0]`)
//!  - Native, uncompressed little endian pixel data
//!  - No multiframe images
//!
//! Numeric conversions run in parallel using rayon. All operations return
//! new values; files are written to a temporary file and renamed into place.
//!
//! # Examples
//!
//! ## Converting a CT series into a cube file
//!
//! ```no_run
//! # use trip_volume::{DicomBridge, ImportOptions, VoxelCube};
//! let imported = DicomBridge::import_directory("dicom", &ImportOptions::default())
//!     .expect("should have loaded files from directory");
//! imported
//!     .cube
//!     .write_file("patient.cube")
//!     .expect("should have written the cube");
//! ```
//!
//! ## Writing a reversed scan path
//!
//! ```no_run
//! # use trip_volume::{RasterScanPath, ScanLimits, ScanOrder};
//! let limits = ScanLimits::load("limits.toml").expect("should have read limits");
//! let path = RasterScanPath::read_file("field1.rst", Some(1)).expect("should have read spots");
//! path.write_file("field1_reversed.rst", ScanOrder::Reverse, &limits)
//!     .expect("should have written spots");
//! ```

pub mod config;
pub mod cube_format;
pub mod data_type;
pub mod dicom_bridge;
pub mod dicom_export;
pub mod enums;
pub mod frame;
pub mod metadata;
pub mod resource;
pub mod scan_path;
pub mod table;
pub mod trip98;
pub mod volume;

pub use config::{ConfigError, ScanLimits, ScanRange};
pub use data_type::{DataType, Element};
pub use dicom_bridge::{DicomBridge, DicomBridgeError, ImportOptions, ImportedVolume};
pub use dicom_export::ExportMetadata;
pub use enums::{ArithmeticOp, Endian, Orientation, ScanOrder, SliceOrder};
pub use frame::{CoordinateFrame, FrameError};
pub use metadata::Metadata;
pub use resource::{ResourceError, ResourceReader, ResourceWriter};
pub use scan_path::{RasterScanPath, ScanPathError, Spot};
pub use table::{GdTable, LookupTable, TableError};
pub use trip98::Trip98Header;
pub use volume::{CubeError, Statistics, VoxelCube, VoxelData, VoxelElement};
