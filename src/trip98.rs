//! TRiP98 cube files: a text header (`.hed`) next to a raw data file.
//!
//! Header offsets count voxels from the grid corner, so the first voxel
//! centre sits at `(xoffset + 0.5) * pixel_size`. Slice positions come from
//! the optional z table; without one they are `(zoffset + k) * slice_distance`.

use crate::cube_format::decode_payload;
use crate::data_type::DataType;
use crate::enums::{Endian, SliceOrder};
use crate::frame::CoordinateFrame;
use crate::metadata::{self, Metadata};
use crate::resource::write_atomic_all;
use crate::volume::{CubeError, VoxelCube, VoxelData, VoxelElement, with_element_type};

use flate2::read::GzDecoder;
use std::{
    fmt::Write as _,
    fs,
    io::Read,
    path::{Path, PathBuf},
};

pub const HEADER_EXTENSION: &str = "hed";
pub const PRIMARY_VIEW: &str = "primary_view";
const DEFAULT_VERSION: &str = "2.0";
const DATA_EXTENSIONS: [&str; 4] = ["ctx", "dos", "let", "bin"];
const GZIP_EXTENSION: &str = "gz";

#[derive(Debug, Clone, PartialEq)]
pub struct Trip98Header {
    pub version: String,
    pub modality: String,
    pub created_by: String,
    pub creation_info: String,
    pub primary_view: String,
    pub data_type: DataType,
    pub byte_order: Endian,
    pub patient_name: String,
    pub pixel_size: f64,
    pub slice_distance: f64,
    /// `(dimx, dimy, dimz)`
    pub dimensions: (usize, usize, usize),
    /// Offsets in voxels: `xoffset`, `yoffset` in pixels and `zoffset` in slices.
    pub offsets: (i64, i64, i64),
    pub z_table: Option<Vec<f64>>,
}

fn format_error(line: usize, message: impl std::fmt::Display) -> CubeError {
    CubeError::Format(format!("header line {}: {}", line, message))
}

fn parse_value<T: std::str::FromStr>(line: usize, key: &str, value: Option<&str>) -> Result<T, CubeError> {
    let value = value.ok_or_else(|| format_error(line, format!("'{}' without value", key)))?;
    value
        .parse()
        .map_err(|_| format_error(line, format!("invalid value '{}' for '{}'", value, key)))
}

fn resolve_data_type(name: &str, num_bytes: usize) -> Result<DataType, CubeError> {
    match (name, num_bytes) {
        ("integer", 1) => Ok(DataType::Int8),
        ("integer", 2) => Ok(DataType::Int16),
        ("integer", 4) => Ok(DataType::Int32),
        ("float", 4) => Ok(DataType::Float32),
        ("float", 8) | ("double", 8) => Ok(DataType::Float64),
        _ => Err(CubeError::Unsupported(format!(
            "data_type {} with num_bytes {}",
            name, num_bytes
        ))),
    }
}

impl Trip98Header {
    pub fn parse(text: &str) -> Result<Self, CubeError> {
        let mut version = None;
        let mut modality = String::new();
        let mut created_by = String::new();
        let mut creation_info = String::new();
        let mut primary_view = String::from("transversal");
        let mut data_type_name = None;
        let mut num_bytes = None;
        let mut byte_order = Endian::Little;
        let mut patient_name = String::new();
        let mut slice_dimension = None;
        let mut pixel_size = None;
        let mut slice_distance = None;
        let mut slice_number = None;
        let (mut dimx, mut dimy, mut dimz) = (None, None, None);
        let mut offsets = (0i64, 0i64, 0i64);
        let mut z_table = None;

        let mut lines = text.lines().enumerate().map(|(index, line)| (index + 1, line));
        while let Some((number, line)) = lines.next() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut tokens = trimmed.split_whitespace();
            let Some(key) = tokens.next() else { continue };
            let rest = trimmed[key.len()..].trim();
            let value = tokens.next();

            match key {
                "version" => version = value.map(str::to_string),
                "modality" => modality = rest.to_string(),
                "created_by" => created_by = rest.to_string(),
                "creation_info" => creation_info = rest.to_string(),
                "primary_view" => primary_view = rest.to_string(),
                "data_type" => data_type_name = value.map(str::to_lowercase),
                "num_bytes" => num_bytes = Some(parse_value::<usize>(number, key, value)?),
                "byte_order" => {
                    byte_order = match value {
                        Some("vms") => Endian::Little,
                        Some("aix") => Endian::Big,
                        other => {
                            return Err(format_error(number, format!("unknown byte_order {:?}", other)));
                        }
                    }
                }
                "patient_name" => patient_name = rest.to_string(),
                "slice_dimension" => slice_dimension = Some(parse_value::<usize>(number, key, value)?),
                "pixel_size" => pixel_size = Some(parse_value::<f64>(number, key, value)?),
                "slice_distance" => slice_distance = Some(parse_value::<f64>(number, key, value)?),
                "slice_number" => slice_number = Some(parse_value::<usize>(number, key, value)?),
                "xoffset" => offsets.0 = parse_offset(number, key, value)?,
                "yoffset" => offsets.1 = parse_offset(number, key, value)?,
                "zoffset" => offsets.2 = parse_offset(number, key, value)?,
                "dimx" => dimx = Some(parse_value::<usize>(number, key, value)?),
                "dimy" => dimy = Some(parse_value::<usize>(number, key, value)?),
                "dimz" => dimz = Some(parse_value::<usize>(number, key, value)?),
                "z_table" => {}
                "slice_no" => {
                    let rows = slice_number
                        .or(dimz)
                        .ok_or_else(|| format_error(number, "z table before slice_number"))?;
                    let mut positions = Vec::with_capacity(rows);
                    for _ in 0..rows {
                        let (row_number, row) = lines
                            .next()
                            .ok_or_else(|| format_error(number, "z table ends early"))?;
                        let position = row.split_whitespace().nth(1);
                        positions.push(parse_value::<f64>(row_number, "position", position)?);
                    }
                    z_table = Some(positions);
                }
                _ => log::debug!("ignoring header key '{}' on line {}", key, number),
            }
        }

        let missing = |key: &str| CubeError::Format(format!("header lacks '{}'", key));
        let data_type_name = data_type_name.ok_or_else(|| missing("data_type"))?;
        let num_bytes = num_bytes.ok_or_else(|| missing("num_bytes"))?;
        let dimx = dimx.or(slice_dimension).ok_or_else(|| missing("dimx"))?;
        let dimy = dimy.or(slice_dimension).ok_or_else(|| missing("dimy"))?;
        let dimz = dimz.or(slice_number).ok_or_else(|| missing("dimz"))?;
        if let Some(table) = &z_table {
            if table.len() != dimz {
                return Err(CubeError::Format(format!(
                    "z table has {} rows for {} slices",
                    table.len(),
                    dimz
                )));
            }
        }

        Ok(Self {
            version: version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            modality,
            created_by,
            creation_info,
            primary_view,
            data_type: resolve_data_type(&data_type_name, num_bytes)?,
            byte_order,
            patient_name,
            pixel_size: pixel_size.ok_or_else(|| missing("pixel_size"))?,
            slice_distance: slice_distance.ok_or_else(|| missing("slice_distance"))?,
            dimensions: (dimx, dimy, dimz),
            offsets,
            z_table,
        })
    }

    pub fn to_text(&self) -> String {
        let (dimx, dimy, dimz) = self.dimensions;
        let (data_type, num_bytes) = match self.data_type {
            DataType::Float32 => ("float", 4),
            DataType::Float64 => ("double", 8),
            other => ("integer", other.byte_size()),
        };
        let byte_order = match self.byte_order {
            Endian::Little => "vms",
            Endian::Big => "aix",
        };

        let mut out = String::new();
        let _ = writeln!(out, "version {}", self.version);
        let _ = writeln!(out, "modality {}", self.modality);
        let _ = writeln!(out, "created_by {}", self.created_by);
        let _ = writeln!(out, "creation_info {}", self.creation_info);
        let _ = writeln!(out, "primary_view {}", self.primary_view);
        let _ = writeln!(out, "data_type {}", data_type);
        let _ = writeln!(out, "num_bytes {}", num_bytes);
        let _ = writeln!(out, "byte_order {}", byte_order);
        let _ = writeln!(out, "patient_name {}", self.patient_name);
        let _ = writeln!(out, "slice_dimension {}", dimx);
        let _ = writeln!(out, "pixel_size {:.7}", self.pixel_size);
        let _ = writeln!(out, "slice_distance {:.7}", self.slice_distance);
        let _ = writeln!(out, "slice_number {}", dimz);
        let _ = writeln!(out, "xoffset {}", self.offsets.0);
        let _ = writeln!(out, "dimx {}", dimx);
        let _ = writeln!(out, "yoffset {}", self.offsets.1);
        let _ = writeln!(out, "dimy {}", dimy);
        let _ = writeln!(out, "zoffset {}", self.offsets.2);
        let _ = writeln!(out, "dimz {}", dimz);
        match &self.z_table {
            Some(positions) => {
                out.push_str("z_table yes\n");
                out.push_str("slice_no  position  thickness  gantry_tilt\n");
                for (index, position) in positions.iter().enumerate() {
                    let _ = writeln!(
                        out,
                        "  {:<3}{:14.4}{:13.4}{:14.4}",
                        index + 1,
                        position,
                        self.slice_distance,
                        0.0
                    );
                }
            }
            None => out.push_str("z_table no\n"),
        }
        out
    }

    /// Geometry described by the header.
    pub fn frame(&self) -> Result<CoordinateFrame, CubeError> {
        let (dimx, dimy, dimz) = self.dimensions;
        let px = self.pixel_size;
        let origin_xy = ((self.offsets.0 as f64 + 0.5) * px, (self.offsets.1 as f64 + 0.5) * px);
        let positions = match &self.z_table {
            Some(positions) => positions.clone(),
            None => (0..dimz)
                .map(|k| (self.offsets.2 + k as i64) as f64 * self.slice_distance)
                .collect(),
        };
        let frame = CoordinateFrame::from_slice_positions(origin_xy, (px, px), (dimx, dimy), positions)?;
        if self.slice_distance > 0.0 {
            Ok(frame.with_slice_distance(self.slice_distance)?)
        } else {
            Ok(frame)
        }
    }

    /// Header describing `cube`.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::Unsupported`] for unsigned element types and for
    /// pixels that are not square.
    pub fn for_cube(cube: &VoxelCube) -> Result<Self, CubeError> {
        let data_type = cube.data_type();
        if !data_type.is_signed() {
            return Err(CubeError::Unsupported(format!(
                "TRiP98 has no unsigned {} type",
                data_type
            )));
        }
        let frame = cube.frame();
        let (dx, dy, dz) = frame.voxel_size();
        if (dx - dy).abs() > 1e-9 {
            return Err(CubeError::Unsupported(format!(
                "TRiP98 needs square pixels, got {} x {}",
                dx, dy
            )));
        }

        let (x0, y0, _) = frame.origin();
        let corner = |origin: f64| (origin / dx - 0.5).round() as i64;
        let offsets = (corner(x0), corner(y0), 0);
        for (axis, origin, offset) in [('x', x0, offsets.0), ('y', y0, offsets.1)] {
            let written = (offset as f64 + 0.5) * dx;
            if (written - origin).abs() > 1e-6 {
                log::warn!(
                    "{} origin {} is not on the pixel grid, stored as {}",
                    axis,
                    origin,
                    written
                );
            }
        }

        let positions = frame.slice_positions();
        let implied = positions
            .iter()
            .enumerate()
            .all(|(k, z)| (k as f64 * dz - z).abs() <= 1e-6);
        let z_table = (!implied || frame.slice_order() == SliceOrder::Descending).then(|| positions.to_vec());

        let metadata = cube.metadata();
        let text = |key: &str, default: &str| metadata.get(key).unwrap_or(default).to_string();
        Ok(Self {
            version: DEFAULT_VERSION.to_string(),
            modality: text(metadata::MODALITY, "CT"),
            created_by: text(metadata::CREATED_BY, env!("CARGO_PKG_NAME")),
            creation_info: text(metadata::COMMENT, ""),
            primary_view: text(PRIMARY_VIEW, "transversal"),
            data_type,
            byte_order: cube.byte_order(),
            patient_name: text(metadata::PATIENT_NAME, "Anonymous"),
            pixel_size: dx,
            slice_distance: dz,
            dimensions: frame.dimensions(),
            offsets,
            z_table,
        })
    }

    fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        for (key, value) in [
            (metadata::MODALITY, &self.modality),
            (metadata::CREATED_BY, &self.created_by),
            (metadata::COMMENT, &self.creation_info),
            (PRIMARY_VIEW, &self.primary_view),
            (metadata::PATIENT_NAME, &self.patient_name),
        ] {
            if !value.is_empty() {
                metadata.set(key, value.as_str());
            }
        }
        metadata
    }
}

fn parse_offset(line: usize, key: &str, value: Option<&str>) -> Result<i64, CubeError> {
    // some writers emit "0.0"
    match parse_value::<i64>(line, key, value) {
        Ok(offset) => Ok(offset),
        Err(err) => {
            let float = parse_value::<f64>(line, key, value).map_err(|_| err)?;
            Ok(float.round() as i64)
        }
    }
}

/// Header and data file locations for a TRiP98 cube.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trip98Paths {
    pub header: PathBuf,
    pub data: PathBuf,
}

impl Trip98Paths {
    /// Paths for writing, the data extension follows the modality.
    pub fn for_modality(path: impl AsRef<Path>, modality: &str) -> Self {
        let path = path.as_ref();
        Self {
            header: path.with_extension(HEADER_EXTENSION),
            data: path.with_extension(data_extension(modality)),
        }
    }

    /// Resolves an existing pair from either file or the common stem.
    ///
    /// The data file may be gzipped (`<stem>.ctx.gz`); a plain file wins when both exist.
    pub fn locate(path: impl AsRef<Path>) -> Result<Self, CubeError> {
        let path = path.as_ref();
        if is_gzip(path) && path.is_file() {
            return Ok(Self {
                header: path.with_extension("").with_extension(HEADER_EXTENSION),
                data: path.to_path_buf(),
            });
        }

        let is_header = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(HEADER_EXTENSION));

        if !is_header && path.extension().is_some() && path.is_file() {
            return Ok(Self {
                header: path.with_extension(HEADER_EXTENSION),
                data: path.to_path_buf(),
            });
        }

        let data = DATA_EXTENSIONS
            .iter()
            .flat_map(|ext| {
                [
                    path.with_extension(ext),
                    path.with_extension(format!("{ext}.{GZIP_EXTENSION}")),
                ]
            })
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                CubeError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no TRiP98 data file next to {}", path.display()),
                ))
            })?;
        Ok(Self {
            header: path.with_extension(HEADER_EXTENSION),
            data,
        })
    }
}

pub fn data_extension(modality: &str) -> &'static str {
    match modality.to_ascii_uppercase().as_str() {
        "CT" => "ctx",
        "DOS" | "RTDOSE" => "dos",
        "LET" => "let",
        _ => "bin",
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(GZIP_EXTENSION))
}

/// True for paths naming either file of a TRiP98 pair, gzipped data included.
pub fn is_trip98_path(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    let inner;
    let path = if is_gzip(path) {
        inner = path.with_extension("");
        inner.as_path()
    } else {
        path
    };
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            [HEADER_EXTENSION, "ctx", "dos", "let"]
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

impl VoxelCube {
    /// Reads a TRiP98 pair or a native cube file, chosen by extension.
    pub fn open(path: impl AsRef<Path>) -> Result<VoxelCube, CubeError> {
        if is_trip98_path(&path) {
            Self::read_trip98(path)
        } else {
            Self::read_file(path)
        }
    }

    pub fn from_trip98(header: &Trip98Header, data: &[u8]) -> Result<VoxelCube, CubeError> {
        let frame = header.frame()?;
        let (nx, ny, nz) = frame.dimensions();
        let expected = nx * ny * nz * header.data_type.byte_size();
        if data.len() != expected {
            return Err(CubeError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        let voxels: VoxelData = with_element_type!(header.data_type, T => {
            T::into_data(decode_payload::<T>(data, (nz, ny, nx), header.byte_order)?)
        });
        Ok(VoxelCube::from_data(voxels, frame)?
            .with_byte_order(header.byte_order)
            .with_metadata(header.metadata()))
    }

    /// Header text and raw data in the cube's byte order.
    pub fn to_trip98(&self) -> Result<(String, Vec<u8>), CubeError> {
        let header = Trip98Header::for_cube(self)?;
        Ok((header.to_text(), self.data().to_bytes(self.byte_order())))
    }

    pub fn read_trip98(path: impl AsRef<Path>) -> Result<VoxelCube, CubeError> {
        let paths = Trip98Paths::locate(path)?;
        log::info!("reading {} and {}", paths.header.display(), paths.data.display());
        let text = fs::read_to_string(&paths.header)?;
        let header = Trip98Header::parse(&text)?;
        let data = if is_gzip(&paths.data) {
            let mut data = Vec::new();
            GzDecoder::new(fs::File::open(&paths.data)?).read_to_end(&mut data)?;
            data
        } else {
            fs::read(&paths.data)?
        };
        Self::from_trip98(&header, &data)
    }

    /// Writes `<stem>.hed` and the data file as one unit: either both are
    /// replaced or both keep their previous content.
    pub fn write_trip98(&self, path: impl AsRef<Path>) -> Result<Trip98Paths, CubeError> {
        let header = Trip98Header::for_cube(self)?;
        let paths = Trip98Paths::for_modality(path, &header.modality);
        let data = self.data().to_bytes(self.byte_order());
        let text = header.to_text();
        write_atomic_all(&[
            (paths.data.as_path(), data.as_slice()),
            (paths.header.as_path(), text.as_bytes()),
        ])?;
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    const HEADER: &str = "version 1.4
modality CT
created_by tester
creation_info made by hand
primary_view transversal
data_type integer
num_bytes 2
byte_order aix
patient_name phantom
slice_dimension 2
pixel_size 1.5000000
slice_distance 3.0000000
slice_number 3
xoffset 10
dimx 2
yoffset -4
dimy 2
zoffset 2
dimz 3
z_table no
";

    #[test]
    fn test_parse_header_offsets() {
        let header = Trip98Header::parse(HEADER).unwrap();
        assert_eq!(header.data_type, DataType::Int16);
        assert_eq!(header.byte_order, Endian::Big);
        assert_eq!(header.offsets, (10, -4, 2));
        assert_eq!(header.creation_info, "made by hand");

        let frame = header.frame().unwrap();
        assert_eq!(frame.origin(), (15.75, -5.25, 6.0));
        assert_eq!(frame.slice_positions(), &[6.0, 9.0, 12.0]);
    }

    #[test]
    fn test_unsigned_is_unsupported() {
        let frame = CoordinateFrame::uniform((0.5, 0.5, 0.0), (1.0, 1.0, 1.0), (1, 1, 1)).unwrap();
        let cube = VoxelCube::new(Array3::<u16>::zeros((1, 1, 1)), frame).unwrap();
        assert!(matches!(cube.to_trip98(), Err(CubeError::Unsupported(_))));
    }

    #[test]
    fn test_non_uniform_z_table_round_trip() {
        let frame = CoordinateFrame::from_slice_positions((1.0, 3.0), (2.0, 2.0), (2, 1), vec![-4.0, -1.0, 1.5])
            .unwrap();
        let array = Array3::from_shape_vec((3, 1, 2), vec![0.5f32, 1.0, 2.0, 4.0, 8.0, 16.0]).unwrap();
        let cube = VoxelCube::new(array, frame).unwrap();

        let (text, data) = cube.to_trip98().unwrap();
        assert!(text.contains("z_table yes"));
        assert!(text.contains("zoffset 0"));
        assert!(text.contains("  3          1.5000       3.0000        0.0000"));

        let header = Trip98Header::parse(&text).unwrap();
        let loaded = VoxelCube::from_trip98(&header, &data).unwrap();
        assert_eq!(loaded.frame(), cube.frame());
        assert_eq!(loaded.data(), cube.data());
    }

    #[test]
    fn test_short_data_file() {
        let header = Trip98Header::parse(HEADER).unwrap();
        let data = vec![0u8; 23];
        assert!(matches!(
            VoxelCube::from_trip98(&header, &data),
            Err(CubeError::SizeMismatch { expected: 24, actual: 23 })
        ));
    }

    #[test]
    fn test_write_and_read_files() {
        let dir = tempfile::tempdir().unwrap();
        let frame = CoordinateFrame::uniform((0.5, 0.5, 0.0), (1.0, 1.0, 2.5), (2, 2, 2)).unwrap();
        let array = Array3::from_shape_vec((2, 2, 2), (0..8).collect::<Vec<i32>>()).unwrap();
        let cube = VoxelCube::new(array, frame)
            .unwrap()
            .with_metadata(Metadata::new().with(metadata::MODALITY, "DOS"));

        let paths = cube.write_trip98(dir.path().join("plan")).unwrap();
        assert_eq!(paths.data.extension().unwrap(), "dos");
        let loaded = VoxelCube::read_trip98(&paths.header).unwrap();
        assert_eq!(loaded.data(), cube.data());
        assert_eq!(loaded.frame(), cube.frame());
        assert_eq!(loaded.metadata().modality(), Some("DOS"));
    }

    #[test]
    fn test_single_slice_keeps_slice_distance() {
        let text = HEADER.replace("dimz 3", "dimz 1").replace("slice_number 3", "slice_number 1");
        let header = Trip98Header::parse(&text).unwrap();
        let frame = header.frame().unwrap();
        assert_eq!(frame.voxel_size(), (1.5, 1.5, 3.0));

        let cube = VoxelCube::new(Array3::<i16>::zeros((1, 2, 2)), frame).unwrap();
        let (written, _) = cube.to_trip98().unwrap();
        assert!(written.contains("slice_distance 3.0000000"));
    }

    #[test]
    fn test_read_gzipped_data() {
        use flate2::{Compression, write::GzEncoder};
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let frame = CoordinateFrame::uniform((0.5, 0.5, 0.0), (1.0, 1.0, 2.0), (2, 1, 2)).unwrap();
        let array = Array3::from_shape_vec((2, 1, 2), vec![-3i16, 7, 1200, -1000]).unwrap();
        let cube = VoxelCube::new(array, frame).unwrap();
        let (text, data) = cube.to_trip98().unwrap();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&data).unwrap();
        std::fs::write(dir.path().join("patient.hed"), text).unwrap();
        std::fs::write(dir.path().join("patient.ctx.gz"), encoder.finish().unwrap()).unwrap();

        let gz_path = dir.path().join("patient.ctx.gz");
        assert!(is_trip98_path(&gz_path));
        assert_eq!(
            VoxelCube::read_trip98(dir.path().join("patient")).unwrap().data(),
            cube.data()
        );
        for path in [dir.path().join("patient.hed"), gz_path] {
            let loaded = VoxelCube::open(&path).unwrap();
            assert_eq!(loaded.data(), cube.data());
            assert_eq!(loaded.frame(), cube.frame());
        }
    }

    #[test]
    fn test_failed_header_write_keeps_previous_pair() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.ctx"), b"old").unwrap();
        std::fs::create_dir(dir.path().join("b.hed")).unwrap();

        let frame = CoordinateFrame::uniform((0.5, 0.5, 0.0), (1.0, 1.0, 1.0), (1, 1, 1)).unwrap();
        let cube = VoxelCube::new(Array3::<i16>::ones((1, 1, 1)), frame)
            .unwrap()
            .with_metadata(Metadata::new().with(metadata::MODALITY, "CT"));

        assert!(cube.write_trip98(dir.path().join("b")).is_err());
        assert_eq!(std::fs::read(dir.path().join("b.ctx")).unwrap(), b"old");
        assert!(dir.path().join("b.hed").is_dir());
    }
}
