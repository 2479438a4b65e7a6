//! Native binary cube file.
//!
//! ```text
//! magic "TRIPCUBE"
//! u8  byte order (0 little, 1 big)    u8  reserved
//! u16 version (1 | 2)                 u16 data type code    u16 reserved
//! u32 nx, ny, nz
//! f64 dx, dy, dz
//! f64 x0, y0
//! v1: f64 z0                          v2: nz x f64 slice positions
//! u32 metadata length, metadata block (u16 count, then key/value texts)
//! payload: nx*ny*nz elements, x fastest, in the declared byte order
//! ```
//!
//! Every multi-byte field after the flag byte uses the declared byte order.

use crate::data_type::{DataType, Element};
use crate::enums::Endian;
use crate::frame::CoordinateFrame;
use crate::metadata::Metadata;
use crate::resource::{ResourceReader, ResourceWriter, write_atomic};
use crate::volume::{CubeError, VoxelCube, VoxelData, VoxelElement, with_array, with_element_type};

use ndarray::Array3;
use rayon::prelude::*;
use std::{fs, path::Path};

pub const MAGIC: &[u8; 8] = b"TRIPCUBE";

struct Header {
    byte_order: Endian,
    version: u16,
    data_type: DataType,
    frame: CoordinateFrame,
    metadata: Metadata,
}

impl VoxelCube {
    /// Parses a complete cube file held in memory.
    ///
    /// # Errors
    ///
    /// * [`CubeError::Format`] for a bad magic, version or truncated header
    /// * [`CubeError::UnknownDataType`] for an unknown type code
    /// * [`CubeError::SizeMismatch`] when the payload is not exactly
    ///   `nx * ny * nz * element_size` bytes
    pub fn load(bytes: &[u8]) -> Result<VoxelCube, CubeError> {
        let mut reader = ResourceReader::new(bytes, Endian::Little);
        let header = read_header(&mut reader)?;
        let payload = reader.rest();

        let (nx, ny, nz) = header.frame.dimensions();
        let expected = nx
            .checked_mul(ny)
            .and_then(|n| n.checked_mul(nz))
            .and_then(|n| n.checked_mul(header.data_type.byte_size()))
            .ok_or_else(|| CubeError::Format(format!("dimensions {}x{}x{} overflow", nx, ny, nz)))?;
        if payload.len() != expected {
            return Err(CubeError::SizeMismatch {
                expected,
                actual: payload.len(),
            });
        }

        let data = with_element_type!(header.data_type, T => {
            T::into_data(decode_payload::<T>(payload, (nz, ny, nx), header.byte_order)?)
        });

        log::debug!(
            "loaded {}x{}x{} {} cube (version {}, {:?} endian)",
            nx,
            ny,
            nz,
            header.data_type,
            header.version,
            header.byte_order
        );

        Ok(VoxelCube::from_data(data, header.frame)?
            .with_byte_order(header.byte_order)
            .with_metadata(header.metadata)
            .with_format_version(header.version)?)
    }

    /// Serializes header and payload in the cube's own byte order.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::Format`] when the cube uses format version 1 but
    /// its slices are not equidistant, or when a metadata text is too long.
    pub fn save(&self) -> Result<Vec<u8>, CubeError> {
        let endian = self.byte_order();
        let frame = self.frame();
        let (nx, ny, nz) = frame.dimensions();
        let (dx, dy, dz) = frame.voxel_size();
        let (x0, y0, z0) = frame.origin();

        if self.format_version() == 1 && !frame.is_uniform() {
            return Err(CubeError::Format(
                "format version 1 cannot store non-uniform slice positions".to_string(),
            ));
        }

        let capacity = 128 + nz * 8 + self.len() * self.data_type().byte_size();
        let mut writer = ResourceWriter::with_capacity(endian, capacity);
        writer.write_bytes(MAGIC);
        writer.write_u8(endian.flag());
        writer.write_u8(0);
        writer.write_u16(self.format_version());
        writer.write_u16(self.data_type().code());
        writer.write_u16(0);
        for n in [nx, ny, nz] {
            writer.write_u32(dimension_to_u32(n)?);
        }
        for value in [dx, dy, dz, x0, y0] {
            writer.write_f64(value);
        }
        if self.format_version() == 1 {
            writer.write_f64(z0);
        } else {
            for &z in frame.slice_positions() {
                writer.write_f64(z);
            }
        }

        let metadata = encode_metadata(self.metadata(), endian)?;
        writer.write_u32(dimension_to_u32(metadata.len())?);
        writer.write_bytes(&metadata);

        let payload = with_array!(self.data(), array => encode_payload(array, endian));
        writer.write_bytes(&payload);
        Ok(writer.into_inner())
    }

    pub fn read_file(path: impl AsRef<Path>) -> Result<VoxelCube, CubeError> {
        let bytes = fs::read(path.as_ref())?;
        Self::load(&bytes)
    }

    /// Writes the cube atomically: an existing file is only replaced once the
    /// new content is complete.
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<(), CubeError> {
        let bytes = self.save()?;
        write_atomic(path, &bytes)?;
        Ok(())
    }
}

fn dimension_to_u32(n: usize) -> Result<u32, CubeError> {
    u32::try_from(n).map_err(|_| CubeError::Format(format!("{} does not fit a 32-bit field", n)))
}

fn read_header(reader: &mut ResourceReader<'_>) -> Result<Header, CubeError> {
    let magic = reader.take(MAGIC.len())?;
    if magic != MAGIC {
        return Err(CubeError::Format(format!("bad magic {:?}", magic)));
    }
    let flag = reader.read_u8()?;
    let byte_order = Endian::from_flag(flag)
        .ok_or_else(|| CubeError::Format(format!("invalid byte order flag {}", flag)))?;
    reader.set_endian(byte_order);
    reader.read_u8()?;

    let version = reader.read_u16()?;
    if !(1..=2).contains(&version) {
        return Err(CubeError::Format(format!("unsupported version {}", version)));
    }
    let code = reader.read_u16()?;
    let data_type = DataType::from_code(code).ok_or(CubeError::UnknownDataType(code))?;
    reader.read_u16()?;

    let nx = reader.read_u32()? as usize;
    let ny = reader.read_u32()? as usize;
    let nz = reader.read_u32()? as usize;
    if nx == 0 || ny == 0 || nz == 0 {
        return Err(CubeError::Format(format!("empty dimensions {}x{}x{}", nx, ny, nz)));
    }
    let dx = reader.read_f64()?;
    let dy = reader.read_f64()?;
    let dz = reader.read_f64()?;
    let x0 = reader.read_f64()?;
    let y0 = reader.read_f64()?;

    let frame = if version == 1 {
        let z0 = reader.read_f64()?;
        CoordinateFrame::uniform((x0, y0, z0), (dx, dy, dz), (nx, ny, nz))?
    } else {
        // guard against a huge nz before allocating
        if reader.remaining() < nz.saturating_mul(8) {
            return Err(CubeError::Format(format!(
                "slice table of {} entries truncated at offset {}",
                nz,
                reader.position()
            )));
        }
        let positions = (0..nz)
            .map(|_| reader.read_f64())
            .collect::<Result<Vec<_>, _>>()?;
        CoordinateFrame::from_slice_positions((x0, y0), (dx, dy), (nx, ny), positions)?.with_slice_distance(dz)?
    };

    let metadata_len = reader.read_u32()? as usize;
    let block = reader.take(metadata_len)?;
    let metadata = decode_metadata(block, byte_order)?;

    Ok(Header {
        byte_order,
        version,
        data_type,
        frame,
        metadata,
    })
}

fn decode_metadata(block: &[u8], endian: Endian) -> Result<Metadata, CubeError> {
    if block.is_empty() {
        return Ok(Metadata::new());
    }
    let mut reader = ResourceReader::new(block, endian);
    let count = reader.read_u16()?;
    let mut metadata = Metadata::new();
    for _ in 0..count {
        let key = reader.read_text()?;
        let value = reader.read_text()?;
        if metadata.get(&key).is_some() {
            return Err(CubeError::Format(format!("duplicate metadata key '{}'", key)));
        }
        metadata.set(key, value);
    }
    if reader.remaining() != 0 {
        return Err(CubeError::Format(format!(
            "{} trailing bytes in metadata block",
            reader.remaining()
        )));
    }
    Ok(metadata)
}

fn encode_metadata(metadata: &Metadata, endian: Endian) -> Result<Vec<u8>, CubeError> {
    let mut writer = ResourceWriter::new(endian);
    let count = u16::try_from(metadata.len())
        .map_err(|_| CubeError::Format(format!("{} metadata entries", metadata.len())))?;
    writer.write_u16(count);
    for (key, value) in metadata.iter() {
        writer.write_text(key)?;
        writer.write_text(value)?;
    }
    Ok(writer.into_inner())
}

/// Decodes `shape.0 * shape.1 * shape.2` elements; the caller checks length.
pub(crate) fn decode_payload<T: Element>(
    payload: &[u8],
    shape: (usize, usize, usize),
    endian: Endian,
) -> Result<Array3<T>, CubeError> {
    let values: Vec<T> = payload
        .par_chunks_exact(T::DATA_TYPE.byte_size())
        .map(|chunk| T::decode(chunk, endian))
        .collect();
    Array3::from_shape_vec(shape, values).map_err(|err| CubeError::Format(err.to_string()))
}

pub(crate) fn encode_payload<T: Element>(array: &Array3<T>, endian: Endian) -> Vec<u8> {
    let size = T::DATA_TYPE.byte_size();
    let mut out = Vec::with_capacity(array.len() * size);
    // iter() walks in logical order, which is x fastest for [z, y, x]
    for &value in array.iter() {
        value.encode(&mut out, endian);
    }
    out
}

impl VoxelData {
    /// Raw payload bytes in `endian`, x fastest.
    pub fn to_bytes(&self, endian: Endian) -> Vec<u8> {
        with_array!(self, array => encode_payload(array, endian))
    }

    pub fn from_bytes(
        data_type: DataType,
        bytes: &[u8],
        shape: (usize, usize, usize),
        endian: Endian,
    ) -> Result<Self, CubeError> {
        let expected = shape.0 * shape.1 * shape.2 * data_type.byte_size();
        if bytes.len() != expected {
            return Err(CubeError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(with_element_type!(data_type, T => {
            T::into_data(decode_payload::<T>(bytes, shape, endian)?)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata;

    fn cube() -> VoxelCube {
        let frame = CoordinateFrame::uniform((-1.0, -1.0, 0.0), (1.0, 1.0, 3.0), (2, 1, 2)).unwrap();
        let array = Array3::from_shape_vec((2, 1, 2), vec![1.5f32, -2.0, 0.25, 8.0]).unwrap();
        VoxelCube::new(array, frame)
            .unwrap()
            .with_metadata(Metadata::new().with(metadata::MODALITY, "DOS"))
    }

    #[test]
    fn test_header_layout() {
        let bytes = cube().with_byte_order(Endian::Big).save().unwrap();
        assert_eq!(&bytes[0..8], MAGIC);
        assert_eq!(bytes[8], 1);
        assert_eq!(&bytes[10..12], &[0, 2]);
        assert_eq!(&bytes[12..14], &[0, 7]);
        assert_eq!(&bytes[16..20], &[0, 0, 0, 2]);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = cube().save().unwrap();
        bytes[0] = b'X';
        assert!(matches!(VoxelCube::load(&bytes), Err(CubeError::Format(_))));
    }

    #[test]
    fn test_unknown_type_code() {
        let mut bytes = cube().save().unwrap();
        bytes[12] = 42;
        assert!(matches!(VoxelCube::load(&bytes), Err(CubeError::UnknownDataType(42))));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = cube().save().unwrap();
        assert!(matches!(VoxelCube::load(&bytes[..30]), Err(CubeError::Format(_))));
    }

    #[test]
    fn test_trailing_byte_is_size_mismatch() {
        let mut bytes = cube().save().unwrap();
        bytes.push(0);
        assert!(matches!(
            VoxelCube::load(&bytes),
            Err(CubeError::SizeMismatch { expected: 16, actual: 17 })
        ));
    }

    #[test]
    fn test_version_one_round_trip() {
        let cube = cube().with_format_version(1).unwrap();
        let bytes = cube.save().unwrap();
        let loaded = VoxelCube::load(&bytes).unwrap();
        assert_eq!(loaded, cube);
        assert_eq!(loaded.save().unwrap(), bytes);
    }

    #[test]
    fn test_single_slice_keeps_dz() {
        let frame = CoordinateFrame::from_slice_positions((0.0, 0.0), (1.0, 1.0), (2, 2), vec![7.0]).unwrap();
        let mut bytes = VoxelCube::filled(DataType::Int16, frame, 4.0).save().unwrap();
        bytes[44..52].copy_from_slice(&3.0f64.to_le_bytes());

        let loaded = VoxelCube::load(&bytes).unwrap();
        assert_eq!(loaded.voxel_size(), (1.0, 1.0, 3.0));
        assert_eq!(loaded.save().unwrap(), bytes);
    }
}
