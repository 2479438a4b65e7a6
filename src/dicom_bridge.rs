use crate::data_type::DataType;
use crate::frame::{CoordinateFrame, FrameError};
use crate::metadata::{self, Metadata};
use crate::table::LookupTable;
use crate::volume::{CubeError, VoxelCube};

use dicom::core::Tag;
use dicom::object::{FileDicomObject, InMemDicomObject, mem::InMemElement, open_file};
use dicom_dictionary_std::{tags, uids};
use ndarray::Array3;
use rayon::prelude::*;
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DicomBridgeError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent series: {0}")]
    InconsistentSeries(String),

    #[error("Incomplete series: gap of {gap} mm after slice at z = {position}, nominal spacing {expected} mm")]
    IncompleteSeries { position: f64, gap: f64, expected: f64 },

    #[error("Missing tag {0}")]
    MissingTag(&'static str),

    #[error("Invalid value for tag {tag}: {reason}")]
    InvalidTag { tag: &'static str, reason: String },

    #[error("Unsupported pixel data: {0}")]
    UnsupportedPixelData(String),

    #[error("Unsupported geometry: {0}")]
    UnsupportedGeometry(String),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Cube error: {0}")]
    Cube(#[from] CubeError),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("DICOM write error: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Selection and conversion settings for [`DicomBridge::import`].
#[derive(Debug, Clone, Default)]
pub struct ImportOptions<'a> {
    /// Series to import when the input mixes several.
    pub series_uid: Option<String>,
    /// Element type of the cube; inferred from the pixel data when `None`.
    pub target_type: Option<DataType>,
    /// Applied to rescaled values, e.g. an HLUT mapping HU to density.
    pub lookup: Option<&'a LookupTable>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedVolume {
    pub cube: VoxelCube,
    pub frame: CoordinateFrame,
    /// Voxels clamped while converting into the target type.
    pub clamped: usize,
}

impl ImportedVolume {
    pub fn into_parts(self) -> (VoxelCube, CoordinateFrame) {
        (self.cube, self.frame)
    }
}

pub struct DicomBridge;

/// Geometry and pixel payload of one image, pulled out of its DICOM object.
struct SliceInfo {
    instance_number: Option<i32>,
    rows: usize,
    columns: usize,
    /// (dx, dy), i.e. column spacing then row spacing
    pixel_spacing: (f64, f64),
    position: [f64; 3],
    slice_thickness: Option<f64>,
    spacing_between_slices: Option<f64>,
    slope: f64,
    intercept: f64,
    bits_allocated: u16,
    bits_stored: u16,
    high_bit: u16,
    signed: bool,
    /// Cube element type recorded by [`DicomBridge::export`].
    element_type: Option<DataType>,
    pixels: Vec<u8>,
}

pub(crate) const AXIAL: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
const POSITION_TOLERANCE: f64 = 1e-4;
const GAP_FACTOR: f64 = 1.5;

/// Private block holding the element type of an exported cube.
pub(crate) const PRIVATE_CREATOR: Tag = Tag(0x0071, 0x0010);
pub(crate) const PRIVATE_CREATOR_NAME: &str = "TRIP-VOLUME";
pub(crate) const ELEMENT_TYPE: Tag = Tag(0x0071, 0x1001);

pub(crate) fn element<'a>(
    object: &'a InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<&'a InMemElement, DicomBridgeError> {
    object.element(tag).map_err(|_| DicomBridgeError::MissingTag(name))
}

fn invalid(name: &'static str, err: impl std::fmt::Display) -> DicomBridgeError {
    DicomBridgeError::InvalidTag {
        tag: name,
        reason: err.to_string(),
    }
}

fn optional_f64(object: &InMemDicomObject, tag: Tag, name: &'static str) -> Result<Option<f64>, DicomBridgeError> {
    match object.element(tag) {
        Ok(element) => element.to_float64().map(Some).map_err(|err| invalid(name, err)),
        Err(_) => Ok(None),
    }
}

fn optional_str(object: &InMemDicomObject, tag: Tag) -> Option<String> {
    object
        .element(tag)
        .ok()
        .and_then(|element| element.to_str().ok())
        .map(|value| value.trim_end_matches(['\0', ' ']).to_string())
        .filter(|value| !value.is_empty())
}

fn multi_f64(object: &InMemDicomObject, tag: Tag, name: &'static str, count: usize) -> Result<Vec<f64>, DicomBridgeError> {
    let values = element(object, tag, name)?
        .to_multi_float64()
        .map_err(|err| invalid(name, err))?;
    if values.len() != count {
        return Err(invalid(name, format!("expected {} values, found {}", count, values.len())));
    }
    Ok(values)
}

fn read_u16(object: &InMemDicomObject, tag: Tag, name: &'static str) -> Result<u16, DicomBridgeError> {
    element(object, tag, name)?
        .to_int::<u16>()
        .map_err(|err| invalid(name, err))
}

fn native_transfer_syntax(object: &FileDicomObject<InMemDicomObject>) -> Result<(), DicomBridgeError> {
    let transfer_syntax = object.meta().transfer_syntax().trim_end_matches('\0');
    if transfer_syntax == uids::EXPLICIT_VR_LITTLE_ENDIAN || transfer_syntax == uids::IMPLICIT_VR_LITTLE_ENDIAN {
        Ok(())
    } else {
        Err(DicomBridgeError::UnsupportedPixelData(format!(
            "transfer syntax {} is not native little endian",
            transfer_syntax
        )))
    }
}

impl SliceInfo {
    fn extract(object: &FileDicomObject<InMemDicomObject>) -> Result<Self, DicomBridgeError> {
        native_transfer_syntax(object)?;

        if let Ok(orientation) = object.element(tags::IMAGE_ORIENTATION_PATIENT) {
            let orientation = orientation
                .to_multi_float64()
                .map_err(|err| invalid("ImageOrientationPatient", err))?;
            let axial = orientation.len() == 6
                && orientation
                    .iter()
                    .zip(AXIAL)
                    .all(|(value, expected)| (value - expected).abs() < POSITION_TOLERANCE);
            if !axial {
                return Err(DicomBridgeError::UnsupportedGeometry(format!(
                    "only axial images are supported, orientation is {:?}",
                    orientation
                )));
            }
        }

        let samples = object
            .element(tags::SAMPLES_PER_PIXEL)
            .ok()
            .and_then(|element| element.to_int::<u16>().ok())
            .unwrap_or(1);
        if samples != 1 {
            return Err(DicomBridgeError::UnsupportedPixelData(format!(
                "{} samples per pixel",
                samples
            )));
        }
        let frames = object
            .element(tags::NUMBER_OF_FRAMES)
            .ok()
            .and_then(|element| element.to_int::<i32>().ok())
            .unwrap_or(1);
        if frames != 1 {
            return Err(DicomBridgeError::UnsupportedPixelData(format!("{} frames", frames)));
        }

        let rows = read_u16(object, tags::ROWS, "Rows")? as usize;
        let columns = read_u16(object, tags::COLUMNS, "Columns")? as usize;
        let spacing = multi_f64(object, tags::PIXEL_SPACING, "PixelSpacing", 2)?;
        let position = multi_f64(object, tags::IMAGE_POSITION_PATIENT, "ImagePositionPatient", 3)?;
        let bits_allocated = read_u16(object, tags::BITS_ALLOCATED, "BitsAllocated")?;
        if !matches!(bits_allocated, 8 | 16 | 32) {
            return Err(DicomBridgeError::UnsupportedPixelData(format!(
                "{} bits allocated",
                bits_allocated
            )));
        }
        let bits_stored = match object.element(tags::BITS_STORED) {
            Ok(_) => read_u16(object, tags::BITS_STORED, "BitsStored")?,
            Err(_) => bits_allocated,
        };
        if bits_stored == 0 || bits_stored > bits_allocated {
            return Err(invalid(
                "BitsStored",
                format!("{} with {} bits allocated", bits_stored, bits_allocated),
            ));
        }
        let high_bit = match object.element(tags::HIGH_BIT) {
            Ok(_) => read_u16(object, tags::HIGH_BIT, "HighBit")?,
            Err(_) => bits_stored - 1,
        };
        if high_bit < bits_stored - 1 || high_bit >= bits_allocated {
            return Err(invalid(
                "HighBit",
                format!("{} with {} of {} bits stored", high_bit, bits_stored, bits_allocated),
            ));
        }
        let signed = read_u16(object, tags::PIXEL_REPRESENTATION, "PixelRepresentation")? == 1;

        let element_type = if optional_str(object, PRIVATE_CREATOR).as_deref() == Some(PRIVATE_CREATOR_NAME) {
            optional_str(object, ELEMENT_TYPE).and_then(|name| match name.parse::<DataType>() {
                Ok(data_type) => Some(data_type),
                Err(_) => {
                    log::warn!("ignoring unknown element type '{}'", name);
                    None
                }
            })
        } else {
            None
        };

        let pixels = element(object, tags::PIXEL_DATA, "PixelData")?
            .to_bytes()
            .map_err(|err| DicomBridgeError::UnsupportedPixelData(err.to_string()))?
            .to_vec();
        let expected = rows * columns * (bits_allocated as usize / 8);
        if pixels.len() < expected {
            return Err(DicomBridgeError::UnsupportedPixelData(format!(
                "pixel data holds {} bytes, {}x{} at {} bits needs {}",
                pixels.len(),
                columns,
                rows,
                bits_allocated,
                expected
            )));
        }

        Ok(Self {
            instance_number: object
                .element(tags::INSTANCE_NUMBER)
                .ok()
                .and_then(|element| element.to_int::<i32>().ok()),
            rows,
            columns,
            pixel_spacing: (spacing[1], spacing[0]),
            position: [position[0], position[1], position[2]],
            slice_thickness: optional_f64(object, tags::SLICE_THICKNESS, "SliceThickness")?,
            spacing_between_slices: optional_f64(object, tags::SPACING_BETWEEN_SLICES, "SpacingBetweenSlices")?,
            slope: optional_f64(object, tags::RESCALE_SLOPE, "RescaleSlope")?.unwrap_or(1.0),
            intercept: optional_f64(object, tags::RESCALE_INTERCEPT, "RescaleIntercept")?.unwrap_or(0.0),
            bits_allocated,
            bits_stored,
            high_bit,
            signed,
            element_type,
            pixels,
        })
    }

    fn stored_type(&self) -> DataType {
        match (self.bits_allocated, self.signed) {
            (8, true) => DataType::Int8,
            (8, false) => DataType::UInt8,
            (16, true) => DataType::Int16,
            (16, false) => DataType::UInt16,
            (_, true) => DataType::Int32,
            (_, false) => DataType::UInt32,
        }
    }

    /// Stored values widened to f64.
    ///
    /// Each pixel is read as a little endian word of `bits_allocated`, the
    /// `bits_stored` bits ending at `high_bit` are kept and sign extended
    /// for signed data; the remaining bits are ignored.
    fn stored_values(&self) -> Vec<f64> {
        let count = self.rows * self.columns;
        let width = self.bits_allocated as usize / 8;
        let shift = u32::from(self.high_bit + 1 - self.bits_stored);
        let bits = u32::from(self.bits_stored);
        let mask = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
        let signed = self.signed;

        self.pixels[..count * width]
            .chunks_exact(width)
            .map(|chunk| {
                let mut word = [0u8; 4];
                word[..width].copy_from_slice(chunk);
                let value = (u32::from_le_bytes(word) >> shift) & mask;
                if signed {
                    // move the sign bit to bit 31, then shift back arithmetically
                    (((value << (32 - bits)) as i32) >> (32 - bits)) as f64
                } else {
                    value as f64
                }
            })
            .collect()
    }
}

impl DicomBridge {
    /// Assemble a cube from the images of one DICOM series.
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Images in acquisition order, several series allowed
    ///   when `options.series_uid` selects one
    /// * `options` - Series selection, target type and lookup table
    ///
    /// # Errors
    ///
    /// Returns [`DicomBridgeError::InconsistentSeries`] if the images do not
    /// share one series, size, spacing and in-plane position, and
    /// [`DicomBridgeError::IncompleteSeries`] if a slice is missing.
    pub fn import(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        options: &ImportOptions<'_>,
    ) -> Result<ImportedVolume, DicomBridgeError> {
        if dicom_objects.is_empty() {
            return Err(DicomBridgeError::NoValidImages);
        }

        let selected = Self::select_series(dicom_objects, options.series_uid.as_deref())?;
        let mut slices = selected
            .iter()
            .map(|object| SliceInfo::extract(object))
            .collect::<Result<Vec<_>, _>>()?;

        Self::validate_slices(&slices)?;
        Self::order_slices(&mut slices)?;
        let expected = Self::check_gaps(&slices)?;

        let first = &slices[0];
        let (rows, columns) = (first.rows, first.columns);
        let positions: Vec<f64> = slices.iter().map(|slice| slice.position[2]).collect();
        let frame = CoordinateFrame::from_slice_positions(
            (first.position[0], first.position[1]),
            first.pixel_spacing,
            (columns, rows),
            positions,
        )?;

        let lookup = options.lookup;
        let values: Vec<f64> = slices
            .par_iter()
            .flat_map_iter(|slice| {
                slice.stored_values().into_iter().map(move |stored| {
                    let value = stored * slice.slope + slice.intercept;
                    lookup.map_or(value, |table| table.apply(value))
                })
            })
            .collect();
        let target_type = options
            .target_type
            .unwrap_or_else(|| Self::infer_type(&slices, lookup.is_some(), &values));
        let array = Array3::from_shape_vec((slices.len(), rows, columns), values)
            .map_err(|err| CubeError::Format(err.to_string()))?;

        let frame = if slices.len() == 1 && expected > 0.0 {
            frame.with_slice_distance(expected)?
        } else {
            frame
        };

        let (cube, clamped) = VoxelCube::new(array, frame.clone())?.cast(target_type, 1.0, 0.0);
        let cube = cube.with_metadata(Self::metadata(&selected[0]));

        log::info!(
            "imported {} slices of {}x{} as {} (nominal spacing {} mm, {} clamped)",
            slices.len(),
            columns,
            rows,
            target_type,
            expected,
            clamped
        );

        Ok(ImportedVolume { cube, frame, clamped })
    }

    /// Import from file paths
    pub fn import_files(
        paths: &[impl AsRef<Path>],
        options: &ImportOptions<'_>,
    ) -> Result<ImportedVolume, DicomBridgeError> {
        let objects: Result<Vec<_>, _> = paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::import(&objects?, options)
    }

    /// Import every .dcm file of a directory
    pub fn import_directory(
        path: impl AsRef<Path>,
        options: &ImportOptions<'_>,
    ) -> Result<ImportedVolume, DicomBridgeError> {
        let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(DicomBridgeError::NoValidImages);
        }
        // directory order is arbitrary, keep runs reproducible
        paths.sort();

        Self::import_files(&paths, options)
    }

    /// Distinct SeriesInstanceUIDs in order of first appearance.
    pub fn series_uids(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Vec<String> {
        let mut uids = Vec::new();
        for object in dicom_objects {
            let uid = optional_str(object, tags::SERIES_INSTANCE_UID).unwrap_or_default();
            if !uids.contains(&uid) {
                uids.push(uid);
            }
        }
        uids
    }

    fn select_series<'a>(
        dicom_objects: &'a [FileDicomObject<InMemDicomObject>],
        series_uid: Option<&str>,
    ) -> Result<Vec<&'a FileDicomObject<InMemDicomObject>>, DicomBridgeError> {
        let uids = Self::series_uids(dicom_objects);
        let wanted = match series_uid {
            Some(uid) => uid.to_string(),
            None if uids.len() == 1 => uids[0].clone(),
            None => {
                return Err(DicomBridgeError::InconsistentSeries(format!(
                    "{} series present ({}), select one",
                    uids.len(),
                    uids.join(", ")
                )));
            }
        };

        let selected: Vec<_> = dicom_objects
            .iter()
            .filter(|object| optional_str(object, tags::SERIES_INSTANCE_UID).unwrap_or_default() == wanted)
            .collect();
        if selected.is_empty() {
            return Err(DicomBridgeError::NoValidImages);
        }
        Ok(selected)
    }

    fn validate_slices(slices: &[SliceInfo]) -> Result<(), DicomBridgeError> {
        let first = &slices[0];
        let close = |a: f64, b: f64| (a - b).abs() <= POSITION_TOLERANCE;
        for (index, slice) in slices.iter().enumerate().skip(1) {
            let mismatch = if (slice.rows, slice.columns) != (first.rows, first.columns) {
                Some(format!(
                    "{}x{} instead of {}x{}",
                    slice.columns, slice.rows, first.columns, first.rows
                ))
            } else if !close(slice.pixel_spacing.0, first.pixel_spacing.0)
                || !close(slice.pixel_spacing.1, first.pixel_spacing.1)
            {
                Some(format!(
                    "pixel spacing {:?} instead of {:?}",
                    slice.pixel_spacing, first.pixel_spacing
                ))
            } else if !close(slice.position[0], first.position[0]) || !close(slice.position[1], first.position[1]) {
                Some(format!(
                    "in-plane position ({}, {}) instead of ({}, {})",
                    slice.position[0], slice.position[1], first.position[0], first.position[1]
                ))
            } else if (slice.bits_allocated, slice.bits_stored, slice.high_bit, slice.signed)
                != (first.bits_allocated, first.bits_stored, first.high_bit, first.signed)
            {
                Some("pixel representation differs".to_string())
            } else {
                None
            };
            if let Some(reason) = mismatch {
                return Err(DicomBridgeError::InconsistentSeries(format!("image {}: {}", index, reason)));
            }
        }
        Ok(())
    }

    /// Acquisition order by InstanceNumber when every image has one, then
    /// sorted by z in the direction that order implies.
    fn order_slices(slices: &mut Vec<SliceInfo>) -> Result<(), DicomBridgeError> {
        if slices.iter().all(|slice| slice.instance_number.is_some()) {
            slices.sort_by_key(|slice| slice.instance_number);
        }
        let positions: Vec<f64> = slices.iter().map(|slice| slice.position[2]).collect();
        let (order, slice_order) = CoordinateFrame::sort_order(&positions)?;
        log::debug!("slice order {:?}", slice_order);

        let mut taken: Vec<Option<SliceInfo>> = slices.drain(..).map(Some).collect();
        for index in order {
            if let Some(slice) = taken[index].take() {
                slices.push(slice);
            }
        }
        Ok(())
    }

    /// Nominal spacing used for gap detection: SpacingBetweenSlices, else the
    /// smallest gap. SliceThickness is the slab width and never sets the
    /// spacing; a single slice falls back to it for its nominal distance.
    fn check_gaps(slices: &[SliceInfo]) -> Result<f64, DicomBridgeError> {
        let gaps: Vec<f64> = slices
            .windows(2)
            .map(|pair| (pair[1].position[2] - pair[0].position[2]).abs())
            .collect();
        let first = &slices[0];
        let spacing = first.spacing_between_slices.filter(|spacing| *spacing > 0.0);
        let thickness = first.slice_thickness.filter(|thickness| *thickness > 0.0);
        let min_gap = gaps.iter().copied().fold(f64::INFINITY, f64::min);
        let expected = spacing.unwrap_or(min_gap);
        if !expected.is_finite() {
            return Ok(spacing.or(thickness).unwrap_or(0.0));
        }

        if let Some(thickness) = thickness {
            if thickness > expected + POSITION_TOLERANCE {
                log::warn!(
                    "slice thickness {} mm exceeds spacing {} mm, slices overlap",
                    thickness,
                    expected
                );
            } else if thickness < expected - POSITION_TOLERANCE {
                log::warn!("slice thickness {} mm differs from spacing {} mm", thickness, expected);
            }
        }

        for (index, gap) in gaps.iter().enumerate() {
            if *gap > expected * GAP_FACTOR {
                return Err(DicomBridgeError::IncompleteSeries {
                    position: slices[index].position[2],
                    gap: *gap,
                    expected,
                });
            }
        }
        Ok(expected)
    }

    /// The element type recorded at export, else the stored type for identity
    /// rescale, the smallest signed integer type holding every value for
    /// integral rescale, `f32` otherwise.
    fn infer_type(slices: &[SliceInfo], has_lookup: bool, values: &[f64]) -> DataType {
        if has_lookup {
            return DataType::Float32;
        }
        if let Some(data_type) = slices[0].element_type {
            return data_type;
        }
        let identity = slices.iter().all(|slice| slice.slope == 1.0 && slice.intercept == 0.0);
        if identity {
            return slices[0].stored_type();
        }
        let integral = slices
            .iter()
            .all(|slice| slice.slope.fract() == 0.0 && slice.intercept.fract() == 0.0);
        if !integral {
            return DataType::Float32;
        }

        let (min, max) = values
            .par_iter()
            .fold(
                || (f64::INFINITY, f64::NEG_INFINITY),
                |(min, max), &v| (min.min(v), max.max(v)),
            )
            .reduce(
                || (f64::INFINITY, f64::NEG_INFINITY),
                |a, b| (a.0.min(b.0), a.1.max(b.1)),
            );
        if min >= i16::MIN as f64 && max <= i16::MAX as f64 {
            DataType::Int16
        } else if min >= i32::MIN as f64 && max <= i32::MAX as f64 {
            DataType::Int32
        } else {
            DataType::Float64
        }
    }

    fn metadata(object: &InMemDicomObject) -> Metadata {
        let mut metadata = Metadata::new();
        for (key, tag) in [
            (metadata::MODALITY, tags::MODALITY),
            (metadata::PATIENT_NAME, tags::PATIENT_NAME),
            (metadata::PATIENT_ID, tags::PATIENT_ID),
            (metadata::COMMENT, tags::SERIES_DESCRIPTION),
        ] {
            if let Some(value) = optional_str(object, tag) {
                metadata.set(key, value);
            }
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(bits_allocated: u16, bits_stored: u16, high_bit: u16, signed: bool, words: &[u32]) -> SliceInfo {
        let width = bits_allocated as usize / 8;
        let pixels = words
            .iter()
            .flat_map(|word| word.to_le_bytes()[..width].to_vec())
            .collect();
        SliceInfo {
            instance_number: None,
            rows: 1,
            columns: words.len(),
            pixel_spacing: (1.0, 1.0),
            position: [0.0, 0.0, 0.0],
            slice_thickness: None,
            spacing_between_slices: None,
            slope: 1.0,
            intercept: 0.0,
            bits_allocated,
            bits_stored,
            high_bit,
            signed,
            element_type: None,
            pixels,
        }
    }

    #[test]
    fn test_twelve_bit_signed_values_are_sign_extended() {
        let info = slice(16, 12, 11, true, &[0x0FFF, 0xF001, 0x07FF, 0x0800]);
        assert_eq!(info.stored_values(), vec![-1.0, 1.0, 2047.0, -2048.0]);
    }

    #[test]
    fn test_unused_high_bits_are_ignored() {
        let info = slice(16, 12, 11, false, &[0xF123, 0x0FFF]);
        assert_eq!(info.stored_values(), vec![291.0, 4095.0]);
    }

    #[test]
    fn test_stored_bits_below_high_bit() {
        // 10 bits stored in bits 2..=11
        let info = slice(16, 10, 11, false, &[0b0000_1111_1111_1111, 0b1000_0000_0000_0111]);
        assert_eq!(info.stored_values(), vec![1023.0, 1.0]);
    }

    #[test]
    fn test_full_width_words() {
        let wide = slice(32, 32, 31, true, &[u32::MAX, 7]);
        assert_eq!(wide.stored_values(), vec![-1.0, 7.0]);
        let narrow = slice(8, 8, 7, true, &[0x80, 0x7F]);
        assert_eq!(narrow.stored_values(), vec![-128.0, 127.0]);
    }

    #[test]
    fn test_gap_spacing_ignores_slice_thickness() {
        let mut slices: Vec<SliceInfo> = [0.0, 2.0, 4.0]
            .iter()
            .map(|&z| {
                let mut info = slice(16, 16, 15, true, &[0]);
                info.position[2] = z;
                info.slice_thickness = Some(1.0);
                info
            })
            .collect();
        assert_eq!(DicomBridge::check_gaps(&slices).unwrap(), 2.0);

        slices[2].position[2] = 8.0;
        assert!(matches!(
            DicomBridge::check_gaps(&slices),
            Err(DicomBridgeError::IncompleteSeries { expected, .. }) if expected == 2.0
        ));
    }
}
