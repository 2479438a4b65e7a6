//! Cube to DICOM image series.
//!
//! Integer cubes are stored verbatim with slope 1 and intercept 0, in pixels of
//! their own width. Float cubes are quantized per slice into 32-bit unsigned
//! pixels; the rescale values are rounded to their DS text before quantizing,
//! so readers reproduce the cube to within one slope step. The cube's element
//! type goes into a private tag so [`DicomBridge::import`] restores it.

use crate::data_type::DataType;
use crate::dicom_bridge::{AXIAL, DicomBridge, DicomBridgeError, ELEMENT_TYPE, PRIVATE_CREATOR, PRIVATE_CREATOR_NAME};
use crate::frame::CoordinateFrame;
use crate::metadata;
use crate::resource::write_atomic;
use crate::volume::{CubeError, VoxelCube};

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject, mem::InMemElement};
use dicom_dictionary_std::{tags, uids};
use ndarray::Array2;
use std::{
    fs,
    path::{Path, PathBuf},
};
use uuid::Uuid;

/// Identifiers written into every exported slice.
#[derive(Debug, Clone, Default)]
pub struct ExportMetadata {
    pub modality: Option<String>,
    pub series_description: Option<String>,
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub study_uid: Option<String>,
    pub series_uid: Option<String>,
    pub frame_of_reference_uid: Option<String>,
    /// Copied into each slice before the geometry tags, without inspection.
    pub passthrough: Vec<InMemElement>,
}

impl ExportMetadata {
    /// Identifiers taken from the cube's creation metadata.
    pub fn from_cube(cube: &VoxelCube) -> Self {
        let metadata = cube.metadata();
        let owned = |value: Option<&str>| value.map(str::to_string);
        Self {
            modality: owned(metadata.modality()).map(|modality| dicom_modality(&modality).to_string()),
            series_description: owned(metadata.comment()),
            patient_name: owned(metadata.patient_name()),
            patient_id: owned(metadata.patient_id()),
            ..Self::default()
        }
    }
}

fn dicom_modality(modality: &str) -> &str {
    match modality.to_ascii_uppercase().as_str() {
        "DOS" | "DOSE" => "RTDOSE",
        _ => modality,
    }
}

/// New UID under the `2.25` UUID root.
pub fn generate_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}

/// Decimal string of at most 16 characters.
fn format_ds(value: f64) -> String {
    let plain = format!("{}", value);
    if plain.len() <= 16 {
        return plain;
    }
    (0..=12)
        .rev()
        .map(|precision| format!("{:.*e}", precision, value))
        .find(|text| text.len() <= 16)
        .unwrap_or_else(|| format!("{:e}", value))
}

fn parse_ds(text: &str) -> Result<f64, DicomBridgeError> {
    text.parse()
        .map_err(|_| DicomBridgeError::Write(format!("cannot encode '{}' as decimal string", text)))
}

/// Pixel payload and rescale of one slice.
struct EncodedSlice {
    bits: u16,
    signed: bool,
    slope: String,
    intercept: String,
    bytes: Vec<u8>,
}

impl EncodedSlice {
    fn integer(values: &Array2<f64>, data_type: DataType) -> Self {
        let (bits, signed) = match data_type {
            DataType::Int8 => (8, true),
            DataType::UInt8 => (8, false),
            DataType::Int16 => (16, true),
            DataType::UInt16 => (16, false),
            DataType::Int32 => (32, true),
            _ => (32, false),
        };
        let mut bytes = Vec::with_capacity(values.len() * bits as usize / 8 + 1);
        for &value in values.iter() {
            match (bits, signed) {
                (8, true) => bytes.push(value as i8 as u8),
                (8, false) => bytes.push(value as u8),
                (16, true) => bytes.extend_from_slice(&(value as i16).to_le_bytes()),
                (16, false) => bytes.extend_from_slice(&(value as u16).to_le_bytes()),
                (_, true) => bytes.extend_from_slice(&(value as i32).to_le_bytes()),
                (_, false) => bytes.extend_from_slice(&(value as u32).to_le_bytes()),
            }
        }
        // values have even length
        if bytes.len() % 2 == 1 {
            bytes.push(0);
        }
        Self {
            bits,
            signed,
            slope: "1".to_string(),
            intercept: "0".to_string(),
            bytes,
        }
    }

    fn float(values: &Array2<f64>, index: usize) -> Result<Self, DicomBridgeError> {
        let (min, max) = values
            .iter()
            .filter(|value| value.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &v| (min.min(v), max.max(v)));
        let (min, max) = if min.is_finite() { (min, max) } else { (0.0, 0.0) };

        let intercept_text = format_ds(min);
        let slope_text = if max > min {
            format_ds((max - min) / u32::MAX as f64)
        } else {
            "1".to_string()
        };
        let intercept = parse_ds(&intercept_text)?;
        let slope = parse_ds(&slope_text)?;

        let mut non_finite = 0usize;
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for &value in values.iter() {
            let stored = if value.is_finite() {
                ((value - intercept) / slope).round().clamp(0.0, u32::MAX as f64) as u32
            } else {
                non_finite += 1;
                0
            };
            bytes.extend_from_slice(&stored.to_le_bytes());
        }
        if non_finite > 0 {
            log::warn!("slice {}: {} non-finite voxels stored as {}", index, non_finite, intercept_text);
        }

        Ok(Self {
            bits: 32,
            signed: false,
            slope: slope_text,
            intercept: intercept_text,
            bytes,
        })
    }
}

fn put_str(object: &mut InMemDicomObject, tag: Tag, vr: VR, value: impl Into<String>) {
    object.put(DataElement::new(tag, vr, PrimitiveValue::from(value.into())));
}

fn put_ds_multi(object: &mut InMemDicomObject, tag: Tag, values: &[f64]) {
    let texts = values.iter().map(|value| format_ds(*value)).collect();
    object.put(DataElement::new(tag, VR::DS, PrimitiveValue::Strs(texts)));
}

fn put_u16(object: &mut InMemDicomObject, tag: Tag, value: u16) {
    object.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

impl DicomBridge {
    /// One DICOM image per cube slice, in `frame.slice_positions()` order.
    ///
    /// # Errors
    ///
    /// Returns [`DicomBridgeError::Cube`] when `frame` does not describe the
    /// cube's grid, and [`DicomBridgeError::Write`] when an object cannot be
    /// assembled.
    pub fn export(
        cube: &VoxelCube,
        frame: &CoordinateFrame,
        metadata: &ExportMetadata,
    ) -> Result<Vec<FileDicomObject<InMemDicomObject>>, DicomBridgeError> {
        let (nx, ny, nz) = frame.dimensions();
        if cube.dimensions() != (nx, ny, nz) {
            return Err(CubeError::ShapeMismatch {
                expected: (nz, ny, nx),
                actual: cube.data().dim(),
            }
            .into());
        }
        let rows = u16::try_from(ny).map_err(|_| DicomBridgeError::Write(format!("{} rows", ny)))?;
        let columns = u16::try_from(nx).map_err(|_| DicomBridgeError::Write(format!("{} columns", nx)))?;

        let modality = metadata
            .modality
            .clone()
            .or_else(|| cube.metadata().get(metadata::MODALITY).map(|m| dicom_modality(m).to_string()))
            .unwrap_or_else(|| "CT".to_string());
        let sop_class = if modality == "RTDOSE" {
            uids::RT_DOSE_STORAGE
        } else {
            uids::CT_IMAGE_STORAGE
        };
        let study_uid = metadata.study_uid.clone().unwrap_or_else(generate_uid);
        let series_uid = metadata.series_uid.clone().unwrap_or_else(generate_uid);
        let frame_of_reference_uid = metadata.frame_of_reference_uid.clone().unwrap_or_else(generate_uid);

        let (dx, dy, dz) = frame.voxel_size();
        let (x0, y0, _) = frame.origin();
        let data_type = cube.data_type();

        let mut objects = Vec::with_capacity(nz);
        for (k, &z) in frame.slice_positions().iter().enumerate() {
            let values = cube.slice(k)?;
            let encoded = if data_type.is_float() {
                EncodedSlice::float(&values, k)?
            } else {
                EncodedSlice::integer(&values, data_type)
            };

            let mut object = InMemDicomObject::new_empty();
            for element in &metadata.passthrough {
                object.put(element.clone());
            }

            let sop_instance_uid = generate_uid();
            put_str(&mut object, tags::SOP_CLASS_UID, VR::UI, sop_class);
            put_str(&mut object, tags::SOP_INSTANCE_UID, VR::UI, sop_instance_uid.as_str());
            put_str(&mut object, tags::STUDY_INSTANCE_UID, VR::UI, study_uid.as_str());
            put_str(&mut object, tags::SERIES_INSTANCE_UID, VR::UI, series_uid.as_str());
            put_str(&mut object, tags::FRAME_OF_REFERENCE_UID, VR::UI, frame_of_reference_uid.as_str());
            put_str(&mut object, tags::MODALITY, VR::CS, modality.as_str());
            if let Some(name) = &metadata.patient_name {
                put_str(&mut object, tags::PATIENT_NAME, VR::PN, name.as_str());
            }
            if let Some(id) = &metadata.patient_id {
                put_str(&mut object, tags::PATIENT_ID, VR::LO, id.as_str());
            }
            if let Some(description) = &metadata.series_description {
                put_str(&mut object, tags::SERIES_DESCRIPTION, VR::LO, description.as_str());
            }
            put_str(&mut object, tags::INSTANCE_NUMBER, VR::IS, (k + 1).to_string());

            put_ds_multi(&mut object, tags::IMAGE_POSITION_PATIENT, &[x0, y0, z]);
            put_ds_multi(&mut object, tags::IMAGE_ORIENTATION_PATIENT, &AXIAL);
            put_ds_multi(&mut object, tags::PIXEL_SPACING, &[dy, dx]);
            put_str(&mut object, tags::SLICE_THICKNESS, VR::DS, format_ds(dz));
            if frame.is_uniform() {
                put_str(&mut object, tags::SPACING_BETWEEN_SLICES, VR::DS, format_ds(dz));
            }
            put_str(&mut object, tags::SLICE_LOCATION, VR::DS, format_ds(z));

            put_u16(&mut object, tags::SAMPLES_PER_PIXEL, 1);
            put_str(&mut object, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2");
            put_u16(&mut object, tags::ROWS, rows);
            put_u16(&mut object, tags::COLUMNS, columns);
            put_u16(&mut object, tags::BITS_ALLOCATED, encoded.bits);
            put_u16(&mut object, tags::BITS_STORED, encoded.bits);
            put_u16(&mut object, tags::HIGH_BIT, encoded.bits - 1);
            put_u16(&mut object, tags::PIXEL_REPRESENTATION, u16::from(encoded.signed));
            put_str(&mut object, tags::RESCALE_INTERCEPT, VR::DS, encoded.intercept);
            put_str(&mut object, tags::RESCALE_SLOPE, VR::DS, encoded.slope);
            put_str(&mut object, PRIVATE_CREATOR, VR::LO, PRIVATE_CREATOR_NAME);
            put_str(&mut object, ELEMENT_TYPE, VR::LO, data_type.type_name());
            let pixel_vr = if encoded.bits == 8 { VR::OB } else { VR::OW };
            object.put(DataElement::new(
                tags::PIXEL_DATA,
                pixel_vr,
                PrimitiveValue::from(encoded.bytes),
            ));

            let file_object = object
                .with_meta(
                    FileMetaTableBuilder::new()
                        .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                        .media_storage_sop_class_uid(sop_class)
                        .media_storage_sop_instance_uid(sop_instance_uid.as_str()),
                )
                .map_err(|err| DicomBridgeError::Write(err.to_string()))?;
            objects.push(file_object);
        }

        log::info!("exported {} {} slices of {}x{}", nz, modality, nx, ny);
        Ok(objects)
    }

    /// Writes one `.dcm` file per slice into `directory`, each atomically.
    pub fn export_to_directory(
        cube: &VoxelCube,
        frame: &CoordinateFrame,
        metadata: &ExportMetadata,
        directory: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>, DicomBridgeError> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;
        let objects = Self::export(cube, frame, metadata)?;

        let prefix = metadata
            .modality
            .clone()
            .or_else(|| cube.metadata().modality().map(str::to_string))
            .unwrap_or_else(|| "CT".to_string());
        let mut paths = Vec::with_capacity(objects.len());
        for (index, object) in objects.iter().enumerate() {
            let mut buffer = Vec::new();
            object
                .write_all(&mut buffer)
                .map_err(|err| DicomBridgeError::Write(err.to_string()))?;
            let path = directory.join(format!("{}_{:04}.dcm", prefix, index + 1));
            write_atomic(&path, &buffer).map_err(|err| DicomBridgeError::Write(err.to_string()))?;
            paths.push(path);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ds_fits() {
        assert_eq!(format_ds(1.0), "1");
        assert_eq!(format_ds(-1024.0), "-1024");
        let small = format_ds(1.0 / 3.0 / u32::MAX as f64);
        assert!(small.len() <= 16, "{}", small);
        assert!((parse_ds(&small).unwrap() - 1.0 / 3.0 / u32::MAX as f64).abs() < 1e-20);
    }

    #[test]
    fn test_generated_uid_shape() {
        let uid = generate_uid();
        assert!(uid.starts_with("2.25."));
        assert!(uid.len() <= 64);
        assert!(uid[5..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_dose_modality() {
        assert_eq!(dicom_modality("dos"), "RTDOSE");
        assert_eq!(dicom_modality("CT"), "CT");
    }

    #[test]
    fn test_eight_bit_slices_keep_their_width() {
        let values = Array2::from_shape_vec((1, 3), vec![-128.0, 0.0, 127.0]).unwrap();
        let encoded = EncodedSlice::integer(&values, DataType::Int8);
        assert_eq!((encoded.bits, encoded.signed), (8, true));
        assert_eq!(encoded.bytes, vec![0x80, 0x00, 0x7F, 0x00]);
    }
}
