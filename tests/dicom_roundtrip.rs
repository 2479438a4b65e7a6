//! Cube to DICOM series and back.

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileDicomObject, InMemDicomObject};
use dicom_dictionary_std::tags;
use ndarray::Array3;
use trip_volume::{
    CoordinateFrame, DataType, DicomBridge, DicomBridgeError, ExportMetadata, ImportOptions, LookupTable,
    Metadata, SliceOrder, VoxelCube, metadata,
};

fn ct_cube(positions: Vec<f64>) -> VoxelCube {
    let nz = positions.len();
    let frame = CoordinateFrame::from_slice_positions((-10.5, 20.0), (1.5, 0.75), (4, 3), positions)
        .expect("valid frame");
    let values: Vec<i16> = (0..(4 * 3 * nz) as i16).map(|v| v * 7 - 1000).collect();
    let array = Array3::from_shape_vec((nz, 3, 4), values).expect("matching shape");
    VoxelCube::new(array, frame)
        .expect("matching frame")
        .with_metadata(Metadata::new().with(metadata::MODALITY, "CT"))
}

fn assert_close(expected: &VoxelCube, actual: &VoxelCube, tolerance: f64) {
    let (nx, ny, nz) = expected.dimensions();
    assert_eq!(actual.dimensions(), (nx, ny, nz));
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let (a, b) = (expected.get(i, j, k).unwrap(), actual.get(i, j, k).unwrap());
                assert!((a - b).abs() <= tolerance, "voxel ({}, {}, {}): {} vs {}", i, j, k, a, b);
            }
        }
    }
}

fn export(cube: &VoxelCube, metadata: &ExportMetadata) -> Vec<FileDicomObject<InMemDicomObject>> {
    DicomBridge::export(cube, cube.frame(), metadata).expect("export should succeed")
}

#[test]
fn test_integer_round_trip() {
    let cube = ct_cube(vec![0.0, 2.5, 5.0, 7.5]);
    let objects = export(&cube, &ExportMetadata::from_cube(&cube));
    assert_eq!(objects.len(), 4);

    let imported = DicomBridge::import(&objects, &ImportOptions::default()).unwrap();
    assert_eq!(imported.clamped, 0);
    assert_eq!(imported.cube.data_type(), DataType::Int16);
    assert_eq!(imported.cube.data(), cube.data());
    assert_eq!(&imported.frame, cube.frame());
    assert_eq!(imported.cube.metadata().modality(), Some("CT"));
}

#[test]
fn test_descending_series_keeps_direction() {
    let cube = ct_cube(vec![10.0, 8.0, 6.0]);
    let mut objects = export(&cube, &ExportMetadata::default());
    objects.swap(0, 2);
    objects.swap(1, 2);

    let imported = DicomBridge::import(&objects, &ImportOptions::default()).unwrap();
    assert_eq!(imported.frame.slice_positions(), &[10.0, 8.0, 6.0]);
    assert_eq!(imported.frame.slice_order(), SliceOrder::Descending);
    assert_eq!(imported.cube.data(), cube.data());
}

#[test]
fn test_float_cube_within_slope() {
    let frame = CoordinateFrame::uniform((0.0, 0.0, 0.0), (2.0, 2.0, 3.0), (3, 2, 2)).unwrap();
    let values: Vec<f32> = (0..12).map(|v| v as f32 * 0.137 - 0.5).collect();
    let array = Array3::from_shape_vec((2, 2, 3), values).unwrap();
    let cube = VoxelCube::new(array, frame)
        .unwrap()
        .with_metadata(Metadata::new().with(metadata::MODALITY, "DOS"));

    let objects = export(&cube, &ExportMetadata::from_cube(&cube));
    let modality = objects[0].element(tags::MODALITY).unwrap().to_str().unwrap().to_string();
    assert_eq!(modality.trim_end(), "RTDOSE");

    let options = ImportOptions {
        target_type: Some(DataType::Float32),
        ..ImportOptions::default()
    };
    let imported = DicomBridge::import(&objects, &options).unwrap();
    assert_eq!(imported.cube.data_type(), DataType::Float32);
    let original = cube.array::<f32>().unwrap();
    let restored = imported.cube.array::<f32>().unwrap();
    for (a, b) in original.iter().zip(restored.iter()) {
        assert!((a - b).abs() < 1e-5, "{} vs {}", a, b);
    }
}

#[test]
fn test_lookup_applied_after_rescale() {
    let cube = ct_cube(vec![0.0, 1.0]);
    let objects = export(&cube, &ExportMetadata::default());
    let lookup = LookupTable::new(vec![(-1000.0, 0.0), (0.0, 1.0)]).unwrap();
    let options = ImportOptions {
        lookup: Some(&lookup),
        ..ImportOptions::default()
    };

    let imported = DicomBridge::import(&objects, &options).unwrap();
    assert_eq!(imported.cube.data_type(), DataType::Float32);
    assert_eq!(imported.cube.get(0, 0, 0), Some(0.0));
    let second = imported.cube.get(1, 0, 0).unwrap();
    assert!((second - 0.007).abs() < 1e-6, "{}", second);
}

#[test]
fn test_missing_slice() {
    let cube = ct_cube(vec![0.0, 2.0, 4.0, 6.0]);
    let mut objects = export(&cube, &ExportMetadata::default());
    objects.remove(1);

    match DicomBridge::import(&objects, &ImportOptions::default()) {
        Err(DicomBridgeError::IncompleteSeries { position, gap, .. }) => {
            assert_eq!(position, 0.0);
            assert_eq!(gap, 4.0);
        }
        other => panic!("expected incomplete series, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_row_count_mismatch() {
    let cube = ct_cube(vec![0.0, 1.0, 2.0]);
    let mut objects = export(&cube, &ExportMetadata::default());
    objects[1].put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(2u16)));

    assert!(matches!(
        DicomBridge::import(&objects, &ImportOptions::default()),
        Err(DicomBridgeError::InconsistentSeries(_))
    ));
}

#[test]
fn test_mixed_series() {
    let cube = ct_cube(vec![0.0, 1.0]);
    let first = ExportMetadata {
        series_uid: Some("1.2.826.0.1.1".to_string()),
        ..ExportMetadata::default()
    };
    let second = ExportMetadata {
        series_uid: Some("1.2.826.0.1.2".to_string()),
        ..ExportMetadata::default()
    };
    let mut objects = export(&cube, &first);
    objects.extend(export(&cube, &second));

    assert_eq!(DicomBridge::series_uids(&objects).len(), 2);
    assert!(matches!(
        DicomBridge::import(&objects, &ImportOptions::default()),
        Err(DicomBridgeError::InconsistentSeries(_))
    ));

    let options = ImportOptions {
        series_uid: Some("1.2.826.0.1.2".to_string()),
        ..ImportOptions::default()
    };
    let imported = DicomBridge::import(&objects, &options).unwrap();
    assert_eq!(imported.cube.dimensions(), (4, 3, 2));
}

#[test]
fn test_empty_input() {
    assert!(matches!(
        DicomBridge::import(&[], &ImportOptions::default()),
        Err(DicomBridgeError::NoValidImages)
    ));
}

#[test]
fn test_passthrough_and_directory_round_trip() {
    let cube = ct_cube(vec![-3.0, 0.0, 3.0]);
    let mut metadata = ExportMetadata::from_cube(&cube);
    metadata.patient_name = Some("Phantom^Water".to_string());
    metadata
        .passthrough
        .push(DataElement::new(tags::INSTITUTION_NAME, VR::LO, PrimitiveValue::from("GSI")));

    let dir = tempfile::tempdir().unwrap();
    let paths = DicomBridge::export_to_directory(&cube, cube.frame(), &metadata, dir.path()).unwrap();
    assert_eq!(paths.len(), 3);
    assert!(paths[0].ends_with("CT_0001.dcm"));

    let object = dicom::object::open_file(&paths[0]).unwrap();
    let institution = object.element(tags::INSTITUTION_NAME).unwrap().to_str().unwrap().to_string();
    assert_eq!(institution.trim_end(), "GSI");

    let imported = DicomBridge::import_directory(dir.path(), &ImportOptions::default()).unwrap();
    assert_eq!(imported.cube.data(), cube.data());
    assert_eq!(imported.frame.slice_positions(), &[-3.0, 0.0, 3.0]);
    assert_eq!(imported.cube.metadata().patient_name(), Some("Phantom^Water"));
}

#[test]
fn test_export_rejects_foreign_frame() {
    let cube = ct_cube(vec![0.0, 1.0]);
    let frame = CoordinateFrame::uniform((0.0, 0.0, 0.0), (1.0, 1.0, 1.0), (2, 2, 2)).unwrap();
    assert!(matches!(
        DicomBridge::export(&cube, &frame, &ExportMetadata::default()),
        Err(DicomBridgeError::Cube(_))
    ));
}

#[test]
fn test_every_element_type_survives_round_trip() {
    let base = ct_cube(vec![0.0, 2.0, 4.0]);
    let integers = [
        DataType::Int8,
        DataType::UInt8,
        DataType::Int16,
        DataType::UInt16,
        DataType::Int32,
        DataType::UInt32,
    ];
    for data_type in integers {
        // 0..=123 fits every integer type
        let (cube, clamped) = base.cast(data_type, 0.5, 500.0);
        assert_eq!(clamped, 0);
        let imported = DicomBridge::import(&export(&cube, &ExportMetadata::default()), &ImportOptions::default())
            .unwrap();
        assert_eq!(imported.cube.data_type(), data_type);
        assert_eq!(imported.cube.data(), cube.data());
    }

    for data_type in [DataType::Float32, DataType::Float64] {
        let (cube, _) = base.cast(data_type, 0.005, 4.0);
        let imported = DicomBridge::import(&export(&cube, &ExportMetadata::default()), &ImportOptions::default())
            .unwrap();
        assert_eq!(imported.cube.data_type(), data_type);
        assert_close(&cube, &imported.cube, 1e-5);
    }
}

#[test]
fn test_constant_float_cube_stays_float() {
    let frame = CoordinateFrame::uniform((0.0, 0.0, 0.0), (1.0, 1.0, 2.0), (2, 2, 2)).unwrap();
    let cube = VoxelCube::filled(DataType::Float64, frame, 2.5);

    let imported = DicomBridge::import(&export(&cube, &ExportMetadata::default()), &ImportOptions::default())
        .unwrap();
    assert_eq!(imported.cube.data_type(), DataType::Float64);
    assert_eq!(imported.cube.data(), cube.data());
}

#[test]
fn test_slice_thickness_below_spacing_is_not_a_gap() {
    let cube = ct_cube(vec![0.0, 2.0, 4.0]);
    let mut objects = export(&cube, &ExportMetadata::default());
    for object in &mut objects {
        object.remove_element(tags::SPACING_BETWEEN_SLICES);
        object.put(DataElement::new(tags::SLICE_THICKNESS, VR::DS, PrimitiveValue::from("1")));
    }

    let imported = DicomBridge::import(&objects, &ImportOptions::default()).unwrap();
    assert_eq!(imported.frame.slice_positions(), &[0.0, 2.0, 4.0]);
    assert_eq!(imported.cube.data(), cube.data());
}

#[test]
fn test_single_slice_keeps_thickness() {
    let frame = CoordinateFrame::from_slice_positions((-10.5, 20.0), (1.5, 0.75), (4, 3), vec![12.0])
        .unwrap()
        .with_slice_distance(3.0)
        .unwrap();
    let cube = VoxelCube::filled(DataType::Int16, frame, 40.0);

    let objects = export(&cube, &ExportMetadata::default());
    let thickness = objects[0].element(tags::SLICE_THICKNESS).unwrap().to_float64().unwrap();
    assert_eq!(thickness, 3.0);

    let imported = DicomBridge::import(&objects, &ImportOptions::default()).unwrap();
    assert_eq!(imported.frame.voxel_size(), (1.5, 0.75, 3.0));
    assert_eq!(imported.frame.slice_positions(), &[12.0]);
    assert_eq!(imported.cube.data(), cube.data());
}
