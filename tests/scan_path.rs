//! Scan path files on disk.

use trip_volume::{RasterScanPath, ScanLimits, ScanOrder, ScanPathError, ScanRange, Spot};

fn limits() -> ScanLimits {
    ScanLimits::from_toml(
        r#"
[default]
x = [-100.0, 100.0]
y = [-100.0, 100.0]

[[field]]
id = 2
x = [-5.0, 5.0]
y = [-5.0, 5.0]
"#,
    )
    .expect("valid limits")
}

fn three_spots() -> RasterScanPath {
    RasterScanPath::from_spots(vec![
        Spot::new(1, 0.0, 0.0, 100.0, 5000.0, 1),
        Spot::new(1, 1.0, 0.0, 100.0, 5000.0, 1),
        Spot::new(1, 2.0, 0.0, 100.0, 5000.0, 1),
    ])
}

#[test]
fn test_reverse_order_on_disk() {
    let path = three_spots();
    let reversed = path.write(ScanOrder::Reverse, &limits()).unwrap();
    let forward = path.write(ScanOrder::Forward, &limits()).unwrap();

    let read = RasterScanPath::read(&reversed, None).unwrap();
    let xs: Vec<f64> = read.spots().iter().map(|spot| spot.x_mm).collect();
    assert_eq!(xs, vec![2.0, 1.0, 0.0]);
    assert_eq!(read, path.reverse());
    assert_eq!(path.reverse().write(ScanOrder::Forward, &limits()).unwrap(), reversed);
    assert_ne!(forward, reversed);
    assert_eq!(path.spots()[0].x_mm, 0.0);
}

#[test]
fn test_field_filter_keeps_relative_order() {
    let path = RasterScanPath::from_spots(vec![
        Spot::new(1, 0.0, 0.0, 100.0, 1.0, 0),
        Spot::new(2, 1.0, 0.0, 100.0, 2.0, 0),
        Spot::new(1, 2.0, 0.0, 90.0, 3.0, 0),
        Spot::new(2, 3.0, 0.0, 90.0, 4.0, 0),
    ]);
    let bytes = path.write(ScanOrder::Forward, &limits()).unwrap();

    let field_2 = RasterScanPath::read(&bytes, Some(2)).unwrap();
    let weights: Vec<f64> = field_2.spots().iter().map(|spot| spot.weight).collect();
    assert_eq!(weights, vec![2.0, 4.0]);
    assert_eq!(field_2, path.filter_field(2));
    assert!(RasterScanPath::read(&bytes, Some(9)).unwrap().is_empty());
}

#[test]
fn test_invalid_spot_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("field.rst");
    three_spots().write_file(&file, ScanOrder::Forward, &limits()).unwrap();
    let before = std::fs::read(&file).unwrap();

    let mut bad = three_spots();
    bad.append(Spot::new(2, 7.5, 0.0, 100.0, 1.0, 0));
    match bad.write_file(&file, ScanOrder::Reverse, &limits()) {
        Err(ScanPathError::InvalidSpot { index, .. }) => assert_eq!(index, 3),
        other => panic!("expected invalid spot, got {:?}", other),
    }
    assert_eq!(std::fs::read(&file).unwrap(), before);
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plan.rst");
    let path: RasterScanPath = (0..50)
        .map(|i| Spot::new(1 + i % 2, i as f64 * 0.5 - 10.0, 3.0, 120.0 - i as f64, 100.0 + i as f64, i % 3))
        .collect();
    let limits = ScanLimits::uniform(ScanRange::new([-20.0, 20.0], [-20.0, 20.0]));

    path.write_file(&file, ScanOrder::Forward, &limits).unwrap();
    let read = RasterScanPath::read_file(&file, None).unwrap();
    assert_eq!(read, path);
    assert_eq!(read.field_ids(), vec![1, 2]);
    assert_eq!(read.submachines(), vec![0, 1, 2]);
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        RasterScanPath::read_file("/nonexistent/field.rst", None),
        Err(ScanPathError::Io(_))
    ));
}
