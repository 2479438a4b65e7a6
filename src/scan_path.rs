//! Raster scan paths: spots in delivery order.
//!
//! ```text
//! magic "TRIPRST\0"
//! u8  byte order (0 little, 1 big)    u8  reserved
//! u16 version (1)
//! u32 spot count
//! per spot: u32 field id, f64 x, f64 y, f64 energy, f64 weight, u32 submachine
//! ```

use crate::config::ScanLimits;
use crate::enums::{Endian, ScanOrder};
use crate::resource::{ResourceError, ResourceReader, ResourceWriter, write_atomic};

use std::{fs, path::Path};
use thiserror::Error;

pub const MAGIC: &[u8; 8] = b"TRIPRST\0";
pub const VERSION: u16 = 1;
const RECORD_SIZE: usize = 4 + 8 * 4 + 4;

#[derive(Debug, Error)]
pub enum ScanPathError {
    #[error("Format error: {0}")]
    Format(String),

    #[error("invalid spot {index}: {reason}")]
    InvalidSpot { index: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ResourceError> for ScanPathError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Io(err) => ScanPathError::Io(err),
            other => ScanPathError::Format(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spot {
    pub field_id: u32,
    pub x_mm: f64,
    pub y_mm: f64,
    /// Beam energy or range, as produced by the optimizer.
    pub energy: f64,
    /// Particle count or relative weight.
    pub weight: f64,
    pub submachine: u32,
}

impl Spot {
    pub fn new(field_id: u32, x_mm: f64, y_mm: f64, energy: f64, weight: f64, submachine: u32) -> Self {
        Self {
            field_id,
            x_mm,
            y_mm,
            energy,
            weight,
            submachine,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RasterScanPath {
    spots: Vec<Spot>,
}

impl RasterScanPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_spots(spots: Vec<Spot>) -> Self {
        Self { spots }
    }

    pub fn spots(&self) -> &[Spot] {
        &self.spots
    }

    pub fn into_spots(self) -> Vec<Spot> {
        self.spots
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    pub fn append(&mut self, spot: Spot) {
        self.spots.push(spot);
    }

    pub fn extend(&mut self, spots: impl IntoIterator<Item = Spot>) {
        self.spots.extend(spots);
    }

    /// The same spots in opposite delivery order.
    pub fn reverse(&self) -> RasterScanPath {
        Self {
            spots: self.spots.iter().rev().copied().collect(),
        }
    }

    /// Distinct field ids in order of first appearance.
    pub fn field_ids(&self) -> Vec<u32> {
        let mut ids = Vec::new();
        for spot in &self.spots {
            if !ids.contains(&spot.field_id) {
                ids.push(spot.field_id);
            }
        }
        ids
    }

    /// Distinct submachine indices in order of first appearance.
    pub fn submachines(&self) -> Vec<u32> {
        let mut submachines = Vec::new();
        for spot in &self.spots {
            if !submachines.contains(&spot.submachine) {
                submachines.push(spot.submachine);
            }
        }
        submachines
    }

    pub fn filter_field(&self, field_id: u32) -> RasterScanPath {
        Self {
            spots: self
                .spots
                .iter()
                .filter(|spot| spot.field_id == field_id)
                .copied()
                .collect(),
        }
    }

    pub fn total_weight(&self) -> f64 {
        self.spots.iter().map(|spot| spot.weight).sum()
    }

    /// Parses a scan path file; with `field_filter` only that field's spots
    /// are kept, in their original relative order.
    pub fn read(bytes: &[u8], field_filter: Option<u32>) -> Result<RasterScanPath, ScanPathError> {
        let mut reader = ResourceReader::new(bytes, Endian::Little);
        let magic = reader.take(MAGIC.len())?;
        if magic != MAGIC {
            return Err(ScanPathError::Format(format!("bad magic {:?}", magic)));
        }
        let flag = reader.read_u8()?;
        let endian = Endian::from_flag(flag)
            .ok_or_else(|| ScanPathError::Format(format!("invalid byte order flag {}", flag)))?;
        reader.set_endian(endian);
        reader.read_u8()?;
        let version = reader.read_u16()?;
        if version != VERSION {
            return Err(ScanPathError::Format(format!("unsupported version {}", version)));
        }

        let count = reader.read_u32()? as usize;
        let expected = count
            .checked_mul(RECORD_SIZE)
            .ok_or_else(|| ScanPathError::Format(format!("spot count {} overflows", count)))?;
        if reader.remaining() != expected {
            return Err(ScanPathError::Format(format!(
                "{} spots need {} bytes, found {}",
                count,
                expected,
                reader.remaining()
            )));
        }

        let mut spots = Vec::with_capacity(count);
        for _ in 0..count {
            let spot = Spot {
                field_id: reader.read_u32()?,
                x_mm: reader.read_f64()?,
                y_mm: reader.read_f64()?,
                energy: reader.read_f64()?,
                weight: reader.read_f64()?,
                submachine: reader.read_u32()?,
            };
            if field_filter.is_none_or(|field_id| field_id == spot.field_id) {
                spots.push(spot);
            }
        }

        log::debug!("read {} of {} spots", spots.len(), count);
        Ok(Self { spots })
    }

    /// Checks every spot against `limits` without writing anything.
    ///
    /// # Errors
    ///
    /// Returns [`ScanPathError::InvalidSpot`] for the first spot outside its
    /// field's scan range or with a negative or non-finite weight.
    pub fn validate(&self, limits: &ScanLimits) -> Result<(), ScanPathError> {
        for (index, spot) in self.spots.iter().enumerate() {
            let invalid = |reason: String| ScanPathError::InvalidSpot { index, reason };
            if !(spot.weight.is_finite() && spot.weight >= 0.0) {
                return Err(invalid(format!("weight {} must be finite and non-negative", spot.weight)));
            }
            if !(spot.x_mm.is_finite() && spot.y_mm.is_finite() && spot.energy.is_finite()) {
                return Err(invalid("position and energy must be finite".to_string()));
            }
            let range = limits
                .range_for(spot.field_id)
                .ok_or_else(|| invalid(format!("no scan range configured for field {}", spot.field_id)))?;
            if !range.contains(spot.x_mm, spot.y_mm) {
                return Err(invalid(format!(
                    "position ({}, {}) outside field {} range x {:?} y {:?}",
                    spot.x_mm, spot.y_mm, spot.field_id, range.x, range.y
                )));
            }
        }
        Ok(())
    }

    /// Serializes little endian; `order` only affects emission, the stored
    /// sequence is unchanged.
    pub fn write(&self, order: ScanOrder, limits: &ScanLimits) -> Result<Vec<u8>, ScanPathError> {
        self.write_with_byte_order(order, limits, Endian::Little)
    }

    pub fn write_with_byte_order(
        &self,
        order: ScanOrder,
        limits: &ScanLimits,
        endian: Endian,
    ) -> Result<Vec<u8>, ScanPathError> {
        self.validate(limits)?;

        let count = u32::try_from(self.spots.len())
            .map_err(|_| ScanPathError::Format(format!("{} spots exceed the file limit", self.spots.len())))?;
        let mut writer = ResourceWriter::with_capacity(endian, 16 + self.spots.len() * RECORD_SIZE);
        writer.write_bytes(MAGIC);
        writer.write_u8(endian.flag());
        writer.write_u8(0);
        writer.write_u16(VERSION);
        writer.write_u32(count);

        let spots: Box<dyn Iterator<Item = &Spot>> = match order {
            ScanOrder::Forward => Box::new(self.spots.iter()),
            ScanOrder::Reverse => Box::new(self.spots.iter().rev()),
        };
        for spot in spots {
            writer.write_u32(spot.field_id);
            writer.write_f64(spot.x_mm);
            writer.write_f64(spot.y_mm);
            writer.write_f64(spot.energy);
            writer.write_f64(spot.weight);
            writer.write_u32(spot.submachine);
        }
        Ok(writer.into_inner())
    }

    /// Validates, serializes and atomically replaces `path`. Nothing is
    /// written when any spot is invalid.
    pub fn write_file(
        &self,
        path: impl AsRef<Path>,
        order: ScanOrder,
        limits: &ScanLimits,
    ) -> Result<(), ScanPathError> {
        let bytes = self.write(order, limits)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    pub fn read_file(path: impl AsRef<Path>, field_filter: Option<u32>) -> Result<RasterScanPath, ScanPathError> {
        let bytes = fs::read(path.as_ref())?;
        Self::read(&bytes, field_filter)
    }
}

impl FromIterator<Spot> for RasterScanPath {
    fn from_iter<I: IntoIterator<Item = Spot>>(iter: I) -> Self {
        Self {
            spots: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanRange;

    fn limits() -> ScanLimits {
        ScanLimits::uniform(ScanRange::new([-10.0, 10.0], [-10.0, 10.0]))
    }

    #[test]
    fn test_negative_weight_rejected() {
        let path = RasterScanPath::from_spots(vec![
            Spot::new(1, 0.0, 0.0, 100.0, 1.0, 0),
            Spot::new(1, 0.0, 0.0, 100.0, -1.0, 0),
        ]);
        match path.write(ScanOrder::Forward, &limits()) {
            Err(ScanPathError::InvalidSpot { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected invalid spot, got {:?}", other),
        }
    }

    #[test]
    fn test_field_without_range_rejected() {
        let limits = ScanLimits::new().with_field(1, ScanRange::new([-1.0, 1.0], [-1.0, 1.0]));
        let path = RasterScanPath::from_spots(vec![Spot::new(2, 0.0, 0.0, 100.0, 1.0, 0)]);
        assert!(matches!(
            path.write(ScanOrder::Forward, &limits),
            Err(ScanPathError::InvalidSpot { index: 0, .. })
        ));
    }

    #[test]
    fn test_big_endian_round_trip() {
        let path = RasterScanPath::from_spots(vec![Spot::new(7, -1.5, 2.25, 150.0, 3.0, 2)]);
        let bytes = path
            .write_with_byte_order(ScanOrder::Forward, &limits(), Endian::Big)
            .unwrap();
        assert_eq!(bytes[8], 1);
        assert_eq!(&bytes[16..20], &[0, 0, 0, 7]);
        assert_eq!(RasterScanPath::read(&bytes, None).unwrap(), path);
    }

    #[test]
    fn test_truncated_record() {
        let path = RasterScanPath::from_spots(vec![Spot::new(1, 0.0, 0.0, 100.0, 1.0, 0)]);
        let bytes = path.write(ScanOrder::Forward, &limits()).unwrap();
        assert!(matches!(
            RasterScanPath::read(&bytes[..bytes.len() - 1], None),
            Err(ScanPathError::Format(_))
        ));
    }

    #[test]
    fn test_helpers() {
        let mut path = RasterScanPath::new();
        path.append(Spot::new(2, 0.0, 0.0, 100.0, 1.5, 1));
        path.extend([Spot::new(1, 1.0, 0.0, 100.0, 2.5, 0), Spot::new(2, 1.0, 0.0, 90.0, 1.0, 1)]);
        assert_eq!(path.field_ids(), vec![2, 1]);
        assert_eq!(path.submachines(), vec![1, 0]);
        assert_eq!(path.total_weight(), 5.0);
        assert_eq!(path.filter_field(2).len(), 2);
    }
}
