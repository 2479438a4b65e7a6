//! Mapping between cube voxel indices and patient coordinates in millimetres.
//!
//! In-plane positions follow a uniform grid anchored at the centre of voxel
//! `(0, 0, 0)`. Along z every slice has an explicit position, so series with
//! non-uniform slice spacing are represented exactly.

use crate::enums::SliceOrder;

use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("{axis} coordinate {value} lies outside the cube extent [{min}, {max}]")]
    OutOfBounds {
        axis: char,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("voxel index {index} on axis {axis} exceeds dimension {dim}")]
    IndexOutOfBounds { axis: char, index: usize, dim: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateFrame {
    origin_xy: (f64, f64),
    pixel_spacing: (f64, f64),
    slice_distance: f64,
    dim_xy: (usize, usize),
    slice_positions: Vec<f64>,
    slice_order: SliceOrder,
}

impl CoordinateFrame {
    /// Frame with equidistant slices starting at `origin.2`.
    pub fn uniform(
        origin: (f64, f64, f64),
        voxel_size: (f64, f64, f64),
        dimensions: (usize, usize, usize),
    ) -> Result<Self, FrameError> {
        let (_, _, z0) = origin;
        let (_, _, dz) = voxel_size;
        let positions = (0..dimensions.2).map(|k| z0 + k as f64 * dz).collect();
        let frame = Self::from_slice_positions(
            (origin.0, origin.1),
            (voxel_size.0, voxel_size.1),
            (dimensions.0, dimensions.1),
            positions,
        )?;
        if dz == 0.0 {
            Ok(frame)
        } else {
            frame.with_slice_distance(dz.abs())
        }
    }

    /// Replaces the nominal slice distance reported as `dz`.
    ///
    /// Slice positions stay authoritative; this only matters where the
    /// distance cannot be read off the positions, e.g. for a single slice.
    pub fn with_slice_distance(mut self, slice_distance: f64) -> Result<Self, FrameError> {
        if !(slice_distance.is_finite() && slice_distance > 0.0) {
            return Err(FrameError::Geometry(format!(
                "slice distance must be positive, got {}",
                slice_distance
            )));
        }
        self.slice_distance = slice_distance;
        Ok(self)
    }

    /// Frame from explicit slice positions, kept in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Geometry`] if there are no slices, if spacing is
    /// not positive, or if the positions are not strictly monotonic.
    pub fn from_slice_positions(
        origin_xy: (f64, f64),
        pixel_spacing: (f64, f64),
        dim_xy: (usize, usize),
        slice_positions: Vec<f64>,
    ) -> Result<Self, FrameError> {
        let (dx, dy) = pixel_spacing;
        if !(dx.is_finite() && dx > 0.0 && dy.is_finite() && dy > 0.0) {
            return Err(FrameError::Geometry(format!(
                "pixel spacing must be positive, got ({}, {})",
                dx, dy
            )));
        }
        if !(origin_xy.0.is_finite() && origin_xy.1.is_finite()) {
            return Err(FrameError::Geometry(format!(
                "origin must be finite, got ({}, {})",
                origin_xy.0, origin_xy.1
            )));
        }
        if dim_xy.0 == 0 || dim_xy.1 == 0 {
            return Err(FrameError::Geometry(format!(
                "in-plane dimensions must be positive, got {}x{}",
                dim_xy.0, dim_xy.1
            )));
        }
        let slice_order = Self::check_monotonic(&slice_positions)?;
        let slice_distance = match slice_positions.as_slice() {
            [first, second, ..] => (second - first).abs(),
            _ => dx.min(dy),
        };

        Ok(Self {
            origin_xy,
            pixel_spacing,
            slice_distance,
            dim_xy,
            slice_positions,
            slice_order,
        })
    }

    /// Frame from DICOM slice positions given in acquisition order.
    ///
    /// The positions are sorted in the direction implied by the first and the
    /// last given slice, so a series acquired head first stays descending.
    /// `image_position` is the ImagePositionPatient of the first slice and
    /// `pixel_spacing` is `(column spacing, row spacing)`, i.e. `(dx, dy)`.
    pub fn from_dicom_slices(
        ordered_slice_positions: &[f64],
        pixel_spacing: (f64, f64),
        image_position: (f64, f64, f64),
        dim_xy: (usize, usize),
    ) -> Result<Self, FrameError> {
        let (order, _) = Self::sort_order(ordered_slice_positions)?;
        let positions = order
            .iter()
            .map(|&index| ordered_slice_positions[index])
            .collect();
        Self::from_slice_positions(
            (image_position.0, image_position.1),
            pixel_spacing,
            dim_xy,
            positions,
        )
    }

    /// Permutation that sorts `positions` in their acquisition direction.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Geometry`] for empty input, non-finite positions
    /// and duplicate positions.
    pub fn sort_order(positions: &[f64]) -> Result<(Vec<usize>, SliceOrder), FrameError> {
        if positions.is_empty() {
            return Err(FrameError::Geometry("no slice positions".to_string()));
        }
        if let Some(index) = positions.iter().position(|z| !z.is_finite()) {
            return Err(FrameError::Geometry(format!(
                "slice {} has non-finite position {}",
                index, positions[index]
            )));
        }

        let first = positions[0];
        let last = positions[positions.len() - 1];
        let slice_order = if last < first {
            SliceOrder::Descending
        } else {
            SliceOrder::Ascending
        };

        let mut order: Vec<usize> = (0..positions.len()).collect();
        order.sort_by(|&a, &b| {
            let ordering = positions[a].partial_cmp(&positions[b]).unwrap_or(Ordering::Equal);
            match slice_order {
                SliceOrder::Ascending => ordering,
                SliceOrder::Descending => ordering.reverse(),
            }
        });

        if let Some(pair) = order
            .windows(2)
            .find(|pair| positions[pair[0]] == positions[pair[1]])
        {
            return Err(FrameError::Geometry(format!(
                "slices {} and {} share position {}",
                pair[0], pair[1], positions[pair[0]]
            )));
        }

        Ok((order, slice_order))
    }

    fn check_monotonic(positions: &[f64]) -> Result<SliceOrder, FrameError> {
        if positions.is_empty() {
            return Err(FrameError::Geometry("no slice positions".to_string()));
        }
        if let Some(index) = positions.iter().position(|z| !z.is_finite()) {
            return Err(FrameError::Geometry(format!(
                "slice {} has non-finite position {}",
                index, positions[index]
            )));
        }
        let ascending = positions.windows(2).all(|pair| pair[1] > pair[0]);
        let descending = positions.windows(2).all(|pair| pair[1] < pair[0]);
        match (ascending, descending) {
            (true, _) => Ok(SliceOrder::Ascending),
            (false, true) => Ok(SliceOrder::Descending),
            (false, false) => Err(FrameError::Geometry(
                "slice positions are not strictly monotonic".to_string(),
            )),
        }
    }

    /// World position of voxel `(0, 0, 0)`.
    pub fn origin(&self) -> (f64, f64, f64) {
        (self.origin_xy.0, self.origin_xy.1, self.slice_positions[0])
    }

    /// `(dx, dy, dz)`. `dz` is the nominal slice distance: the gap between the
    /// first two slices unless set explicitly.
    pub fn voxel_size(&self) -> (f64, f64, f64) {
        (self.pixel_spacing.0, self.pixel_spacing.1, self.slice_distance)
    }

    /// `(nx, ny, nz)`
    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.dim_xy.0, self.dim_xy.1, self.slice_positions.len())
    }

    pub fn slice_positions(&self) -> &[f64] {
        &self.slice_positions
    }

    pub fn slice_order(&self) -> SliceOrder {
        self.slice_order
    }

    /// True when every slice gap equals the nominal slice distance.
    pub fn is_uniform(&self) -> bool {
        const EPS: f64 = 1e-6;
        let dz = self.slice_distance;
        self.slice_positions
            .windows(2)
            .all(|pair| ((pair[1] - pair[0]).abs() - dz).abs() <= EPS * dz.max(1.0))
    }

    /// z position of a 1-based slice number.
    pub fn slice_to_z(&self, slice_number: usize) -> Option<f64> {
        slice_number
            .checked_sub(1)
            .and_then(|k| self.slice_positions.get(k).copied())
    }

    pub fn voxel_to_world(&self, i: usize, j: usize, k: usize) -> Result<(f64, f64, f64), FrameError> {
        let (nx, ny, nz) = self.dimensions();
        for (axis, index, dim) in [('x', i, nx), ('y', j, ny), ('z', k, nz)] {
            if index >= dim {
                return Err(FrameError::IndexOutOfBounds { axis, index, dim });
            }
        }
        let (dx, dy) = self.pixel_spacing;
        Ok((
            self.origin_xy.0 + i as f64 * dx,
            self.origin_xy.1 + j as f64 * dy,
            self.slice_positions[k],
        ))
    }

    /// Nearest voxel to a world position.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::OutOfBounds`] when the position lies more than
    /// half a voxel outside the cube.
    pub fn world_to_voxel(&self, x: f64, y: f64, z: f64) -> Result<(usize, usize, usize), FrameError> {
        let (dx, dy) = self.pixel_spacing;
        let i = Self::in_plane_index('x', x, self.origin_xy.0, dx, self.dim_xy.0)?;
        let j = Self::in_plane_index('y', y, self.origin_xy.1, dy, self.dim_xy.1)?;
        let k = self.slice_index(z)?;
        Ok((i, j, k))
    }

    fn in_plane_index(axis: char, value: f64, origin: f64, spacing: f64, dim: usize) -> Result<usize, FrameError> {
        let continuous = (value - origin) / spacing;
        let upper = dim as f64 - 0.5;
        if !(continuous >= -0.5 && continuous <= upper) {
            return Err(FrameError::OutOfBounds {
                axis,
                value,
                min: origin - 0.5 * spacing,
                max: origin + upper * spacing,
            });
        }
        Ok((continuous.round().max(0.0) as usize).min(dim - 1))
    }

    fn slice_index(&self, z: f64) -> Result<usize, FrameError> {
        let positions = &self.slice_positions;
        let last = positions.len() - 1;
        let half_gap = |a: usize, b: usize| 0.5 * (positions[a] - positions[b]).abs();
        let (low_margin, high_margin) = if last == 0 {
            (0.5 * self.slice_distance, 0.5 * self.slice_distance)
        } else {
            (half_gap(0, 1), half_gap(last, last - 1))
        };

        let (min, max) = match self.slice_order {
            SliceOrder::Ascending => (positions[0] - low_margin, positions[last] + high_margin),
            SliceOrder::Descending => (positions[last] - high_margin, positions[0] + low_margin),
        };
        if !(z >= min && z <= max) {
            return Err(FrameError::OutOfBounds { axis: 'z', value: z, min, max });
        }

        let nearest = positions
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (*a - z)
                    .abs()
                    .partial_cmp(&(*b - z).abs())
                    .unwrap_or(Ordering::Equal)
            })
            .map(|(k, _)| k)
            .unwrap_or(0);
        Ok(nearest)
    }

    /// Frames describe the same grid when dimensions, spacing, origin and
    /// every slice position agree within `1e-5` mm.
    pub fn is_compatible(&self, other: &CoordinateFrame) -> bool {
        const EPS: f64 = 1e-5;
        let close = |a: f64, b: f64| (a - b).abs() <= EPS;
        self.dimensions() == other.dimensions()
            && close(self.pixel_spacing.0, other.pixel_spacing.0)
            && close(self.pixel_spacing.1, other.pixel_spacing.1)
            && close(self.origin_xy.0, other.origin_xy.0)
            && close(self.origin_xy.1, other.origin_xy.1)
            && self
                .slice_positions
                .iter()
                .zip(&other.slice_positions)
                .all(|(a, b)| close(*a, *b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> CoordinateFrame {
        CoordinateFrame::from_slice_positions((-10.0, 20.0), (2.0, 2.0), (4, 3), vec![0.0, 3.0, 5.0])
            .unwrap()
    }

    #[test]
    fn test_voxel_to_world_uses_slice_table() {
        let frame = frame();
        assert_eq!(frame.voxel_to_world(1, 2, 2).unwrap(), (-8.0, 24.0, 5.0));
        assert!(!frame.is_uniform());
        assert!(matches!(
            frame.voxel_to_world(4, 0, 0),
            Err(FrameError::IndexOutOfBounds { axis: 'x', .. })
        ));
    }

    #[test]
    fn test_world_to_voxel_nearest() {
        let frame = frame();
        assert_eq!(frame.world_to_voxel(-8.9, 24.9, 4.2).unwrap(), (1, 2, 2));
        // half a voxel beyond the first x centre is still inside
        assert_eq!(frame.world_to_voxel(-11.0, 20.0, 0.0).unwrap().0, 0);
        assert!(matches!(
            frame.world_to_voxel(-11.1, 20.0, 0.0),
            Err(FrameError::OutOfBounds { axis: 'x', .. })
        ));
        // last gap is 2 mm, so the margin above slice 2 is 1 mm
        assert!(frame.world_to_voxel(-10.0, 20.0, 6.0).is_ok());
        assert!(frame.world_to_voxel(-10.0, 20.0, 6.1).is_err());
        assert!(frame.world_to_voxel(-10.0, 20.0, -1.6).is_err());
    }

    #[test]
    fn test_descending_frame_keeps_order() {
        let frame = CoordinateFrame::from_dicom_slices(
            &[10.0, 5.0, 7.5, 0.0],
            (1.0, 1.0),
            (0.0, 0.0, 10.0),
            (2, 2),
        )
        .unwrap();
        assert_eq!(frame.slice_positions(), &[10.0, 7.5, 5.0, 0.0]);
        assert_eq!(frame.slice_order(), SliceOrder::Descending);
        assert_eq!(frame.origin(), (0.0, 0.0, 10.0));
        assert_eq!(frame.world_to_voxel(0.0, 0.0, 8.0).unwrap().2, 1);
        assert!(frame.world_to_voxel(0.0, 0.0, 11.5).is_err());
    }

    #[test]
    fn test_duplicate_positions_rejected() {
        let result = CoordinateFrame::from_dicom_slices(&[0.0, 1.0, 1.0], (1.0, 1.0), (0.0, 0.0, 0.0), (1, 1));
        assert!(matches!(result, Err(FrameError::Geometry(_))));
    }

    #[test]
    fn test_non_monotonic_rejected() {
        let result = CoordinateFrame::from_slice_positions((0.0, 0.0), (1.0, 1.0), (1, 1), vec![0.0, 2.0, 1.0]);
        assert!(matches!(result, Err(FrameError::Geometry(_))));
    }

    #[test]
    fn test_slice_to_z_is_one_based() {
        let frame = frame();
        assert_eq!(frame.slice_to_z(1), Some(0.0));
        assert_eq!(frame.slice_to_z(3), Some(5.0));
        assert_eq!(frame.slice_to_z(0), None);
    }

    #[test]
    fn test_single_slice_keeps_nominal_distance() {
        let frame = CoordinateFrame::uniform((0.0, 0.0, 4.0), (1.0, 1.0, 3.0), (2, 2, 1)).unwrap();
        assert_eq!(frame.voxel_size(), (1.0, 1.0, 3.0));
        assert_eq!(frame.world_to_voxel(0.0, 0.0, 5.4).unwrap(), (0, 0, 0));
        assert!(frame.world_to_voxel(0.0, 0.0, 5.6).is_err());
        assert!(matches!(frame.with_slice_distance(0.0), Err(FrameError::Geometry(_))));
    }
}
