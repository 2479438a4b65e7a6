use crate::data_type::{DataType, Element};
use crate::enums::{ArithmeticOp, Endian, Orientation};
use crate::frame::{CoordinateFrame, FrameError};
use crate::metadata::Metadata;
use crate::resource::ResourceError;

use image::{ImageBuffer, Luma};
use ndarray::{Array2, Array3, ArrayView2, Zip, s};
use rayon::prelude::*;
use thiserror::Error;

pub const CURRENT_FORMAT_VERSION: u16 = 2;

#[derive(Debug, Error)]
pub enum CubeError {
    #[error("Format error: {0}")]
    Format(String),

    #[error("payload holds {actual} bytes, header declares {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("unknown data type code {0}")]
    UnknownDataType(u16),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("array of shape {actual:?} does not match frame dimensions {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("cubes are not compatible: {0}")]
    Incompatible(String),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ResourceError> for CubeError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Io(err) => CubeError::Io(err),
            other => CubeError::Format(other.to_string()),
        }
    }
}

/// Voxel storage tagged with its element type. Arrays are indexed
/// `[z, y, x]`, so the standard layout is x fastest, then y, then z.
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelData {
    I8(Array3<i8>),
    U8(Array3<u8>),
    I16(Array3<i16>),
    U16(Array3<u16>),
    I32(Array3<i32>),
    U32(Array3<u32>),
    F32(Array3<f32>),
    F64(Array3<f64>),
}

/// Runs `$body` with `$array` bound to the typed array inside `$data`.
macro_rules! with_array {
    ($data:expr, $array:ident => $body:expr) => {
        match $data {
            VoxelData::I8($array) => $body,
            VoxelData::U8($array) => $body,
            VoxelData::I16($array) => $body,
            VoxelData::U16($array) => $body,
            VoxelData::I32($array) => $body,
            VoxelData::U32($array) => $body,
            VoxelData::F32($array) => $body,
            VoxelData::F64($array) => $body,
        }
    };
}

/// Runs `$body` with `$t` aliased to the element type named by `$data_type`.
macro_rules! with_element_type {
    ($data_type:expr, $t:ident => $body:expr) => {
        match $data_type {
            DataType::Int8 => {
                type $t = i8;
                $body
            }
            DataType::UInt8 => {
                type $t = u8;
                $body
            }
            DataType::Int16 => {
                type $t = i16;
                $body
            }
            DataType::UInt16 => {
                type $t = u16;
                $body
            }
            DataType::Int32 => {
                type $t = i32;
                $body
            }
            DataType::UInt32 => {
                type $t = u32;
                $body
            }
            DataType::Float32 => {
                type $t = f32;
                $body
            }
            DataType::Float64 => {
                type $t = f64;
                $body
            }
        }
    };
}

/// Zips two arrays of the same element type into a new [`VoxelData`] of that
/// type, or fails with [`CubeError::Incompatible`] when the types differ.
macro_rules! zip_same_type {
    ($a:expr, $b:expr, |$x:ident, $y:ident| $body:expr) => {
        match ($a, $b) {
            (VoxelData::I8(a), VoxelData::I8(b)) => Ok(VoxelData::I8(Zip::from(a).and(b).par_map_collect(|&$x, &$y| $body))),
            (VoxelData::U8(a), VoxelData::U8(b)) => Ok(VoxelData::U8(Zip::from(a).and(b).par_map_collect(|&$x, &$y| $body))),
            (VoxelData::I16(a), VoxelData::I16(b)) => Ok(VoxelData::I16(Zip::from(a).and(b).par_map_collect(|&$x, &$y| $body))),
            (VoxelData::U16(a), VoxelData::U16(b)) => Ok(VoxelData::U16(Zip::from(a).and(b).par_map_collect(|&$x, &$y| $body))),
            (VoxelData::I32(a), VoxelData::I32(b)) => Ok(VoxelData::I32(Zip::from(a).and(b).par_map_collect(|&$x, &$y| $body))),
            (VoxelData::U32(a), VoxelData::U32(b)) => Ok(VoxelData::U32(Zip::from(a).and(b).par_map_collect(|&$x, &$y| $body))),
            (VoxelData::F32(a), VoxelData::F32(b)) => Ok(VoxelData::F32(Zip::from(a).and(b).par_map_collect(|&$x, &$y| $body))),
            (VoxelData::F64(a), VoxelData::F64(b)) => Ok(VoxelData::F64(Zip::from(a).and(b).par_map_collect(|&$x, &$y| $body))),
            (a, b) => Err(CubeError::Incompatible(format!(
                "data types differ: {} and {}",
                a.data_type(),
                b.data_type()
            ))),
        }
    };
}

pub(crate) use with_array;
pub(crate) use with_element_type;

/// Element types that can live inside a [`VoxelData`].
pub trait VoxelElement: Element {
    fn into_data(array: Array3<Self>) -> VoxelData;
    fn array(data: &VoxelData) -> Option<&Array3<Self>>;
}

macro_rules! voxel_element {
    ($ty:ty, $variant:ident) => {
        impl VoxelElement for $ty {
            fn into_data(array: Array3<Self>) -> VoxelData {
                VoxelData::$variant(array)
            }

            fn array(data: &VoxelData) -> Option<&Array3<Self>> {
                match data {
                    VoxelData::$variant(array) => Some(array),
                    _ => None,
                }
            }
        }
    };
}

voxel_element!(i8, I8);
voxel_element!(u8, U8);
voxel_element!(i16, I16);
voxel_element!(u16, U16);
voxel_element!(i32, I32);
voxel_element!(u32, U32);
voxel_element!(f32, F32);
voxel_element!(f64, F64);

impl VoxelData {
    pub fn data_type(&self) -> DataType {
        match self {
            VoxelData::I8(_) => DataType::Int8,
            VoxelData::U8(_) => DataType::UInt8,
            VoxelData::I16(_) => DataType::Int16,
            VoxelData::U16(_) => DataType::UInt16,
            VoxelData::I32(_) => DataType::Int32,
            VoxelData::U32(_) => DataType::UInt32,
            VoxelData::F32(_) => DataType::Float32,
            VoxelData::F64(_) => DataType::Float64,
        }
    }

    /// Shape as `(nz, ny, nx)`.
    pub fn dim(&self) -> (usize, usize, usize) {
        with_array!(self, array => array.dim())
    }

    pub fn len(&self) -> usize {
        with_array!(self, array => array.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn filled(data_type: DataType, shape: (usize, usize, usize), value: f64) -> (Self, bool) {
        with_element_type!(data_type, T => {
            let (element, clamped) = T::saturating_from_f64(value);
            (T::into_data(Array3::from_elem(shape, element)), clamped)
        })
    }

    fn view_f64(&self, index: usize, orientation: Orientation) -> Array2<f64> {
        with_array!(self, array => {
            let view = match orientation {
                Orientation::Axial => array.slice(s![index, .., ..]),
                Orientation::Coronal => array.slice(s![.., index, ..]),
                Orientation::Sagittal => array.slice(s![.., .., index]),
            };
            view.mapv(|value| value.to_f64())
        })
    }
}

/// Maps every voxel of `source` through `f` into `U`, returning the number
/// of clamped voxels.
fn map_array<S: Element, U: VoxelElement>(
    source: &Array3<S>,
    f: impl Fn(f64) -> f64 + Sync + Send,
) -> (VoxelData, usize) {
    let converted = Zip::from(source).par_map_collect(|&value| U::saturating_from_f64(f(value.to_f64())));
    collect_clamped(converted)
}

/// Voxelwise `op` of `a` with `b`, saturated back into `a`'s element type.
fn combine_arrays<T: VoxelElement>(a: &Array3<T>, b: &Array3<f64>, op: ArithmeticOp) -> (VoxelData, usize) {
    let combined = Zip::from(a)
        .and(b)
        .par_map_collect(|&x, &y| T::saturating_from_f64(op.apply(x.to_f64(), y)));
    collect_clamped(combined)
}

fn same_type_map<T: VoxelElement>(source: &Array3<T>, f: impl Fn(f64) -> f64 + Sync + Send) -> (VoxelData, usize) {
    map_array::<T, T>(source, f)
}

fn collect_clamped<T: VoxelElement>(values: Array3<(T, bool)>) -> (VoxelData, usize) {
    let clamped = values.par_iter().filter(|(_, clamped)| *clamped).count();
    (T::into_data(values.mapv(|(value, _)| value)), clamped)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

pub type GrayImage = ImageBuffer<Luma<u8>, Vec<u8>>;

/// A voxel grid with its geometry and header metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelCube {
    data: VoxelData,
    frame: CoordinateFrame,
    byte_order: Endian,
    metadata: Metadata,
    format_version: u16,
}

impl VoxelCube {
    pub fn new<T: VoxelElement>(array: Array3<T>, frame: CoordinateFrame) -> Result<Self, CubeError> {
        Self::from_data(T::into_data(array), frame)
    }

    /// # Errors
    ///
    /// Returns [`CubeError::ShapeMismatch`] when the array shape is not
    /// `(nz, ny, nx)` of the frame.
    pub fn from_data(data: VoxelData, frame: CoordinateFrame) -> Result<Self, CubeError> {
        let (nx, ny, nz) = frame.dimensions();
        if data.dim() != (nz, ny, nx) {
            return Err(CubeError::ShapeMismatch {
                expected: (nz, ny, nx),
                actual: data.dim(),
            });
        }
        Ok(Self {
            data,
            frame,
            byte_order: Endian::default(),
            metadata: Metadata::default(),
            format_version: CURRENT_FORMAT_VERSION,
        })
    }

    /// Cube of `data_type` on `frame` with every voxel set to `value`.
    pub fn filled(data_type: DataType, frame: CoordinateFrame, value: f64) -> Self {
        let (nx, ny, nz) = frame.dimensions();
        let (data, clamped) = VoxelData::filled(data_type, (nz, ny, nx), value);
        if clamped {
            log::warn!("fill value {} clamped to the {} range", value, data_type);
        }
        Self {
            data,
            frame,
            byte_order: Endian::default(),
            metadata: Metadata::default(),
            format_version: CURRENT_FORMAT_VERSION,
        }
    }

    pub fn with_byte_order(mut self, byte_order: Endian) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Header version used by [`VoxelCube::save`]. Only 1 and 2 exist.
    pub fn with_format_version(mut self, version: u16) -> Result<Self, CubeError> {
        if !(1..=CURRENT_FORMAT_VERSION).contains(&version) {
            return Err(CubeError::Format(format!("unsupported format version {}", version)));
        }
        self.format_version = version;
        Ok(self)
    }

    pub fn data(&self) -> &VoxelData {
        &self.data
    }

    pub fn into_data(self) -> VoxelData {
        self.data
    }

    /// Typed access to the voxel array, `None` if `T` is not the stored type.
    pub fn array<T: VoxelElement>(&self) -> Option<&Array3<T>> {
        T::array(&self.data)
    }

    pub fn frame(&self) -> &CoordinateFrame {
        &self.frame
    }

    pub fn byte_order(&self) -> Endian {
        self.byte_order
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn format_version(&self) -> u16 {
        self.format_version
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    /// Get the dimensions of the cube (nx, ny, nz)
    pub fn dimensions(&self) -> (usize, usize, usize) {
        self.frame.dimensions()
    }

    pub fn voxel_size(&self) -> (f64, f64, f64) {
        self.frame.voxel_size()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<f64> {
        with_array!(&self.data, array => array.get((k, j, i)).map(|value| value.to_f64()))
    }

    /// Value of the voxel nearest to a world position in millimetres.
    pub fn value_at(&self, x: f64, y: f64, z: f64) -> Result<f64, CubeError> {
        let (i, j, k) = self.frame.world_to_voxel(x, y, z)?;
        self.get(i, j, k).ok_or(CubeError::Frame(FrameError::IndexOutOfBounds {
            axis: 'z',
            index: k,
            dim: self.dimensions().2,
        }))
    }

    /// New cube with every voxel mapped through `value * scale + offset` into
    /// `data_type`, plus the number of voxels that had to be clamped.
    ///
    /// Integer targets round to nearest and saturate; NaN becomes 0 and counts
    /// as clamped. Casting to the current type with `scale == 1` and
    /// `offset == 0` returns an identical copy.
    pub fn cast(&self, data_type: DataType, scale: f64, offset: f64) -> (VoxelCube, usize) {
        if data_type == self.data_type() && scale == 1.0 && offset == 0.0 {
            return (self.clone(), 0);
        }

        let (data, clamped) = with_array!(&self.data, source => {
            with_element_type!(data_type, U => map_array::<_, U>(source, |value| value * scale + offset))
        });
        if clamped > 0 {
            log::warn!(
                "{} of {} voxels clamped while casting {} to {}",
                clamped,
                self.len(),
                self.data_type(),
                data_type
            );
        }
        (self.with_data(data), clamped)
    }

    /// Same frame, byte order and metadata around new voxels.
    fn with_data(&self, data: VoxelData) -> VoxelCube {
        VoxelCube {
            data,
            frame: self.frame.clone(),
            byte_order: self.byte_order,
            metadata: self.metadata.clone(),
            format_version: self.format_version,
        }
    }

    /// Voxelwise `self op other` on the same grid.
    ///
    /// `other` may hold any element type; values are combined in `f64` and
    /// saturated into `self`'s type, and the clamped count is returned with
    /// the result. Division yielding NaN (`0 / 0`) stores 0.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::Incompatible`] when the grids differ.
    pub fn combine(&self, other: &VoxelCube, op: ArithmeticOp) -> Result<(VoxelCube, usize), CubeError> {
        if !self.is_compatible(other) {
            return Err(CubeError::Incompatible("grids differ".to_string()));
        }
        let (other, _) = other.cast(DataType::Float64, 1.0, 0.0);
        let rhs = other
            .array::<f64>()
            .ok_or_else(|| CubeError::Incompatible("operand is not f64".to_string()))?;

        let (data, clamped) = with_array!(&self.data, array => combine_arrays(array, rhs, op));
        if clamped > 0 {
            log::warn!("{} of {} voxels clamped in {:?}", clamped, self.len(), op);
        }
        Ok((self.with_data(data), clamped))
    }

    /// Voxelwise `self op value`, saturated into `self`'s type.
    pub fn combine_scalar(&self, op: ArithmeticOp, value: f64) -> (VoxelCube, usize) {
        let (data, clamped) = with_array!(&self.data, array => same_type_map(array, |x| op.apply(x, value)));
        if clamped > 0 {
            log::warn!("{} of {} voxels clamped in {:?} by {}", clamped, self.len(), op, value);
        }
        (self.with_data(data), clamped)
    }

    fn check_index(&self, index: usize, orientation: Orientation) -> Result<(), CubeError> {
        let (nx, ny, nz) = self.dimensions();
        let (axis, dim) = match orientation {
            Orientation::Axial => ('z', nz),
            Orientation::Coronal => ('y', ny),
            Orientation::Sagittal => ('x', nx),
        };
        if index >= dim {
            return Err(FrameError::IndexOutOfBounds { axis, index, dim }.into());
        }
        Ok(())
    }

    /// The k-th z-slice as `[y, x]`, values widened to `f64`.
    pub fn slice(&self, k: usize) -> Result<Array2<f64>, CubeError> {
        self.slice_along(k, Orientation::Axial)
    }

    /// Borrowed k-th z-slice in the stored element type.
    pub fn typed_slice<T: VoxelElement>(&self, k: usize) -> Option<ArrayView2<'_, T>> {
        let array = self.array::<T>()?;
        (k < array.dim().0).then(|| array.slice(s![k, .., ..]))
    }

    pub fn slice_along(&self, index: usize, orientation: Orientation) -> Result<Array2<f64>, CubeError> {
        self.check_index(index, orientation)?;
        Ok(self.data.view_f64(index, orientation))
    }

    /// Renders a slice to 8-bit grayscale. Values are mapped linearly from
    /// `window` (or the slice's own range) onto `0..=255`.
    pub fn slice_image(
        &self,
        index: usize,
        orientation: Orientation,
        window: Option<(f64, f64)>,
    ) -> Result<GrayImage, CubeError> {
        let slice = self.slice_along(index, orientation)?;
        let (low, high) = window.unwrap_or_else(|| {
            slice
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), &v| (low.min(v), high.max(v)))
        });
        Self::slice_to_image(&slice.view(), low, high)
    }

    #[inline]
    fn normalize_to_u8(value: f64, low: f64, high: f64) -> u8 {
        if !(high > low) {
            return if value > low { 255 } else { 0 };
        }
        (((value - low) / (high - low)) * 255.0).round().clamp(0.0, 255.0) as u8
    }

    fn slice_to_image(slice: &ArrayView2<'_, f64>, low: f64, high: f64) -> Result<GrayImage, CubeError> {
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&v| Self::normalize_to_u8(v, low, high))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
            .ok_or_else(|| CubeError::Format(format!("cannot build {}x{} image", width, height)))
    }

    /// True when both cubes sit on the same grid.
    pub fn is_compatible(&self, other: &VoxelCube) -> bool {
        self.frame.is_compatible(&other.frame)
    }

    /// Voxelwise maximum of two cubes of the same type on the same grid.
    pub fn merge_max(&self, other: &VoxelCube) -> Result<VoxelCube, CubeError> {
        if !self.is_compatible(other) {
            return Err(CubeError::Incompatible("grids differ".to_string()));
        }

        let data = zip_same_type!(&self.data, &other.data, |x, y| if y > x { y } else { x })?;
        Ok(self.with_data(data))
    }

    /// Fills the zero voxels of `self` from `other`, e.g. to complete a
    /// partial dose cube. Both cubes need the same type and grid.
    pub fn merge_zero(&self, other: &VoxelCube) -> Result<VoxelCube, CubeError> {
        if !self.is_compatible(other) {
            return Err(CubeError::Incompatible("grids differ".to_string()));
        }

        let data = zip_same_type!(&self.data, &other.data, |x, y| if <_ as PartialEq>::eq(&x, &Default::default()) {
            y
        } else {
            x
        })?;
        Ok(self.with_data(data))
    }

    /// Minimum, maximum and mean over all voxels. NaN voxels are skipped.
    pub fn statistics(&self) -> Statistics {
        let (min, max, sum, count) = with_array!(&self.data, array => {
            array
                .par_iter()
                .map(|value| value.to_f64())
                .filter(|value| !value.is_nan())
                .fold(
                    || (f64::INFINITY, f64::NEG_INFINITY, 0.0, 0usize),
                    |(min, max, sum, count), v| (min.min(v), max.max(v), sum + v, count + 1),
                )
                .reduce(
                    || (f64::INFINITY, f64::NEG_INFINITY, 0.0, 0usize),
                    |a, b| (a.0.min(b.0), a.1.max(b.1), a.2 + b.2, a.3 + b.3),
                )
        });
        let mean = if count == 0 { f64::NAN } else { sum / count as f64 };
        Statistics { min, max, mean }
    }
}
