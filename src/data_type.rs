//! Voxel element types.
//!
//! Cubes carry their element type as a runtime tag ([`DataType`]); every
//! numeric operation dispatches on it and then runs monomorphised code through
//! the [`Element`] trait.

use crate::enums::Endian;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DataType {
    Int8 = 1,
    UInt8 = 2,
    Int16 = 3,
    UInt16 = 4,
    Int32 = 5,
    UInt32 = 6,
    Float32 = 7,
    Float64 = 8,
}

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::Int8,
        DataType::UInt8,
        DataType::Int16,
        DataType::UInt16,
        DataType::Int32,
        DataType::UInt32,
        DataType::Float32,
        DataType::Float64,
    ];

    /// Parse the on-disk type code. Returns `None` for unknown codes.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|data_type| data_type.code() == code)
    }

    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Size of each element in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    pub const fn is_signed(self) -> bool {
        !matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32)
    }

    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Int8 => "i8",
            Self::UInt8 => "u8",
            Self::Int16 => "i16",
            Self::UInt16 => "u16",
            Self::Int32 => "i32",
            Self::UInt32 => "u32",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "i8" | "int8" => Ok(Self::Int8),
            "u8" | "uint8" => Ok(Self::UInt8),
            "i16" | "int16" => Ok(Self::Int16),
            "u16" | "uint16" => Ok(Self::UInt16),
            "i32" | "int32" => Ok(Self::Int32),
            "u32" | "uint32" => Ok(Self::UInt32),
            "f32" | "float32" | "float" => Ok(Self::Float32),
            "f64" | "float64" | "double" => Ok(Self::Float64),
            _ => Err(format!(
                "unknown data type: '{}' (expected i8, u8, i16, u16, i32, u32, f32 or f64)",
                s
            )),
        }
    }
}

/// A concrete voxel element type.
pub trait Element: Copy + PartialEq + Default + Send + Sync + fmt::Debug + 'static {
    const DATA_TYPE: DataType;

    fn to_f64(self) -> f64;

    /// Converts with rounding and saturation. The flag is set when the value
    /// had to be clamped into range.
    fn saturating_from_f64(value: f64) -> (Self, bool);

    /// Decodes one element from exactly `DATA_TYPE.byte_size()` bytes.
    fn decode(bytes: &[u8], endian: Endian) -> Self;

    fn encode(self, out: &mut Vec<u8>, endian: Endian);
}

macro_rules! integer_element {
    ($ty:ty) => {
        fn to_f64(self) -> f64 {
            self as f64
        }

        fn saturating_from_f64(value: f64) -> (Self, bool) {
            if value.is_nan() {
                return (0, true);
            }
            let rounded = value.round();
            if rounded < <$ty>::MIN as f64 {
                (<$ty>::MIN, true)
            } else if rounded > <$ty>::MAX as f64 {
                (<$ty>::MAX, true)
            } else {
                (rounded as $ty, false)
            }
        }
    };
}

macro_rules! multibyte_codec {
    ($ty:ty, $read:ident, $write:ident) => {
        fn decode(bytes: &[u8], endian: Endian) -> Self {
            match endian {
                Endian::Little => LittleEndian::$read(bytes),
                Endian::Big => BigEndian::$read(bytes),
            }
        }

        fn encode(self, out: &mut Vec<u8>, endian: Endian) {
            let mut bytes = [0u8; std::mem::size_of::<$ty>()];
            match endian {
                Endian::Little => LittleEndian::$write(&mut bytes, self),
                Endian::Big => BigEndian::$write(&mut bytes, self),
            }
            out.extend_from_slice(&bytes);
        }
    };
}

impl Element for i8 {
    const DATA_TYPE: DataType = DataType::Int8;
    integer_element!(i8);

    fn decode(bytes: &[u8], _endian: Endian) -> Self {
        bytes[0] as i8
    }

    fn encode(self, out: &mut Vec<u8>, _endian: Endian) {
        out.push(self as u8);
    }
}

impl Element for u8 {
    const DATA_TYPE: DataType = DataType::UInt8;
    integer_element!(u8);

    fn decode(bytes: &[u8], _endian: Endian) -> Self {
        bytes[0]
    }

    fn encode(self, out: &mut Vec<u8>, _endian: Endian) {
        out.push(self);
    }
}

impl Element for i16 {
    const DATA_TYPE: DataType = DataType::Int16;
    integer_element!(i16);
    multibyte_codec!(i16, read_i16, write_i16);
}

impl Element for u16 {
    const DATA_TYPE: DataType = DataType::UInt16;
    integer_element!(u16);
    multibyte_codec!(u16, read_u16, write_u16);
}

impl Element for i32 {
    const DATA_TYPE: DataType = DataType::Int32;
    integer_element!(i32);
    multibyte_codec!(i32, read_i32, write_i32);
}

impl Element for u32 {
    const DATA_TYPE: DataType = DataType::UInt32;
    integer_element!(u32);
    multibyte_codec!(u32, read_u32, write_u32);
}

impl Element for f32 {
    const DATA_TYPE: DataType = DataType::Float32;
    multibyte_codec!(f32, read_f32, write_f32);

    fn to_f64(self) -> f64 {
        self as f64
    }

    // NaN and infinities are representable and pass through; only finite
    // values beyond the f32 range saturate.
    fn saturating_from_f64(value: f64) -> (Self, bool) {
        if value.is_finite() && value.abs() > f32::MAX as f64 {
            (f32::MAX.copysign(value as f32), true)
        } else {
            (value as f32, false)
        }
    }
}

impl Element for f64 {
    const DATA_TYPE: DataType = DataType::Float64;
    multibyte_codec!(f64, read_f64, write_f64);

    fn to_f64(self) -> f64 {
        self
    }

    fn saturating_from_f64(value: f64) -> (Self, bool) {
        (value, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_roundtrip() {
        for data_type in DataType::ALL {
            assert_eq!(DataType::from_code(data_type.code()), Some(data_type));
        }
        assert_eq!(DataType::from_code(0), None);
        assert_eq!(DataType::from_code(9), None);
    }

    #[test]
    fn test_integer_saturation() {
        assert_eq!(i16::saturating_from_f64(40000.0), (i16::MAX, true));
        assert_eq!(i16::saturating_from_f64(-40000.0), (i16::MIN, true));
        assert_eq!(i16::saturating_from_f64(-1.5), (-2, false));
        assert_eq!(u8::saturating_from_f64(-0.4), (0, false));
        assert_eq!(u8::saturating_from_f64(-0.6), (0, true));
        assert_eq!(i32::saturating_from_f64(f64::NAN), (0, true));
    }

    #[test]
    fn test_float_saturation() {
        assert_eq!(f32::saturating_from_f64(1e300), (f32::MAX, true));
        assert_eq!(f32::saturating_from_f64(-1e300), (-f32::MAX, true));
        assert!(f32::saturating_from_f64(f64::NAN).0.is_nan());
        assert_eq!(f32::saturating_from_f64(f64::INFINITY), (f32::INFINITY, false));
    }

    #[test]
    fn test_encode_respects_endian() {
        let mut out = Vec::new();
        0x0102i16.encode(&mut out, Endian::Big);
        0x0102i16.encode(&mut out, Endian::Little);
        assert_eq!(out, vec![1, 2, 2, 1]);
        assert_eq!(i16::decode(&out[0..2], Endian::Big), 0x0102);
        assert_eq!(i16::decode(&out[2..4], Endian::Little), 0x0102);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("int16".parse::<DataType>().unwrap(), DataType::Int16);
        assert_eq!("double".parse::<DataType>().unwrap(), DataType::Float64);
        assert!("complex".parse::<DataType>().is_err());
    }
}
