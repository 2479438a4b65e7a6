#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

/// Direction in which slice positions run along the cube's z axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SliceOrder {
    #[default]
    Ascending,
    Descending,
}

/// Byte order of a cube or scan path file.
///
/// TRiP98 headers call these `vms` (little) and `aix` (big).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    pub(crate) fn flag(self) -> u8 {
        match self {
            Endian::Little => 0,
            Endian::Big => 1,
        }
    }

    pub(crate) fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 => Some(Endian::Little),
            1 => Some(Endian::Big),
            _ => None,
        }
    }
}

/// Emission direction when writing a scan path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanOrder {
    #[default]
    Forward,
    Reverse,
}

/// Voxelwise operation for [`VoxelCube::combine`](crate::VoxelCube::combine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    /// `a op b`; a division yielding NaN gives 0.
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ArithmeticOp::Add => a + b,
            ArithmeticOp::Sub => a - b,
            ArithmeticOp::Mul => a * b,
            ArithmeticOp::Div => {
                let quotient = a / b;
                if quotient.is_nan() { 0.0 } else { quotient }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_over_zero_is_zero() {
        assert_eq!(ArithmeticOp::Div.apply(0.0, 0.0), 0.0);
        assert_eq!(ArithmeticOp::Div.apply(3.0, 0.0), f64::INFINITY);
        assert_eq!(ArithmeticOp::Sub.apply(3.0, 5.0), -2.0);
    }
}
