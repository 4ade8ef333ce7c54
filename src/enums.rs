use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Axial => write!(f, "axial"),
            Orientation::Coronal => write!(f, "coronal"),
            Orientation::Sagittal => write!(f, "sagittal"),
        }
    }
}

/// On-disk element type of the voxel data. Multi-byte types are always
/// little-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementEncoding {
    U8,
    U16,
    F32,
    /// Any other datatype code. Voxels of this type decode to 0.
    Unsupported(i16),
}

impl ElementEncoding {
    pub const NIFTI_UINT8: i16 = 2;
    pub const NIFTI_FLOAT32: i16 = 16;
    pub const NIFTI_UINT16: i16 = 512;

    pub fn from_datatype(code: i16) -> Self {
        match code {
            Self::NIFTI_UINT8 => ElementEncoding::U8,
            Self::NIFTI_UINT16 => ElementEncoding::U16,
            Self::NIFTI_FLOAT32 => ElementEncoding::F32,
            other => ElementEncoding::Unsupported(other),
        }
    }

    pub fn datatype(&self) -> i16 {
        match self {
            ElementEncoding::U8 => Self::NIFTI_UINT8,
            ElementEncoding::U16 => Self::NIFTI_UINT16,
            ElementEncoding::F32 => Self::NIFTI_FLOAT32,
            ElementEncoding::Unsupported(code) => *code,
        }
    }

    /// Size of one element, `None` for unsupported encodings.
    pub fn bytes_per_element(&self) -> Option<usize> {
        match self {
            ElementEncoding::U8 => Some(1),
            ElementEncoding::U16 => Some(2),
            ElementEncoding::F32 => Some(4),
            ElementEncoding::Unsupported(_) => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, ElementEncoding::Unsupported(_))
    }
}
