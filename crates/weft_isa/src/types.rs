//! Tensor element types and shape arithmetic.
//!
//! `TypeInfo` is the single shape/dtype descriptor used everywhere: on IR
//! nodes during compilation and in the tensor table of the emitted
//! bytecode. Strides are *element* strides (row-major contiguous) until
//! task planning bakes byte strides for broadcasting.

use std::fmt;

/// Maximum tensor rank supported by the ISA.
pub const MAX_DIMS: usize = 4;

/// Tensor element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Dtype {
    /// Not yet inferred. Must not survive the analysis pass.
    #[default]
    Unknown = 0,
    /// Unsigned 8-bit integer.
    U8 = 1,
    /// Signed 32-bit integer.
    I32 = 2,
    /// 32-bit IEEE float.
    F32 = 3,
}

impl Dtype {
    /// Size of one element in bytes. `Unknown` has no size.
    pub fn size(self) -> usize {
        match self {
            Dtype::Unknown => 0,
            Dtype::U8 => 1,
            Dtype::I32 | Dtype::F32 => 4,
        }
    }

    /// Bit used in operation input masks.
    pub fn mask_bit(self) -> u8 {
        match self {
            Dtype::Unknown => 0,
            Dtype::U8 => 1 << 0,
            Dtype::I32 => 1 << 1,
            Dtype::F32 => 1 << 2,
        }
    }

    /// Parse a surface dtype string from a manifest.
    pub fn from_str(s: &str) -> Option<Dtype> {
        match s {
            "u8" | "byte" => Some(Dtype::U8),
            "i32" | "int" => Some(Dtype::I32),
            "f32" | "float" => Some(Dtype::F32),
            _ => None,
        }
    }

    /// Stable numeric value for the cartridge format.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`Dtype::to_u8`].
    pub fn from_u8(v: u8) -> Dtype {
        match v {
            1 => Dtype::U8,
            2 => Dtype::I32,
            3 => Dtype::F32,
            _ => Dtype::Unknown,
        }
    }
}

/// Input mask accepting every concrete dtype.
pub const MASK_ANY: u8 = (1 << 0) | (1 << 1) | (1 << 2);
/// Input mask accepting only `F32`.
pub const MASK_F32: u8 = 1 << 2;

/// Shape, strides and element type of one tensor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeInfo {
    pub dtype: Dtype,
    /// Rank; 0 means scalar.
    pub ndim: u8,
    pub shape: [i32; MAX_DIMS],
    /// Element strides, row-major contiguous unless rewritten.
    pub strides: [i32; MAX_DIMS],
}

impl TypeInfo {
    /// A scalar of the given dtype.
    pub fn scalar(dtype: Dtype) -> TypeInfo {
        let mut info = TypeInfo {
            dtype,
            ndim: 0,
            shape: [0; MAX_DIMS],
            strides: [0; MAX_DIMS],
        };
        info.shape[0] = 1;
        info.calc_strides();
        info
    }

    /// A contiguous tensor with the given shape.
    pub fn with_shape(dtype: Dtype, shape: &[i32]) -> TypeInfo {
        let mut info = TypeInfo {
            dtype,
            ndim: shape.len().min(MAX_DIMS) as u8,
            shape: [0; MAX_DIMS],
            strides: [0; MAX_DIMS],
        };
        for (i, &d) in shape.iter().take(MAX_DIMS).enumerate() {
            info.shape[i] = d;
        }
        info.calc_strides();
        info
    }

    /// Total element count; scalars count as one element.
    pub fn element_count(&self) -> usize {
        let mut count: i64 = 1;
        for d in 0..self.ndim as usize {
            count *= self.shape[d].max(0) as i64;
        }
        count.max(0) as usize
    }

    /// True for rank-0 values and one-element vectors.
    pub fn is_scalar(&self) -> bool {
        self.ndim == 0 || (self.ndim == 1 && self.shape[0] == 1)
    }

    /// Recompute contiguous row-major element strides for the current shape.
    pub fn calc_strides(&mut self) {
        let n = self.ndim as usize;
        self.strides = [0; MAX_DIMS];
        let mut acc: i32 = 1;
        for d in (0..n).rev() {
            self.strides[d] = acc;
            acc *= self.shape[d].max(1);
        }
    }

    /// Shape-only equality, ignoring dtype and strides.
    pub fn shape_eq(&self, other: &TypeInfo) -> bool {
        self.ndim == other.ndim && self.shape[..self.ndim as usize] == other.shape[..other.ndim as usize]
    }

    /// NumPy-style right-aligned broadcast of two shapes. Returns the
    /// broadcast result shape (dtype left `Unknown` for the caller's dtype
    /// rule) or `None` when the shapes are incompatible.
    pub fn broadcast(a: &TypeInfo, b: &TypeInfo) -> Option<TypeInfo> {
        let ndim = a.ndim.max(b.ndim);
        let mut out = TypeInfo {
            dtype: Dtype::Unknown,
            ndim,
            shape: [0; MAX_DIMS],
            strides: [0; MAX_DIMS],
        };
        for i in 0..ndim as i32 {
            // Walk axes from the back so shorter shapes align right.
            let axis = ndim as i32 - 1 - i;
            let da = axis - (ndim as i32 - a.ndim as i32);
            let db = axis - (ndim as i32 - b.ndim as i32);
            let sa = if da >= 0 { a.shape[da as usize] } else { 1 };
            let sb = if db >= 0 { b.shape[db as usize] } else { 1 };
            if sa != sb && sa != 1 && sb != 1 {
                return None;
            }
            out.shape[axis as usize] = sa.max(sb);
        }
        out.calc_strides();
        Some(out)
    }

    /// True when this shape can broadcast against `other` in either role.
    pub fn broadcast_compatible(&self, other: &TypeInfo) -> bool {
        TypeInfo::broadcast(self, other).is_some()
    }

    /// Per-axis *element* strides of this operand when iterated over
    /// `domain`: `0` where the operand broadcasts (dimension 1 or absent),
    /// the contiguous stride otherwise.
    pub fn broadcast_strides(&self, domain: &TypeInfo) -> [i32; MAX_DIMS] {
        let mut out = [0i32; MAX_DIMS];
        let shift = domain.ndim as i32 - self.ndim as i32;
        for d in 0..domain.ndim as usize {
            let axis = d as i32 - shift;
            if axis < 0 {
                continue;
            }
            let axis = axis as usize;
            if self.shape[axis] != 1 {
                out[d] = self.strides[axis];
            }
        }
        out
    }

    /// Format the shape as `[d0, d1, ...]` for diagnostics.
    pub fn format_shape(&self) -> String {
        ShapeDisplay(self).to_string()
    }
}

struct ShapeDisplay<'a>(&'a TypeInfo);

impl fmt::Display for ShapeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for d in 0..self.0.ndim as usize {
            if d > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", self.0.shape[d])?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_strides() {
        let info = TypeInfo::with_shape(Dtype::F32, &[2, 3, 4]);
        assert_eq!(&info.strides[..3], &[12, 4, 1]);
        assert_eq!(info.element_count(), 24);
    }

    #[test]
    fn test_broadcast_right_aligned() {
        let a = TypeInfo::with_shape(Dtype::F32, &[3, 1]);
        let b = TypeInfo::with_shape(Dtype::F32, &[1, 2]);
        let out = TypeInfo::broadcast(&a, &b).unwrap();
        assert_eq!(&out.shape[..2], &[3, 2]);

        let c = TypeInfo::with_shape(Dtype::F32, &[4, 2]);
        assert!(TypeInfo::broadcast(&a, &c).is_none());
    }

    #[test]
    fn test_broadcast_scalar() {
        let a = TypeInfo::with_shape(Dtype::F32, &[5]);
        let s = TypeInfo::scalar(Dtype::F32);
        let out = TypeInfo::broadcast(&a, &s).unwrap();
        assert_eq!(out.ndim, 1);
        assert_eq!(out.shape[0], 5);
    }

    #[test]
    fn test_broadcast_strides_zero_for_scalar() {
        let dom = TypeInfo::with_shape(Dtype::F32, &[8, 4]);
        let s = TypeInfo::scalar(Dtype::F32);
        assert_eq!(s.broadcast_strides(&dom), [0, 0, 0, 0]);

        let col = TypeInfo::with_shape(Dtype::F32, &[8, 1]);
        assert_eq!(col.broadcast_strides(&dom), [1, 0, 0, 0]);
    }

    #[test]
    fn test_format_shape() {
        assert_eq!(TypeInfo::with_shape(Dtype::F32, &[3]).format_shape(), "[3]");
        assert_eq!(
            TypeInfo::with_shape(Dtype::F32, &[3, 4]).format_shape(),
            "[3, 4]"
        );
        assert_eq!(TypeInfo::scalar(Dtype::F32).format_shape(), "[]");
    }
}
