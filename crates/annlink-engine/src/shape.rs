//! Tensor shapes and the packed wire encoding used by the backend.
//!
//! The backend reports a tensor's shape as a single `u64`: 16 bits per
//! dimension, least dimension first, terminated implicitly when the
//! remaining value is zero. A `u64` therefore holds at most [`MAX_RANK`]
//! dimensions of up to 65535 each.

use std::fmt;

use crate::error::{EngineError, Result};

/// Maximum number of dimensions representable in a packed shape.
pub const MAX_RANK: usize = 4;

const DIM_BITS: u32 = 16;
const DIM_MASK: u64 = 0xFFFF;

/// Which tensor of a network a shape or buffer refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorRole {
    Input,
    Output,
}

impl TensorRole {
    /// Value of the `is_input` flag in the backend ABI.
    pub fn is_input(self) -> bool {
        matches!(self, TensorRole::Input)
    }
}

impl fmt::Display for TensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorRole::Input => f.write_str("input"),
            TensorRole::Output => f.write_str("output"),
        }
    }
}

/// Ordered dimension sizes of one tensor.
///
/// Dimension order is whatever the backend reports; it is preserved
/// faithfully and never reinterpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorShape(Vec<usize>);

impl TensorShape {
    /// Create a shape from a dimension list.
    pub fn new(dims: Vec<usize>) -> Self {
        TensorShape(dims)
    }

    /// Decode a packed shape value.
    ///
    /// Takes the low 16 bits as the next dimension and shifts right until
    /// the remaining value is zero. Fails with
    /// [`EngineError::MalformedShape`] when the value is zero (no
    /// dimensions), contains a zero dimension, or would exceed
    /// [`MAX_RANK`].
    pub fn unpack(packed: u64) -> Result<Self> {
        if packed == 0 {
            return Err(EngineError::MalformedShape {
                packed,
                detail: "no dimensions".to_string(),
            });
        }

        let mut dims = Vec::new();
        let mut rest = packed;
        while rest != 0 {
            if dims.len() == MAX_RANK {
                return Err(EngineError::MalformedShape {
                    packed,
                    detail: format!("rank exceeds {MAX_RANK}"),
                });
            }
            let dim = (rest & DIM_MASK) as usize;
            if dim == 0 {
                return Err(EngineError::MalformedShape {
                    packed,
                    detail: "zero dimension".to_string(),
                });
            }
            dims.push(dim);
            rest >>= DIM_BITS;
        }

        Ok(TensorShape(dims))
    }

    /// Encode this shape into a packed value, bit-exact to the backend's
    /// own packing. Fails with [`EngineError::MalformedShape`] for shapes
    /// the wire format cannot represent.
    pub fn pack(&self) -> Result<u64> {
        if self.0.is_empty() {
            return Err(EngineError::MalformedShape {
                packed: 0,
                detail: "no dimensions".to_string(),
            });
        }
        if self.0.len() > MAX_RANK {
            return Err(EngineError::MalformedShape {
                packed: 0,
                detail: format!("rank {} exceeds {MAX_RANK}", self.0.len()),
            });
        }

        let mut packed = 0u64;
        for (i, &dim) in self.0.iter().enumerate() {
            if dim == 0 {
                return Err(EngineError::MalformedShape {
                    packed: 0,
                    detail: "zero dimension".to_string(),
                });
            }
            if dim > DIM_MASK as usize {
                return Err(EngineError::MalformedShape {
                    packed: 0,
                    detail: format!("dimension {dim} exceeds 16 bits"),
                });
            }
            packed |= (dim as u64) << (i as u32 * DIM_BITS);
        }

        Ok(packed)
    }

    /// Dimension sizes in backend order.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements.
    pub fn element_count(&self) -> usize {
        self.0.iter().product()
    }

    /// True if the shape has no dimensions.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<usize>> for TensorShape {
    fn from(dims: Vec<usize>) -> Self {
        TensorShape(dims)
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        TensorShape(dims.to_vec())
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("()");
        }
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("x")?;
            }
            write!(f, "{dim}")?;
        }
        Ok(())
    }
}
