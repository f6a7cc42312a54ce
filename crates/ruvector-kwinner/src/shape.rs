//! Three-dimensional shape descriptors.
//!
//! Shapes are bookkeeping only: the layer reports them to the surrounding
//! runtime and derives its flattened input size from them. All computation
//! happens on flattened per-sample vectors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KWinnerError, Result};

/// Width x height x depth size tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape3d {
    /// Innermost extent.
    pub width: usize,
    /// Middle extent.
    pub height: usize,
    /// Outermost extent (channels).
    pub depth: usize,
}

impl Shape3d {
    /// Create a shape from explicit extents.
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Build a shape from one to three extents, padding missing trailing
    /// extents with 1.
    ///
    /// # Errors
    ///
    /// Returns [`KWinnerError::InvalidShape`] for an empty slice, more than
    /// three extents, any zero extent, or an element count that overflows
    /// `usize`.
    ///
    /// # Example
    ///
    /// ```
    /// use ruvector_kwinner::Shape3d;
    ///
    /// let shape = Shape3d::from_dims(&[120]).unwrap();
    /// assert_eq!(shape, Shape3d::new(120, 1, 1));
    /// assert_eq!(shape.size(), 120);
    /// ```
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        if dims.is_empty() || dims.len() > 3 {
            return Err(KWinnerError::InvalidShape(format!(
                "expected 1 to 3 extents, got {}",
                dims.len()
            )));
        }
        if let Some(pos) = dims.iter().position(|&d| d == 0) {
            return Err(KWinnerError::InvalidShape(format!(
                "extent {} is zero in {:?}",
                pos, dims
            )));
        }

        let mut padded = [1usize; 3];
        padded[..dims.len()].copy_from_slice(dims);
        let shape = Self::new(padded[0], padded[1], padded[2]);
        shape.validate()?;
        Ok(shape)
    }

    /// Total element count.
    ///
    /// Only meaningful for a shape that passed [`Shape3d::validate`].
    pub fn size(&self) -> usize {
        self.width * self.height * self.depth
    }

    /// Element count, or `None` if it overflows `usize`.
    pub fn checked_size(&self) -> Option<usize> {
        self.width
            .checked_mul(self.height)
            .and_then(|wh| wh.checked_mul(self.depth))
    }

    /// Check every extent is non-zero and the element count fits in `usize`.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(KWinnerError::InvalidShape(format!(
                "zero extent in {}",
                self
            )));
        }
        if self.checked_size().is_none() {
            return Err(KWinnerError::InvalidShape(format!(
                "element count of {} overflows usize",
                self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Shape3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.depth)
    }
}
