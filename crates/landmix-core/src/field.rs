use serde::{Deserialize, Serialize};

use crate::error::{LumError, Result};

/// A 2D scalar field aligned with a [`Grid`](crate::grid::Grid), row-major.
/// Rows follow the latitude axis, columns the longitude axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridField {
    /// Row-major cell values.
    pub data: Vec<f64>,
    pub width: usize,
    pub height: usize,
}

impl GridField {
    /// Create a new field filled with the given value.
    pub fn new(width: usize, height: usize, fill: f64) -> Self {
        Self { data: vec![fill; width * height], width, height }
    }

    pub fn zeros(width: usize, height: usize) -> Self {
        Self::new(width, height, 0.0)
    }

    /// Wrap existing row-major data, checking its length.
    pub fn from_vec(width: usize, height: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != width * height {
            return Err(LumError::ShapeMismatch {
                expected: (height, width),
                actual: (data.len(), 1),
            });
        }
        Ok(Self { data, width, height })
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        self.data[row * self.width + col] = val;
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Sum of the finite cells only.
    pub fn finite_sum(&self) -> f64 {
        self.data.iter().filter(|v| v.is_finite()).sum()
    }

    pub fn min_value(&self) -> f64 {
        self.data.iter().cloned().fold(f64::INFINITY, f64::min)
    }

    pub fn max_value(&self) -> f64 {
        self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Divide every cell by the field's finite sum so the cells sum to 1.
    /// Returns `None` when the sum is zero or not finite.
    pub fn normalized(&self) -> Option<Self> {
        let total = self.finite_sum();
        if !(total.is_finite() && total != 0.0) {
            return None;
        }
        Some(Self {
            data: self.data.iter().map(|v| v / total).collect(),
            width: self.width,
            height: self.height,
        })
    }

    /// Fail with [`LumError::ShapeMismatch`] unless `other` has the same shape.
    pub fn ensure_same_shape(&self, other: &Self) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(LumError::ShapeMismatch {
                expected: self.shape(),
                actual: other.shape(),
            });
        }
        Ok(())
    }
}
