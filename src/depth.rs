//! Depth buffer linearization
//!
//! Rendering engines store depth as a non-linear value in `[0, 1]`, optionally
//! with the range reversed (1 at the near plane). This module converts those
//! samples back into metric distances along the view axis.
//!
//! The conversion is the exact inverse of the perspective depth encoding
//! `d01 = far * (z - near) / (z * (far - near))`:
//!
//! ```text
//! z = near * far / (far - d01 * (far - near))
//! ```
//!
//! Samples within [`EDGE_EPSILON`] of either end snap to the plane itself and
//! every result is clamped to `[near, 2 * far]`.

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, Result};

/// Distance from 0 or 1 below which a sample snaps to the near/far plane
pub const EDGE_EPSILON: f32 = 1e-4;

/// Convert one raw depth sample into a linear distance.
///
/// `near` must be positive and `far` greater than `near`; callers that hold a
/// validated [`DepthRange`] should prefer [`DepthRange::linearize`].
#[inline]
pub fn linearize(raw: f32, near: f32, far: f32, reversed: bool) -> f32 {
    let depth01 = if reversed { 1.0 - raw } else { raw };

    if depth01 <= EDGE_EPSILON {
        return near;
    }
    if depth01 >= 1.0 - EDGE_EPSILON {
        return far;
    }

    let linear = (near * far) / (far - depth01 * (far - near));
    // NaN samples fall through max/min as `near`
    linear.max(near).min(2.0 * far)
}

/// Swap rows `y` and `rows - 1 - y` for every `y < rows / 2`.
///
/// `buf` is row-major with `row_len` elements per row.
pub fn flip_rows<T>(buf: &mut [T], row_len: usize, rows: usize) {
    debug_assert!(buf.len() >= row_len * rows);
    for y in 0..rows / 2 {
        let (top, bottom) = buf.split_at_mut((rows - 1 - y) * row_len);
        top[y * row_len..(y + 1) * row_len].swap_with_slice(&mut bottom[..row_len]);
    }
}

/// Flip a `width x height` single-channel depth image upside down in place
pub fn flip_vertical(buf: &mut [f32], width: usize, height: usize) {
    flip_rows(buf, width, height);
}

/// Near/far planes plus the depth convention of one camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthRange {
    /// Near clip plane distance (metres)
    pub near: f32,
    /// Far clip plane distance (metres)
    pub far: f32,
    /// Whether the depth buffer stores 1 at the near plane
    pub reversed: bool,
}

impl DepthRange {
    /// Create a validated depth range
    pub fn new(near: f32, far: f32, reversed: bool) -> Result<Self> {
        let range = Self {
            near,
            far,
            reversed,
        };
        range.validate()?;
        Ok(range)
    }

    /// Check `0 < near < far` with finite values
    pub fn validate(&self) -> Result<()> {
        if !(self.near.is_finite() && self.near > 0.0) {
            return Err(CaptureError::invalid_parameter(
                "near",
                "Near plane must be positive and finite",
            ));
        }
        if !(self.far.is_finite() && self.far > self.near) {
            return Err(CaptureError::invalid_parameter(
                "far",
                "Far plane must be finite and greater than near",
            ));
        }
        Ok(())
    }

    /// Linearize one sample
    #[inline]
    pub fn linearize(&self, raw: f32) -> f32 {
        linearize(raw, self.near, self.far, self.reversed)
    }

    /// Linearize a whole buffer in place
    pub fn linearize_in_place(&self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = linearize(*sample, self.near, self.far, self.reversed);
        }
    }

    /// Raw depth-buffer value a renderer would store for `distance`
    pub fn encode(&self, distance: f32) -> f32 {
        let depth01 = self.far * (distance - self.near) / (distance * (self.far - self.near));
        if self.reversed {
            1.0 - depth01
        } else {
            depth01
        }
    }

    /// Raw value that linearizes to the far plane, used to pad short transfers
    pub fn far_plane_sample(&self) -> f32 {
        if self.reversed {
            0.0
        } else {
            1.0
        }
    }
}

impl Default for DepthRange {
    fn default() -> Self {
        Self {
            near: 0.1,
            far: 100.0,
            reversed: true,
        }
    }
}
