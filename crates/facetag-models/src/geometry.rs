//! Face geometry and the normalized-to-pixel coordinate mapping.
//!
//! Detection providers report faces as boxes in **normalized space**
//! (`0.0..=1.0` relative to the image edges). Cropping needs **pixel space**
//! rectangles. [`map_box`] converts between the two:
//!
//! ```text
//! x      = round(W * x_min)
//! y      = round(H * y_min)
//! width  = round(W * x_max) - x
//! height = round(H * y_max) - y
//! ```
//!
//! Rounding is half away from zero (`f64::round`), so the same box and image
//! size always map to the same rectangle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when a normalized box cannot become a pixel rectangle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("Coordinate {field}={value} is outside [0, 1]")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Mapped rectangle is degenerate ({width}x{height})")]
    Degenerate { width: i64, height: i64 },
}

/// A face box in normalized coordinates, as returned by the detection provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl NormalizedBox {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self { x_min, x_max, y_min, y_max }
    }

    fn validate(&self) -> Result<(), GeometryError> {
        let fields = [
            ("x_min", self.x_min),
            ("x_max", self.x_max),
            ("y_min", self.y_min),
            ("y_max", self.y_max),
        ];
        for (field, value) in fields {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(GeometryError::OutOfRange { field, value });
            }
        }
        Ok(())
    }
}

/// A face rectangle in source-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBounds {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Clip the rectangle to an image of the given size.
    ///
    /// Returns `None` when nothing of the rectangle remains inside the image.
    pub fn clamped_to(&self, image_width: u32, image_height: u32) -> Option<FaceBounds> {
        let x = self.x.min(image_width);
        let y = self.y.min(image_height);
        let right = self.x.saturating_add(self.width).min(image_width);
        let bottom = self.y.saturating_add(self.height).min(image_height);

        let width = right.saturating_sub(x);
        let height = bottom.saturating_sub(y);
        if width == 0 || height == 0 {
            return None;
        }

        Some(FaceBounds { x, y, width, height })
    }
}

/// Map a normalized box onto an image of `width` x `height` pixels.
pub fn map_box(width: u32, height: u32, bbox: &NormalizedBox) -> Result<FaceBounds, GeometryError> {
    if width == 0 || height == 0 {
        return Err(GeometryError::EmptyImage { width, height });
    }
    bbox.validate()?;

    let w = f64::from(width);
    let h = f64::from(height);

    let x = (w * bbox.x_min).round() as i64;
    let y = (h * bbox.y_min).round() as i64;
    let mapped_width = (w * bbox.x_max).round() as i64 - x;
    let mapped_height = (h * bbox.y_max).round() as i64 - y;

    if mapped_width <= 0 || mapped_height <= 0 {
        return Err(GeometryError::Degenerate {
            width: mapped_width,
            height: mapped_height,
        });
    }

    // All four values are bounded by the u32 image size after validation.
    Ok(FaceBounds {
        x: x as u32,
        y: y as u32,
        width: mapped_width as u32,
        height: mapped_height as u32,
    })
}
