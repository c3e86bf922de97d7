//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and geographic coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// For north-up images, `row_rotation` and `col_rotation` are typically 0,
/// and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about Y axis (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Geographic coordinates of the top-left corner of a pixel
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        let col_f = col as f64;
        let row_f = row as f64;

        let x = self.origin_x + col_f * self.pixel_width + row_f * self.row_rotation;
        let y = self.origin_y + col_f * self.col_rotation + row_f * self.pixel_height;

        (x, y)
    }

    /// Transform of a sub-window starting at (`row_offset`, `col_offset`)
    /// whose pixels are `scale` source pixels wide.
    pub fn window(&self, row_offset: usize, col_offset: usize, scale: usize) -> Self {
        let (origin_x, origin_y) = self.pixel_to_geo_corner(col_offset, row_offset);
        let s = scale.max(1) as f64;
        Self {
            origin_x,
            origin_y,
            pixel_width: self.pixel_width * s,
            pixel_height: self.pixel_height * s,
            row_rotation: self.row_rotation * s,
            col_rotation: self.col_rotation * s,
        }
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_corner() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        let (x, y) = gt.pixel_to_geo_corner(5, 10);
        assert_relative_eq!(x, 150.0, epsilon = 1e-10);
        assert_relative_eq!(y, 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_window_offsets_and_scales() {
        let gt = GeoTransform::new(500.0, 1000.0, 0.5, -0.5);
        let w = gt.window(3000, 6000, 5);

        assert_relative_eq!(w.origin_x, 500.0 + 6000.0 * 0.5, epsilon = 1e-10);
        assert_relative_eq!(w.origin_y, 1000.0 - 3000.0 * 0.5, epsilon = 1e-10);
        assert_relative_eq!(w.pixel_width, 2.5, epsilon = 1e-10);
        assert_relative_eq!(w.pixel_height, -2.5, epsilon = 1e-10);
        assert_eq!(gt.window(0, 0, 1), gt);
    }
}
