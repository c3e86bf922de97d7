//! Seam between the tiling pipeline and whatever holds the target raster

use crate::error::Result;
use crate::raster::{BandStack, GeoTransform, PixelWindow, RasterElement};

/// A multi-band raster that can be read one window at a time.
///
/// Reads take `&self` so that tiles can be fetched from several threads.
pub trait RasterSource: Send + Sync {
    /// Dimensions as (bands, rows, cols)
    fn shape(&self) -> (usize, usize, usize);

    /// Georeferencing of the full raster
    fn geo_transform(&self) -> GeoTransform {
        GeoTransform::default()
    }

    /// Materialise one window as `f64` samples, georeferenced to its origin
    fn read_window(&self, window: &PixelWindow) -> Result<BandStack<f64>>;
}

impl<T: RasterElement> RasterSource for BandStack<T> {
    fn shape(&self) -> (usize, usize, usize) {
        BandStack::shape(self)
    }

    fn geo_transform(&self) -> GeoTransform {
        *self.transform()
    }

    fn read_window(&self, window: &PixelWindow) -> Result<BandStack<f64>> {
        Ok(self.window(window)?.to_f64())
    }
}
