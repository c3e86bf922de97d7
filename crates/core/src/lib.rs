//! # OCDC Core
//!
//! Core types, traits and I/O for orthomosaic color distance classification.
//!
//! This crate provides:
//! - `BandStack<T>`: multi-band raster indexed (band, row, col)
//! - `Raster<T>`: single-band raster, used for distance maps
//! - `GeoTransform` and `PixelWindow`
//! - The shared error taxonomy
//! - Raster sources, image loading and GeoTIFF output
//! - The `DistanceModel` trait the tiling pipeline drives

pub mod error;
pub mod io;
pub mod raster;

pub use error::{Error, ErrorKind, Result};
pub use raster::{BandStack, GeoTransform, PixelWindow, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::io::RasterSource;
    pub use crate::raster::{BandStack, GeoTransform, PixelWindow, Raster, RasterElement};
    pub use crate::DistanceModel;
}

/// A fitted model that scores every pixel of an image by its dissimilarity
/// to a reference class.
///
/// Models are fitted once and then queried tile after tile, possibly from
/// several threads, so queries take `&self`.
pub trait DistanceModel: Send + Sync {
    /// Short model name, used in logs and error messages
    fn name(&self) -> &'static str;

    /// Bands of the input image the model reads, in model order
    fn bands_to_use(&self) -> &[usize];

    /// Prepare raw tile samples before distances are computed.
    ///
    /// The default passes the tile through unchanged.
    fn preprocess(&self, image: BandStack<f64>) -> Result<BandStack<f64>> {
        Ok(image)
    }

    /// Per-pixel distance map with the row/column extent of `image`.
    ///
    /// Values are non-negative and grow with dissimilarity.
    fn calculate_distance(&self, image: &BandStack<f64>) -> Result<Raster<f64>>;
}
