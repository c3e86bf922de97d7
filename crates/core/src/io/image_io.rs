//! Reference and annotation image loading through the `image` crate
//!
//! Annotations are usually drawn in an image editor and saved as PNG, so
//! these files go through `image` rather than the GeoTIFF reader. Samples
//! are normalised to 8 bits per channel.

use crate::error::{Error, Result};
use crate::raster::BandStack;
use image::DynamicImage;
use std::path::Path;

/// Read an image file into a (band, row, col) stack of 8-bit samples
pub fn read_image<P: AsRef<Path>>(path: P) -> Result<BandStack<u8>> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|e| Error::Image(format!("{}: {}", path.display(), e)))?;
    into_band_stack(img)
}

/// Decode an encoded image held in memory
pub fn read_image_from_buffer(data: &[u8]) -> Result<BandStack<u8>> {
    let img = image::load_from_memory(data)?;
    into_band_stack(img)
}

fn into_band_stack(img: DynamicImage) -> Result<BandStack<u8>> {
    let rows = img.height() as usize;
    let cols = img.width() as usize;
    let bands = img.color().channel_count() as usize;

    let samples = match bands {
        1 => img.into_luma8().into_raw(),
        2 => img.into_luma_alpha8().into_raw(),
        3 => img.into_rgb8().into_raw(),
        4 => img.into_rgba8().into_raw(),
        n => {
            return Err(Error::UnsupportedDataType(format!(
                "images with {} channels are not supported",
                n
            )))
        }
    };

    BandStack::from_interleaved(&samples, bands, rows, cols)
}
