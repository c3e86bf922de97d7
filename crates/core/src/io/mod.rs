//! I/O for reference images, annotation masks, orthomosaics and output tiles

mod image_io;
mod native;
mod source;

pub use image_io::{read_image, read_image_from_buffer};
pub use native::{write_geotiff, write_geotiff_to_buffer, TiffSource};
pub use source::RasterSource;
