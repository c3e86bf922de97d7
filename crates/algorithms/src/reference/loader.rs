//! Sources for the reference image and its annotation mask

use ocdc_core::io::read_image;
use ocdc_core::{BandStack, Result};
use std::path::{Path, PathBuf};

/// Supplies the reference image and the annotation mask drawn over it.
///
/// [`ReferencePixels`](super::ReferencePixels) only depends on this trait,
/// so validation and extraction run the same way on files and on arrays
/// built in memory.
pub trait ReferenceLoader {
    fn load_reference(&self) -> Result<BandStack<f64>>;
    fn load_mask(&self) -> Result<BandStack<f64>>;
}

/// Loads both images from disk (PNG, TIFF or JPEG)
#[derive(Debug, Clone)]
pub struct FileReferenceLoader {
    reference: PathBuf,
    annotated: PathBuf,
}

impl FileReferenceLoader {
    pub fn new(reference: impl AsRef<Path>, annotated: impl AsRef<Path>) -> Self {
        Self {
            reference: reference.as_ref().to_path_buf(),
            annotated: annotated.as_ref().to_path_buf(),
        }
    }
}

impl ReferenceLoader for FileReferenceLoader {
    fn load_reference(&self) -> Result<BandStack<f64>> {
        Ok(read_image(&self.reference)?.to_f64())
    }

    fn load_mask(&self) -> Result<BandStack<f64>> {
        Ok(read_image(&self.annotated)?.to_f64())
    }
}

/// Hands out arrays that are already in memory
#[derive(Debug, Clone)]
pub struct InMemoryReferenceLoader {
    reference: BandStack<f64>,
    mask: BandStack<f64>,
}

impl InMemoryReferenceLoader {
    pub fn new(reference: BandStack<f64>, mask: BandStack<f64>) -> Self {
        Self { reference, mask }
    }
}

impl ReferenceLoader for InMemoryReferenceLoader {
    fn load_reference(&self) -> Result<BandStack<f64>> {
        Ok(self.reference.clone())
    }

    fn load_mask(&self) -> Result<BandStack<f64>> {
        Ok(self.mask.clone())
    }
}
