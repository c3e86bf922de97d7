//! Interpretation of annotation masks

use ndarray::Array2;
use ocdc_core::{BandStack, Error, Result};

/// Decides which mask pixels mark the reference class.
///
/// Single-band masks are thresholded. Colour masks (same band count as the
/// reference image) select the pixels the annotator painted over: red
/// tagged in the mask and different from the reference pixel underneath.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotationRule {
    /// Greyscale masks select values strictly above this
    pub grey_threshold: f64,
    /// Colour masks need a red channel of at least this
    pub red_min: f64,
    /// ... and green and blue channels of at most this
    pub other_max: f64,
}

impl Default for AnnotationRule {
    fn default() -> Self {
        Self {
            grey_threshold: 127.0,
            red_min: 250.0,
            other_max: 5.0,
        }
    }
}

impl AnnotationRule {
    /// Selection map with the row/column extent of `mask`.
    ///
    /// `reference` is the image the mask annotates; colour masks are
    /// compared against it pixel by pixel.
    pub fn select(&self, mask: &BandStack<f64>, reference: &BandStack<f64>) -> Result<Array2<bool>> {
        let bands = mask.bands();
        let image_bands = reference.bands();

        if bands == 1 || (bands == image_bands && bands < 3) {
            let grey = mask.band(0)?;
            return Ok(grey.mapv(|v| v > self.grey_threshold));
        }

        if bands != image_bands {
            return Err(Error::MaskShape {
                mask_bands: bands,
                image_bands,
            });
        }
        if (mask.rows(), mask.cols()) != (reference.rows(), reference.cols()) {
            return Err(Error::SizeMismatch {
                er: reference.rows(),
                ec: reference.cols(),
                ar: mask.rows(),
                ac: mask.cols(),
            });
        }

        let m = mask.data();
        let img = reference.data();
        Ok(Array2::from_shape_fn((mask.rows(), mask.cols()), |(row, col)| {
            let (r, g, b) = (m[[0, row, col]], m[[1, row, col]], m[[2, row, col]]);
            let tagged = r >= self.red_min && g <= self.other_max && b <= self.other_max;
            tagged && (0..3).any(|band| m[[band, row, col]] != img[[band, row, col]])
        }))
    }
}
