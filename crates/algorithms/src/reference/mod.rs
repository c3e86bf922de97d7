//! Reference pixels
//!
//! Extracts the samples of the class of interest from a reference image and
//! an annotation mask drawn over it:
//!
//! 1. the alpha channel and band selection are validated against the
//!    reference image,
//! 2. the mask must have 1 band or as many bands as the reference image,
//! 3. selected pixels are gathered (row-major) into a pixels x bands table,
//! 4. at least `min_pixels` samples are required,
//! 5. the optional transform is applied to the table.

mod loader;
mod mask;

pub use loader::{FileReferenceLoader, InMemoryReferenceLoader, ReferenceLoader};
pub use mask::AnnotationRule;

use crate::transform::Transform;
use ndarray::{Array2, ArrayView2};
use ocdc_core::{BandStack, Error, Result};
use std::path::Path;
use tracing::debug;

/// Parameters for reference pixel extraction
#[derive(Debug, Clone)]
pub struct ReferenceParams {
    /// Bands to use, in order. `None` selects every band except the alpha channel
    pub bands_to_use: Option<Vec<i64>>,
    /// Alpha channel index, `-1` for none (default: -1)
    pub alpha_channel: i64,
    /// Transform applied to the extracted samples
    pub transform: Option<Transform>,
    /// Minimum number of annotated pixels (default: 100)
    pub min_pixels: usize,
    /// How the annotation mask is read
    pub rule: AnnotationRule,
}

impl Default for ReferenceParams {
    fn default() -> Self {
        Self {
            bands_to_use: None,
            alpha_channel: -1,
            transform: None,
            min_pixels: 100,
            rule: AnnotationRule::default(),
        }
    }
}

/// Validate an alpha channel index; `-1` means the image has none.
pub fn resolve_alpha(alpha_channel: i64, num_bands: usize) -> Result<Option<usize>> {
    if alpha_channel < -1 || alpha_channel >= num_bands as i64 {
        return Err(Error::AlphaOutOfRange {
            alpha: alpha_channel,
            max: num_bands.saturating_sub(1),
        });
    }
    Ok(usize::try_from(alpha_channel).ok())
}

/// Resolve the band selection for an image with `num_bands` bands.
///
/// The alpha channel is checked first. Without an explicit list every band
/// except the alpha channel is used; an explicit list is returned unchanged
/// once every entry is in range and unique.
pub fn resolve_bands(
    requested: Option<&[i64]>,
    alpha_channel: i64,
    num_bands: usize,
) -> Result<Vec<usize>> {
    let alpha = resolve_alpha(alpha_channel, num_bands)?;

    let bands: Vec<usize> = match requested {
        None => (0..num_bands).filter(|&b| Some(b) != alpha).collect(),
        Some(list) => {
            let mut bands = Vec::with_capacity(list.len());
            for &band in list {
                if band < 0 || band >= num_bands as i64 {
                    return Err(Error::BandOutOfRange {
                        band,
                        max: num_bands.saturating_sub(1),
                    });
                }
                let band = band as usize;
                if bands.contains(&band) {
                    return Err(Error::DuplicateBand(band));
                }
                bands.push(band);
            }
            bands
        }
    };

    if bands.is_empty() {
        return Err(Error::InvalidParameter {
            name: "bands_to_use",
            value: format!("{:?}", requested),
            reason: "no bands left to use".into(),
        });
    }
    Ok(bands)
}

/// Samples of the reference class, one row per annotated pixel and one
/// column per selected band.
#[derive(Debug, Clone)]
pub struct ReferencePixels {
    bands_to_use: Vec<usize>,
    alpha_channel: Option<usize>,
    values: Array2<f64>,
    transform: Option<Transform>,
}

impl ReferencePixels {
    /// Load from a reference image and annotation mask on disk
    pub fn from_paths(
        reference: impl AsRef<Path>,
        annotated: impl AsRef<Path>,
        params: ReferenceParams,
    ) -> Result<Self> {
        Self::load(&FileReferenceLoader::new(reference, annotated), params)
    }

    /// Load through any [`ReferenceLoader`]
    pub fn load<L: ReferenceLoader + ?Sized>(loader: &L, params: ReferenceParams) -> Result<Self> {
        let reference = loader.load_reference()?;
        let mask = loader.load_mask()?;
        Self::from_images(&reference, &mask, params)
    }

    /// Validate and extract from images already in memory
    pub fn from_images(
        reference: &BandStack<f64>,
        mask: &BandStack<f64>,
        params: ReferenceParams,
    ) -> Result<Self> {
        let num_bands = reference.bands();
        let alpha_channel = resolve_alpha(params.alpha_channel, num_bands)?;
        let bands_to_use = resolve_bands(params.bands_to_use.as_deref(), params.alpha_channel, num_bands)?;

        if mask.bands() != 1 && mask.bands() != num_bands {
            return Err(Error::MaskShape {
                mask_bands: mask.bands(),
                image_bands: num_bands,
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

        let selected = params.rule.select(mask, reference)?;
        let count = selected.iter().filter(|&&s| s).count();
        if count < params.min_pixels {
            return Err(Error::InsufficientSamples {
                required: params.min_pixels,
                actual: count,
            });
        }

        let data = reference.data();
        let mut values = Array2::zeros((count, bands_to_use.len()));
        for (mut out, ((row, col), _)) in values
            .rows_mut()
            .into_iter()
            .zip(selected.indexed_iter().filter(|&(_, &s)| s))
        {
            for (j, &band) in bands_to_use.iter().enumerate() {
                out[j] = data[[band, row, col]];
            }
        }

        if let Some(transform) = &params.transform {
            transform.apply_array(&mut values)?;
        }

        debug!(
            "Extracted {} reference pixels over bands {:?} (mask has {} band(s))",
            count,
            bands_to_use,
            mask.bands()
        );

        Ok(Self {
            bands_to_use,
            alpha_channel,
            values,
            transform: params.transform,
        })
    }

    /// Wrap an existing sample table.
    ///
    /// `values` must already be transformed; `transform` is kept so that
    /// target images can be mapped the same way.
    pub fn from_values(
        bands_to_use: Vec<usize>,
        values: Array2<f64>,
        transform: Option<Transform>,
    ) -> Result<Self> {
        if values.ncols() != bands_to_use.len() {
            return Err(Error::SizeMismatch {
                er: values.nrows(),
                ec: bands_to_use.len(),
                ar: values.nrows(),
                ac: values.ncols(),
            });
        }
        Ok(Self {
            bands_to_use,
            alpha_channel: None,
            values,
            transform,
        })
    }

    pub fn bands_to_use(&self) -> &[usize] {
        &self.bands_to_use
    }

    pub fn alpha_channel(&self) -> Option<usize> {
        self.alpha_channel
    }

    /// Sample table, pixels x bands
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }
}
