//! Color models
//!
//! Statistical models of the reference class in band space. Each model is
//! fitted once from reference samples and then scores every pixel of any
//! image carrying the same bands:
//!
//! - **Mahalanobis**: covariance-weighted distance to the sample mean
//! - **Gaussian mixture**: log-likelihood drop under a fitted mixture
//!
//! Distances are non-negative and grow with dissimilarity. Their scales
//! differ between the two models.

mod gmm;
mod kmeans;
mod linalg;
mod mahalanobis;

pub use gmm::{GaussianMixtureModelDistance, GmmParams};
pub use mahalanobis::MahalanobisDistance;

use crate::maybe_rayon::*;
use crate::reference::ReferencePixels;
use ocdc_core::{BandStack, DistanceModel, Error, Raster, Result};
use std::fmt;
use std::str::FromStr;

/// Distance method selected by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Mahalanobis,
    GaussianMixture,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Mahalanobis => "mahalanobis",
            Method::GaussianMixture => "gmm",
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mahalanobis" => Ok(Method::Mahalanobis),
            "gmm" => Ok(Method::GaussianMixture),
            other => Err(Error::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fitted color model of either kind
#[derive(Debug, Clone)]
pub enum ColorModel {
    Mahalanobis(MahalanobisDistance),
    GaussianMixture(GaussianMixtureModelDistance),
}

impl ColorModel {
    /// Fit the selected method to reference pixels.
    ///
    /// `param` is the number of mixture components for `gmm` and is
    /// ignored by `mahalanobis`.
    pub fn fit(method: Method, param: f64, reference: &ReferencePixels) -> Result<Self> {
        match method {
            Method::Mahalanobis => Ok(ColorModel::Mahalanobis(MahalanobisDistance::from_reference(reference)?)),
            Method::GaussianMixture => {
                if !(param.is_finite() && param.fract() == 0.0 && param >= 0.0) {
                    return Err(Error::InvalidParameter {
                        name: "param",
                        value: param.to_string(),
                        reason: "the number of mixture components must be a whole number".into(),
                    });
                }
                let params = GmmParams::with_components(param as usize);
                Ok(ColorModel::GaussianMixture(GaussianMixtureModelDistance::from_reference(
                    reference, &params,
                )?))
            }
        }
    }

    pub fn method(&self) -> Method {
        match self {
            ColorModel::Mahalanobis(_) => Method::Mahalanobis,
            ColorModel::GaussianMixture(_) => Method::GaussianMixture,
        }
    }

    fn inner(&self) -> &dyn DistanceModel {
        match self {
            ColorModel::Mahalanobis(m) => m,
            ColorModel::GaussianMixture(m) => m,
        }
    }
}

impl DistanceModel for ColorModel {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn bands_to_use(&self) -> &[usize] {
        self.inner().bands_to_use()
    }

    fn preprocess(&self, image: BandStack<f64>) -> Result<BandStack<f64>> {
        self.inner().preprocess(image)
    }

    fn calculate_distance(&self, image: &BandStack<f64>) -> Result<Raster<f64>> {
        self.inner().calculate_distance(image)
    }
}

impl From<MahalanobisDistance> for ColorModel {
    fn from(m: MahalanobisDistance) -> Self {
        ColorModel::Mahalanobis(m)
    }
}

impl From<GaussianMixtureModelDistance> for ColorModel {
    fn from(m: GaussianMixtureModelDistance) -> Self {
        ColorModel::GaussianMixture(m)
    }
}

/// Score every pixel of `image`.
///
/// `f` receives the pixel's values for `bands` (in that order) and a
/// scratch buffer of the same length. Rows are processed in parallel.
pub(crate) fn map_pixels<F>(image: &BandStack<f64>, bands: &[usize], f: F) -> Result<Raster<f64>>
where
    F: Fn(&[f64], &mut [f64]) -> f64 + Sync + Send,
{
    let (num_bands, rows, cols) = image.shape();
    if let Some(&band) = bands.iter().find(|&&b| b >= num_bands) {
        return Err(Error::BandOutOfRange {
            band: band as i64,
            max: num_bands.saturating_sub(1),
        });
    }

    let data = image.data();
    let d = bands.len();

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut pixel = vec![0.0; d];
            let mut scratch = vec![0.0; d];
            let mut row_data = Vec::with_capacity(cols);
            for col in 0..cols {
                for (p, &band) in pixel.iter_mut().zip(bands) {
                    *p = data[[band, row, col]];
                }
                row_data.push(f(&pixel, &mut scratch));
            }
            row_data
        })
        .collect();

    let mut output = Raster::from_vec(output_data, rows, cols)?;
    output.set_transform(*image.transform());
    Ok(output)
}
