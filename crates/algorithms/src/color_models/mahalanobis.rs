//! Mahalanobis distance to the reference class

use super::linalg::{covariance, mean, quadratic_form, Lu};
use super::map_pixels;
use crate::reference::ReferencePixels;
use crate::transform::Transform;
use ndarray::{Array1, Array2, ArrayView2};
use ocdc_core::{BandStack, DistanceModel, Error, Raster, Result};
use tracing::debug;

/// Covariance-weighted distance from each pixel to the reference mean.
///
/// Fitting stores the sample mean and the inverse of the unbiased sample
/// covariance. A pixel `x` scores `sqrt((x - mean)ᵀ Σ⁻¹ (x - mean))`, the
/// distance itself rather than its square. The established test values
/// (61938065.050973 for the pixel (100, 50, 20)) are the square root of the
/// quadratic form.
#[derive(Debug, Clone)]
pub struct MahalanobisDistance {
    bands_to_use: Vec<usize>,
    mean: Array1<f64>,
    inv_covariance: Array2<f64>,
    transform: Option<Transform>,
}

impl MahalanobisDistance {
    /// Fit to a pixels x bands sample table
    pub fn fit(bands_to_use: Vec<usize>, values: ArrayView2<'_, f64>) -> Result<Self> {
        if values.ncols() != bands_to_use.len() {
            return Err(Error::SizeMismatch {
                er: values.nrows(),
                ec: bands_to_use.len(),
                ar: values.nrows(),
                ac: values.ncols(),
            });
        }
        if values.nrows() < 2 {
            return Err(Error::InsufficientSamples {
                required: 2,
                actual: values.nrows(),
            });
        }

        let mean = mean(values);
        let cov = covariance(values, mean.view());
        let lu = Lu::decompose(&cov).ok_or_else(|| Error::Numeric {
            model: "mahalanobis",
            reason: format!(
                "sample covariance over bands {:?} is singular ({} samples)",
                bands_to_use,
                values.nrows()
            ),
        })?;
        let inv_covariance = lu.inverse();

        debug!(
            "Fitted Mahalanobis model on {} samples, mean {:?}",
            values.nrows(),
            mean.as_slice().unwrap_or_default()
        );

        Ok(Self {
            bands_to_use,
            mean,
            inv_covariance,
            transform: None,
        })
    }

    /// Fit to extracted reference pixels, keeping their transform for the
    /// images scored later
    pub fn from_reference(reference: &ReferencePixels) -> Result<Self> {
        let mut model = Self::fit(reference.bands_to_use().to_vec(), reference.values())?;
        model.transform = reference.transform().cloned();
        Ok(model)
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn inverse_covariance(&self) -> &Array2<f64> {
        &self.inv_covariance
    }

    /// Distance of a single pixel given in model band order
    pub fn distance(&self, pixel: &[f64]) -> f64 {
        let mut d = vec![0.0; pixel.len()];
        self.distance_with(pixel, &mut d)
    }

    fn distance_with(&self, pixel: &[f64], d: &mut [f64]) -> f64 {
        for ((d, &x), &m) in d.iter_mut().zip(pixel).zip(self.mean.iter()) {
            *d = x - m;
        }
        quadratic_form(d, &self.inv_covariance).max(0.0).sqrt()
    }
}

impl DistanceModel for MahalanobisDistance {
    fn name(&self) -> &'static str {
        "mahalanobis"
    }

    fn bands_to_use(&self) -> &[usize] {
        &self.bands_to_use
    }

    fn preprocess(&self, image: BandStack<f64>) -> Result<BandStack<f64>> {
        match &self.transform {
            Some(t) => t.apply_bands(image, &self.bands_to_use),
            None => Ok(image),
        }
    }

    fn calculate_distance(&self, image: &BandStack<f64>) -> Result<Raster<f64>> {
        map_pixels(image, &self.bands_to_use, |px, scratch| self.distance_with(px, scratch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color_models::tests::{fixture_image, fixture_samples};
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_fixture_distances() {
        let model = MahalanobisDistance::fit(vec![0, 1, 2], fixture_samples().view()).unwrap();
        let result = model.calculate_distance(&fixture_image()).unwrap();
        let expected = array![
            [61938065.050973, 72271206.423611, 54644082.905849],
            [41636481.413178, 4072473.365251, 55373481.120433],
            [12703685.569828, 30817074.564124, 83212179.641626]
        ];
        assert_eq!(result.shape(), (3, 3));
        for (got, want) in result.data().iter().zip(expected.iter()) {
            assert_relative_eq!(*got, *want, epsilon = 1.5e-6);
        }
    }

    #[test]
    fn test_identity_covariance_is_euclidean() {
        // Four corners of a unit square: mean (0.5, 0.5), covariance I/3
        let samples = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let model = MahalanobisDistance::fit(vec![0, 1], samples.view()).unwrap();
        assert_relative_eq!(model.distance(&[0.5, 0.5]), 0.0);
        assert_relative_eq!(model.distance(&[1.5, 0.5]), 3.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(model.inverse_covariance()[[0, 1]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_band_subset_and_order() {
        let samples = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        // model band 0 reads image band 2, model band 1 reads image band 0
        let model = MahalanobisDistance::fit(vec![2, 0], samples.view()).unwrap();
        let mut image = ndarray::Array3::zeros((3, 1, 1));
        image[[2, 0, 0]] = 1.5;
        image[[0, 0, 0]] = 0.5;
        image[[1, 0, 0]] = 1000.0;
        let d = model.calculate_distance(&BandStack::from_array(image)).unwrap();
        assert_relative_eq!(d.get(0, 0).unwrap(), 3.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_singular_covariance() {
        let samples = array![[1.0, 2.0], [1.0, 2.0], [1.0, 2.0]];
        let err = MahalanobisDistance::fit(vec![0, 1], samples.view()).unwrap_err();
        assert!(matches!(err, Error::Numeric { model: "mahalanobis", .. }));
    }

    #[test]
    fn test_too_few_samples() {
        let err = MahalanobisDistance::fit(vec![0], array![[1.0]].view()).unwrap_err();
        assert!(matches!(err, Error::InsufficientSamples { required: 2, actual: 1 }));
    }

    #[test]
    fn test_missing_band_in_image() {
        let model = MahalanobisDistance::fit(vec![0, 1, 2], fixture_samples().view()).unwrap();
        let image = BandStack::from_array(ndarray::Array3::zeros((2, 3, 3)));
        assert!(matches!(
            model.calculate_distance(&image),
            Err(Error::BandOutOfRange { band: 2, max: 1 })
        ));
    }
}
