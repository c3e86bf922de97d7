//! Gaussian mixture model distance
//!
//! Fits `n_components` full-covariance Gaussians to the reference samples
//! with expectation-maximisation, seeded from a k-means partition. A pixel
//! scores by how far its mixture log-likelihood falls below the best
//! log-likelihood reached at any component mean:
//!
//! ```text
//! distance(x) = sqrt(max(peak - log p(x), 0))
//! ```

use super::kmeans::{kmeans_labels, KmeansParams};
use super::linalg::{dot_column, precision_cholesky};
use super::map_pixels;
use crate::reference::ReferencePixels;
use crate::transform::Transform;
use ndarray::{Array2, ArrayView2};
use ocdc_core::{BandStack, DistanceModel, Error, Raster, Result};
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Parameters for the mixture fit
#[derive(Debug, Clone)]
pub struct GmmParams {
    /// Number of mixture components (default: 2)
    pub n_components: usize,
    /// Maximum EM iterations (default: 100)
    pub max_iterations: usize,
    /// Stop when the mean log-likelihood changes less than this (default: 1e-3)
    pub tolerance: f64,
    /// Added to every covariance diagonal (default: 1e-6)
    pub reg_covar: f64,
}

impl Default for GmmParams {
    fn default() -> Self {
        Self {
            n_components: 2,
            max_iterations: 100,
            tolerance: 1e-3,
            reg_covar: 1e-6,
        }
    }
}

impl GmmParams {
    pub fn with_components(n_components: usize) -> Self {
        Self {
            n_components,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
struct Component {
    weight: f64,
    mean: Vec<f64>,
    /// Upper factor `P` of the precision matrix, `Σ⁻¹ = P Pᵀ`
    prec_chol: Array2<f64>,
    /// `mean · P`
    mean_prec: Vec<f64>,
    /// `ln |P|`
    log_det: f64,
}

impl Component {
    /// Weighted log-density, `ln w + ln N(x | mean, Σ)`
    fn log_density(&self, x: &[f64]) -> f64 {
        let d = x.len();
        let mut q = 0.0;
        for (j, &mp) in self.mean_prec.iter().enumerate() {
            let y = dot_column(x, &self.prec_chol, j) - mp;
            q += y * y;
        }
        -0.5 * (d as f64 * (2.0 * PI).ln() + q) + self.log_det + self.weight.ln()
    }
}

/// Gaussian mixture fitted to the reference class
#[derive(Debug, Clone)]
pub struct GaussianMixtureModelDistance {
    bands_to_use: Vec<usize>,
    components: Vec<Component>,
    peak: f64,
    converged: bool,
    iterations: usize,
    transform: Option<Transform>,
}

impl GaussianMixtureModelDistance {
    /// Fit to a pixels x bands sample table
    pub fn fit(bands_to_use: Vec<usize>, values: ArrayView2<'_, f64>, params: &GmmParams) -> Result<Self> {
        let k = params.n_components;
        if k < 1 {
            return Err(Error::InvalidParameter {
                name: "n_components",
                value: k.to_string(),
                reason: "a mixture needs at least one component".into(),
            });
        }
        if values.ncols() != bands_to_use.len() {
            return Err(Error::SizeMismatch {
                er: values.nrows(),
                ec: bands_to_use.len(),
                ar: values.nrows(),
                ac: values.ncols(),
            });
        }
        let distinct = count_distinct(values);
        if distinct < k {
            return Err(Error::Numeric {
                model: "gmm",
                reason: format!("{} distinct samples cannot support {} components", distinct, k),
            });
        }

        let n = values.nrows();
        let samples: Vec<Vec<f64>> = values.rows().into_iter().map(|r| r.to_vec()).collect();

        let labels = kmeans_labels(
            values,
            &KmeansParams {
                k,
                ..Default::default()
            },
        );
        let mut resp = Array2::zeros((n, k));
        for (i, &label) in labels.iter().enumerate() {
            resp[[i, label]] = 1.0;
        }
        let mut components = m_step(&samples, &resp, params.reg_covar, true)?;

        let mut log_probs = vec![0.0; k];
        let mut lower_bound = f64::NEG_INFINITY;
        let mut converged = false;
        let mut iterations = 0;

        for iter in 1..=params.max_iterations {
            iterations = iter;
            let previous = lower_bound;

            // E step
            let mut total = 0.0;
            for (i, x) in samples.iter().enumerate() {
                for (lp, c) in log_probs.iter_mut().zip(&components) {
                    *lp = c.log_density(x);
                }
                let norm = log_sum_exp(&log_probs);
                for (m, &lp) in log_probs.iter().enumerate() {
                    resp[[i, m]] = (lp - norm).exp();
                }
                total += norm;
            }

            components = m_step(&samples, &resp, params.reg_covar, false)?;
            lower_bound = total / n as f64;

            if (lower_bound - previous).abs() < params.tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                "GMM with {} components did not converge after {} iterations",
                k, params.max_iterations
            );
        }

        let mut model = Self {
            bands_to_use,
            components,
            peak: 0.0,
            converged,
            iterations,
            transform: None,
        };
        let peak = model
            .components
            .iter()
            .map(|c| model.log_likelihood(&c.mean))
            .fold(f64::NEG_INFINITY, f64::max);
        model.peak = peak;

        debug!(
            "Fitted GMM with {} components on {} samples in {} iterations (mean log-likelihood {:.4})",
            k, n, iterations, lower_bound
        );

        Ok(model)
    }

    /// Fit to extracted reference pixels, keeping their transform for the
    /// images scored later
    pub fn from_reference(reference: &ReferencePixels, params: &GmmParams) -> Result<Self> {
        let mut model = Self::fit(reference.bands_to_use().to_vec(), reference.values(), params)?;
        model.transform = reference.transform().cloned();
        Ok(model)
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.weight).collect()
    }

    pub fn means(&self) -> Vec<&[f64]> {
        self.components.iter().map(|c| c.mean.as_slice()).collect()
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Mixture log-likelihood of a pixel given in model band order
    pub fn log_likelihood(&self, pixel: &[f64]) -> f64 {
        let log_probs: Vec<f64> = self.components.iter().map(|c| c.log_density(pixel)).collect();
        log_sum_exp(&log_probs)
    }

    /// Distance of a single pixel given in model band order
    pub fn distance(&self, pixel: &[f64]) -> f64 {
        (self.peak - self.log_likelihood(pixel)).max(0.0).sqrt()
    }
}

impl DistanceModel for GaussianMixtureModelDistance {
    fn name(&self) -> &'static str {
        "gmm"
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
        map_pixels(image, &self.bands_to_use, |px, _| self.distance(px))
    }
}

/// Weights, means and regularised covariances from responsibilities.
///
/// Weights are normalised by the sample count on the initial step and by
/// their sum afterwards.
fn m_step(samples: &[Vec<f64>], resp: &Array2<f64>, reg_covar: f64, initial: bool) -> Result<Vec<Component>> {
    let n = samples.len();
    let d = samples[0].len();
    let (_, k) = resp.dim();

    let nks: Vec<f64> = (0..k)
        .map(|m| resp.column(m).iter().fold(0.0, |acc, &r| acc + r) + 10.0 * f64::EPSILON)
        .collect();
    let total = if initial {
        n as f64
    } else {
        nks.iter().fold(0.0, |acc, &nk| acc + nk)
    };

    nks.iter()
        .enumerate()
        .map(|(m, &nk)| {
            let mean: Vec<f64> = (0..d)
                .map(|a| {
                    samples
                        .iter()
                        .enumerate()
                        .fold(0.0, |acc: f64, (i, x)| resp[[i, m]].mul_add(x[a], acc))
                        / nk
                })
                .collect();

            let mut cov = Array2::from_shape_fn((d, d), |(a, b)| {
                samples.iter().enumerate().fold(0.0, |acc: f64, (i, x)| {
                    (resp[[i, m]] * (x[a] - mean[a])).mul_add(x[b] - mean[b], acc)
                }) / nk
            });
            for a in 0..d {
                cov[[a, a]] += reg_covar;
            }

            let prec_chol = precision_cholesky(&cov).ok_or_else(|| Error::Numeric {
                model: "gmm",
                reason: format!("covariance of component {} is not positive definite", m),
            })?;
            let mean_prec = (0..d).map(|j| dot_column(&mean, &prec_chol, j)).collect();
            let log_det = (0..d).fold(0.0, |acc, i| acc + prec_chol[[i, i]].ln());

            Ok(Component {
                weight: nk / total,
                mean,
                prec_chol,
                mean_prec,
                log_det,
            })
        })
        .collect()
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn count_distinct(values: ArrayView2<'_, f64>) -> usize {
    let rows: Vec<Vec<u64>> = values
        .rows()
        .into_iter()
        .map(|r| r.iter().map(|v| v.to_bits()).collect())
        .collect();
    let mut distinct: Vec<&Vec<u64>> = rows.iter().collect();
    distinct.sort();
    distinct.dedup();
    distinct.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color_models::tests::{fixture_image, fixture_samples};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn check_fixture(n_components: usize, expected: Array2<f64>) {
        let model = GaussianMixtureModelDistance::fit(
            vec![0, 1, 2],
            fixture_samples().view(),
            &GmmParams::with_components(n_components),
        )
        .unwrap();
        assert_eq!(model.n_components(), n_components);
        let result = model.calculate_distance(&fixture_image()).unwrap();
        for (got, want) in result.data().iter().zip(expected.iter()) {
            assert_relative_eq!(*got, *want, epsilon = 1.5e-6);
        }
    }

    #[test]
    fn test_fixture_one_component() {
        check_fixture(
            1,
            array![
                [21646.328248, 25257.42584, 19097.247623],
                [14551.219067, 1425.097135, 19352.218935],
                [4439.704449, 10770.032736, 29081.097011]
            ],
        );
    }

    #[test]
    fn test_fixture_two_components() {
        check_fixture(
            2,
            array![
                [38825.142373, 25277.867819, 41555.941951],
                [23307.657938, 33230.944733, 43765.753982],
                [7013.36822, 19791.385844, 30779.979503]
            ],
        );
    }

    #[test]
    fn test_weights_sum_to_one() {
        let model = GaussianMixtureModelDistance::fit(
            vec![0, 1, 2],
            fixture_samples().view(),
            &GmmParams::with_components(2),
        )
        .unwrap();
        let total: f64 = model.weights().iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        assert!(model.iterations() >= 1);
    }

    #[test]
    fn test_component_means_score_low() {
        let samples = array![
            [10.0, 10.0],
            [11.0, 10.0],
            [10.0, 11.0],
            [11.0, 11.5],
            [90.0, 90.0],
            [91.0, 90.0],
            [90.0, 91.0],
            [91.5, 91.0]
        ];
        let model =
            GaussianMixtureModelDistance::fit(vec![0, 1], samples.view(), &GmmParams::with_components(2)).unwrap();
        let near = model.distance(&[10.5, 10.6]);
        let far = model.distance(&[50.0, 50.0]);
        assert!(near < far);
        assert!(near >= 0.0);
        // peak is reached at one of the component means
        let best = model
            .means()
            .iter()
            .map(|m| model.distance(m))
            .fold(f64::INFINITY, f64::min);
        assert_eq!(best, 0.0);
    }

    #[test]
    fn test_invalid_component_count() {
        let err = GaussianMixtureModelDistance::fit(
            vec![0, 1, 2],
            fixture_samples().view(),
            &GmmParams::with_components(0),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "n_components", .. }));
    }

    #[test]
    fn test_too_few_distinct_samples() {
        let samples = array![[1.0, 2.0], [1.0, 2.0], [3.0, 4.0]];
        let err =
            GaussianMixtureModelDistance::fit(vec![0, 1], samples.view(), &GmmParams::with_components(3)).unwrap_err();
        assert!(matches!(err, Error::Numeric { model: "gmm", .. }));
    }

    #[test]
    fn test_log_sum_exp() {
        assert_relative_eq!(log_sum_exp(&[0.0, 0.0]), 2.0_f64.ln());
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY]), f64::NEG_INFINITY);
    }
}
