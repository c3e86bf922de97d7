//! Pixel value transforms
//!
//! A transform maps raw intensities before any statistics are computed. The
//! same transform is applied to the reference samples and to every tile of
//! the target image, so distances compare like with like.
//!
//! - **Gamma**: power-law mapping over the 8-bit intensity range
//! - **Lambda**: user-supplied scalar expression (`lambda x: ...`)

mod expr;
mod gamma;
mod lambda;

pub use gamma::GammaTransform;
pub use lambda::LambdaTransform;

use crate::maybe_rayon::*;
use ndarray::{ArrayBase, Axis, DataMut, Dimension};
use ocdc_core::{BandStack, Error, Result};

/// The configured pixel transform
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    Gamma(GammaTransform),
    Lambda(LambdaTransform),
}

impl Transform {
    /// Build the transform selected by the command-line options.
    ///
    /// At most one of the two may be given.
    pub fn from_options(gamma: Option<f64>, lambda: Option<&str>) -> Result<Option<Self>> {
        match (gamma, lambda) {
            (Some(_), Some(_)) => Err(Error::ConflictingTransforms),
            (Some(g), None) => Ok(Some(Transform::Gamma(GammaTransform::new(g)?))),
            (None, Some(text)) => Ok(Some(Transform::Lambda(LambdaTransform::parse(text)?))),
            (None, None) => Ok(None),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transform::Gamma(_) => "gamma",
            Transform::Lambda(_) => "lambda",
        }
    }

    /// Transform a single value
    pub fn apply(&self, value: f64) -> Result<f64> {
        match self {
            Transform::Gamma(t) => Ok(t.apply(value)),
            Transform::Lambda(t) => t.apply(value),
        }
    }

    /// Transform every element of an array or view in place
    pub fn apply_array<S, D>(&self, values: &mut ArrayBase<S, D>) -> Result<()>
    where
        S: DataMut<Elem = f64>,
        D: Dimension,
    {
        match values.as_slice_memory_order_mut() {
            Some(slice) => slice.par_iter_mut().try_for_each(|v| {
                *v = self.apply(*v)?;
                Ok(())
            }),
            None => values.iter_mut().try_for_each(|v| {
                *v = self.apply(*v)?;
                Ok(())
            }),
        }
    }

    /// Transform every sample of a band stack
    pub fn apply_stack(&self, stack: BandStack<f64>) -> Result<BandStack<f64>> {
        let transform = *stack.transform();
        let mut data = stack.into_array();
        self.apply_array(&mut data)?;
        Ok(BandStack::from_array(data).with_transform(transform))
    }

    /// Transform only the listed bands of a band stack, leaving the others
    /// (an alpha channel, say) untouched
    pub fn apply_bands(&self, stack: BandStack<f64>, bands: &[usize]) -> Result<BandStack<f64>> {
        let transform = *stack.transform();
        let mut data = stack.into_array();
        for &band in bands {
            if band >= data.len_of(Axis(0)) {
                return Err(Error::BandOutOfRange {
                    band: band as i64,
                    max: data.len_of(Axis(0)).saturating_sub(1),
                });
            }
            self.apply_array(&mut data.index_axis_mut(Axis(0), band))?;
        }
        Ok(BandStack::from_array(data).with_transform(transform))
    }
}

impl From<GammaTransform> for Transform {
    fn from(t: GammaTransform) -> Self {
        Transform::Gamma(t)
    }
}

impl From<LambdaTransform> for Transform {
    fn from(t: LambdaTransform) -> Self {
        Transform::Lambda(t)
    }
}
