//! # OCDC Algorithms
//!
//! Color distance classification for OCDC.
//!
//! ## Modules
//!
//! - **transform**: Gamma and lambda-expression pixel transforms
//! - **reference**: Band resolution, annotation masks, reference pixel extraction
//! - **color_models**: Mahalanobis and Gaussian mixture distance models

pub mod color_models;
pub(crate) mod maybe_rayon;
pub mod reference;
pub mod transform;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::color_models::{
        ColorModel, GaussianMixtureModelDistance, GmmParams, MahalanobisDistance, Method,
    };
    pub use crate::reference::{
        resolve_alpha, resolve_bands, AnnotationRule, FileReferenceLoader,
        InMemoryReferenceLoader, ReferenceLoader, ReferenceParams, ReferencePixels,
    };
    pub use crate::transform::{GammaTransform, LambdaTransform, Transform};
    pub use ocdc_core::prelude::*;
}
