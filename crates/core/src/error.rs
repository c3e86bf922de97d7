//! Error types for OCDC

use thiserror::Error;

/// Main error type for OCDC operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(String),

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Bands have to be between 0 and {max}, but got {band}.")]
    BandOutOfRange { band: i64, max: usize },

    #[error("Band {0} is selected more than once")]
    DuplicateBand(usize),

    #[error("Alpha channel have to be between -1 and {max}, but got {alpha}.")]
    AlphaOutOfRange { alpha: i64, max: usize },

    #[error("Method must be one of 'mahalanobis' or 'gmm', but got {0}")]
    UnknownMethod(String),

    #[error("Only one of gamma transform and lambda transform can be given")]
    ConflictingTransforms,

    #[error(
        "Annotation mask must have 1 band or the same number of bands as the reference image ({image_bands}), but has {mask_bands}"
    )]
    MaskShape { mask_bands: usize, image_bands: usize },

    #[error("Not enough annotated pixels. Need at least {required}, but got {actual}")]
    InsufficientSamples { required: usize, actual: usize },

    #[error("Numeric error in {model}: {reason}")]
    Numeric { model: &'static str, reason: String },

    #[error("Transform evaluation failed: {0}")]
    Evaluation(String),

    #[error("Tile ({row}, {col}) failed: {source}")]
    Tile {
        row: usize,
        col: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("{failed} of {total} tiles failed")]
    TilesFailed { failed: usize, total: usize },

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid user configuration, detected before any expensive work.
    Configuration,
    /// Array shapes or band counts that do not fit together.
    Shape,
    /// Too few annotated pixels.
    InsufficientSamples,
    /// Singular or degenerate statistics.
    Numeric,
    /// A transform expression failed to parse or evaluate.
    Evaluation,
    /// One or more tiles failed during a grid run.
    Tile,
    /// Reading or writing data failed.
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::Image(_) | Error::Tiff(_) | Error::UnsupportedDataType(_) => {
                ErrorKind::Io
            }
            Error::InvalidParameter { .. }
            | Error::BandOutOfRange { .. }
            | Error::DuplicateBand(_)
            | Error::AlphaOutOfRange { .. }
            | Error::UnknownMethod(_)
            | Error::ConflictingTransforms => ErrorKind::Configuration,
            Error::InvalidDimensions { .. }
            | Error::IndexOutOfBounds { .. }
            | Error::SizeMismatch { .. }
            | Error::MaskShape { .. } => ErrorKind::Shape,
            Error::InsufficientSamples { .. } => ErrorKind::InsufficientSamples,
            Error::Numeric { .. } => ErrorKind::Numeric,
            Error::Evaluation(_) => ErrorKind::Evaluation,
            Error::Tile { .. } | Error::TilesFailed { .. } => ErrorKind::Tile,
            Error::Other(_) => ErrorKind::Io,
        }
    }

    /// Wrap this error with the address of the tile it occurred in.
    pub fn in_tile(self, row: usize, col: usize) -> Self {
        Error::Tile {
            row,
            col,
            source: Box::new(self),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        Error::Tiff(e.to_string())
    }
}

/// Result type alias for OCDC operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_cli_wording() {
        let e = Error::BandOutOfRange { band: 8, max: 2 };
        assert_eq!(e.to_string(), "Bands have to be between 0 and 2, but got 8.");

        let e = Error::AlphaOutOfRange { alpha: -2, max: 2 };
        assert_eq!(e.to_string(), "Alpha channel have to be between -1 and 2, but got -2.");

        let e = Error::InsufficientSamples { required: 100, actual: 5 };
        assert_eq!(e.to_string(), "Not enough annotated pixels. Need at least 100, but got 5");

        let e = Error::UnknownMethod("test_wrong".into());
        assert!(e.to_string().contains("'mahalanobis' or 'gmm'"));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Error::UnknownMethod("x".into()).kind(), ErrorKind::Configuration);
        assert_eq!(Error::ConflictingTransforms.kind(), ErrorKind::Configuration);
        assert_eq!(
            Error::MaskShape { mask_bands: 2, image_bands: 3 }.kind(),
            ErrorKind::Shape
        );
        assert_eq!(
            Error::Numeric { model: "mahalanobis", reason: "singular".into() }.kind(),
            ErrorKind::Numeric
        );
        assert_eq!(Error::Evaluation("bad".into()).kind(), ErrorKind::Evaluation);
    }

    #[test]
    fn test_in_tile_keeps_source() {
        let e = Error::Evaluation("division by zero".into()).in_tile(16, 65);
        assert_eq!(e.kind(), ErrorKind::Tile);
        assert_eq!(
            e.to_string(),
            "Tile (16, 65) failed: Transform evaluation failed: division by zero"
        );
        match e {
            Error::Tile { row, col, source } => {
                assert_eq!((row, col), (16, 65));
                assert_eq!(source.kind(), ErrorKind::Evaluation);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
