//! Multi-band raster stored as (band, row, col)

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, PixelWindow, RasterElement};
use ndarray::{s, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};

/// A georeferenced stack of equally sized bands.
///
/// Samples are indexed `(band, row, col)`, matching the layout raster readers
/// hand out for orthomosaics, reference images and annotation masks.
#[derive(Debug, Clone)]
pub struct BandStack<T: RasterElement> {
    data: Array3<T>,
    transform: GeoTransform,
}

impl<T: RasterElement> BandStack<T> {
    /// Create a new band stack filled with zeros
    pub fn new(bands: usize, rows: usize, cols: usize) -> Self {
        Self::from_array(Array3::zeros((bands, rows, cols)))
    }

    /// Create a band stack from a (band, row, col) array
    pub fn from_array(data: Array3<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
        }
    }

    /// Create a band stack from pixel-interleaved samples
    /// (`r0 g0 b0 r1 g1 b1 ...`), the layout image decoders produce.
    pub fn from_interleaved(samples: &[T], bands: usize, rows: usize, cols: usize) -> Result<Self> {
        if bands == 0 || samples.len() != bands * rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let data = Array3::from_shape_fn((bands, rows, cols), |(b, r, c)| {
            samples[(r * cols + c) * bands + b]
        });
        Ok(Self::from_array(data))
    }

    /// Builder-style transform setter
    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }

    // Dimensions

    pub fn bands(&self) -> usize {
        self.data.dim().0
    }

    pub fn rows(&self) -> usize {
        self.data.dim().1
    }

    pub fn cols(&self) -> usize {
        self.data.dim().2
    }

    /// Dimensions as (bands, rows, cols)
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    // Data access

    pub fn get(&self, band: usize, row: usize, col: usize) -> Result<T> {
        if band >= self.bands() {
            return Err(Error::InvalidParameter {
                name: "band",
                value: band.to_string(),
                reason: format!("raster has {} bands", self.bands()),
            });
        }
        self.data
            .get((band, row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// View of a single band
    pub fn band(&self, band: usize) -> Result<ArrayView2<'_, T>> {
        if band >= self.bands() {
            return Err(Error::InvalidParameter {
                name: "band",
                value: band.to_string(),
                reason: format!("raster has {} bands", self.bands()),
            });
        }
        Ok(self.data.index_axis(Axis(0), band))
    }

    /// All band samples of one pixel
    pub fn pixel(&self, row: usize, col: usize) -> ArrayView1<'_, T> {
        self.data.slice(s![.., row, col])
    }

    pub fn view(&self) -> ArrayView3<'_, T> {
        self.data.view()
    }

    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    pub fn into_array(self) -> Array3<T> {
        self.data
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    // Derived stacks

    /// Copy of a pixel window, georeferenced to the window origin
    pub fn window(&self, window: &PixelWindow) -> Result<Self> {
        if !window.fits_within(self.rows(), self.cols()) {
            return Err(Error::IndexOutOfBounds {
                row: window.row_end,
                col: window.col_end,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        let data = self
            .data
            .slice(s![
                ..,
                window.row_start..window.row_end,
                window.col_start..window.col_end
            ])
            .to_owned();
        Ok(Self {
            data,
            transform: self.transform.window(window.row_start, window.col_start, 1),
        })
    }

    /// Keep every `scale`-th row and column starting at the origin.
    ///
    /// The result has `ceil(rows / scale)` x `ceil(cols / scale)` pixels.
    pub fn downsample(&self, scale: usize) -> Result<Self> {
        if scale == 0 {
            return Err(Error::InvalidParameter {
                name: "scale",
                value: scale.to_string(),
                reason: "must be at least 1".into(),
            });
        }
        if scale == 1 {
            return Ok(self.clone());
        }
        let step = scale as isize;
        Ok(Self {
            data: self.data.slice(s![.., ..;step, ..;step]).to_owned(),
            transform: self.transform.window(0, 0, scale),
        })
    }

    /// Apply `f` to every sample
    pub fn map<U, F>(&self, f: F) -> BandStack<U>
    where
        U: RasterElement,
        F: Fn(T) -> U,
    {
        BandStack {
            data: self.data.mapv(f),
            transform: self.transform,
        }
    }

    /// Convert all samples to `f64`
    pub fn to_f64(&self) -> BandStack<f64> {
        self.map(|v| v.to_f64().unwrap_or(f64::NAN))
    }
}
