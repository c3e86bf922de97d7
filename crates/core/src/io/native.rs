//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. The reader decodes one window at a time, touching
//! only the strips or tiles that intersect it, so orthomosaics much larger
//! than memory can be classified tile by tile.

use crate::error::{Error, Result};
use crate::io::RasterSource;
use crate::raster::{BandStack, GeoTransform, PixelWindow, Raster, RasterElement};
use ndarray::Array3;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;

#[derive(Debug, Clone)]
enum TiffOrigin {
    File(PathBuf),
    Buffer(Vec<u8>),
}

/// Windowed reader over a (Geo)TIFF image.
///
/// The header is parsed once on open. Every [`RasterSource::read_window`]
/// call opens its own decoder, so a `TiffSource` can be shared between
/// threads without locking.
#[derive(Debug, Clone)]
pub struct TiffSource {
    origin: TiffOrigin,
    bands: usize,
    rows: usize,
    cols: usize,
    transform: GeoTransform,
}

impl TiffSource {
    /// Open a TIFF file and read its header
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Self::from_reader(BufReader::new(file), TiffOrigin::File(path))
    }

    /// Read a TIFF held in memory
    pub fn from_buffer(data: Vec<u8>) -> Result<Self> {
        let header = Self::from_reader(Cursor::new(data.as_slice()), TiffOrigin::Buffer(Vec::new()))?;
        Ok(Self {
            origin: TiffOrigin::Buffer(data),
            ..header
        })
    }

    fn from_reader<R: Read + Seek>(reader: R, origin: TiffOrigin) -> Result<Self> {
        let mut decoder = Decoder::new(reader)
            .map_err(|e| Error::Tiff(format!("TIFF decode error: {}", e)))?;

        let (width, height) = decoder
            .dimensions()
            .map_err(|e| Error::Tiff(format!("Cannot read dimensions: {}", e)))?;

        // SamplesPerPixel defaults to 1 when absent
        let bands = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as usize;
        let transform = read_geotransform(&mut decoder).unwrap_or_default();
        debug!(
            "TIFF header: {} x {} with {} band(s), chunks {:?}",
            width,
            height,
            bands,
            decoder.chunk_dimensions()
        );

        Ok(Self {
            origin,
            bands,
            rows: height as usize,
            cols: width as usize,
            transform,
        })
    }

    /// Decode the whole image
    pub fn read_all(&self) -> Result<BandStack<f64>> {
        self.read_window(&PixelWindow::full(self.rows, self.cols))
    }
}

impl RasterSource for TiffSource {
    fn shape(&self) -> (usize, usize, usize) {
        (self.bands, self.rows, self.cols)
    }

    fn geo_transform(&self) -> GeoTransform {
        self.transform
    }

    fn read_window(&self, window: &PixelWindow) -> Result<BandStack<f64>> {
        if !window.fits_within(self.rows, self.cols) {
            return Err(Error::IndexOutOfBounds {
                row: window.row_end,
                col: window.col_end,
                rows: self.rows,
                cols: self.cols,
            });
        }

        let data = match &self.origin {
            TiffOrigin::File(path) => {
                let file = File::open(path)?;
                decode_window(BufReader::new(file), window, self.bands, self.cols)?
            }
            TiffOrigin::Buffer(buf) => decode_window(Cursor::new(buf.as_slice()), window, self.bands, self.cols)?,
        };

        let transform = self.transform.window(window.row_start, window.col_start, 1);
        Ok(BandStack::from_array(data).with_transform(transform))
    }
}

/// Decode the chunks intersecting `window` into a (band, row, col) array
fn decode_window<R: Read + Seek>(
    reader: R,
    window: &PixelWindow,
    bands: usize,
    image_cols: usize,
) -> Result<Array3<f64>> {
    let mut out = Array3::zeros((bands, window.rows(), window.cols()));
    if window.is_empty() {
        return Ok(out);
    }

    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::Tiff(format!("TIFF decode error: {}", e)))?;

    let (chunk_w, chunk_h) = decoder.chunk_dimensions();
    let (chunk_w, chunk_h) = (chunk_w.max(1) as usize, chunk_h.max(1) as usize);
    // Strips span the full width, so this is 1 for stripped images
    let chunks_across = image_cols.div_ceil(chunk_w);

    for cy in window.row_start / chunk_h..=(window.row_end - 1) / chunk_h {
        for cx in window.col_start / chunk_w..=(window.col_end - 1) / chunk_w {
            let index = (cy * chunks_across + cx) as u32;
            let (data_w, data_h) = decoder.chunk_data_dimensions(index);
            let (data_w, data_h) = (data_w as usize, data_h as usize);

            let chunk = decoder
                .read_chunk(index)
                .map_err(|e| Error::Tiff(format!("Cannot read chunk {}: {}", index, e)))?;
            let samples = decoding_to_f64(chunk)?;
            if samples.len() < data_w * data_h * bands {
                return Err(Error::Tiff(format!(
                    "Chunk {} holds {} samples, expected {}",
                    index,
                    samples.len(),
                    data_w * data_h * bands
                )));
            }

            let (y0, x0) = (cy * chunk_h, cx * chunk_w);
            let rows = window.row_start.max(y0)..window.row_end.min(y0 + data_h);
            let cols = window.col_start.max(x0)..window.col_end.min(x0 + data_w);

            for y in rows {
                for x in cols.clone() {
                    let base = ((y - y0) * data_w + (x - x0)) * bands;
                    for b in 0..bands {
                        out[[b, y - window.row_start, x - window.col_start]] = samples[base + b];
                    }
                }
            }
        }
    }

    Ok(out)
}

fn decoding_to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    let data = match result {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };
    Ok(data)
}

/// Attempt to read GeoTransform from TIFF tags
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    // ModelTransformationTag: row-major 4x4 matrix
    if let Ok(m) = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TRANSFORMATION)) {
        if m.len() >= 8 {
            return Ok(GeoTransform {
                origin_x: m[3],
                pixel_width: m[0],
                row_rotation: m[1],
                origin_y: m[7],
                col_rotation: m[4],
                pixel_height: m[5],
            });
        }
    }

    let scale = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))
        .map_err(|_| Error::Tiff("No pixel scale tag".into()))?;

    let tiepoint = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT))
        .map_err(|_| Error::Tiff("No tiepoint tag".into()))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    Err(Error::Tiff("Cannot determine geotransform".into()))
}

/// Write a single-band raster to a 32-bit float GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, file)
}

/// Write a single-band raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T: RasterElement>(raster: &Raster<T>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer)
        .map_err(|e| Error::Tiff(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Tiff(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    if gt.row_rotation != 0.0 || gt.col_rotation != 0.0 {
        let matrix = [
            gt.pixel_width, gt.row_rotation, 0.0, gt.origin_x,
            gt.col_rotation, gt.pixel_height, 0.0, gt.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        image
            .encoder()
            .write_tag(Tag::Unknown(MODEL_TRANSFORMATION), &matrix[..])
            .map_err(|e| Error::Tiff(format!("Cannot write transformation tag: {}", e)))?;
    } else {
        let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
        image
            .encoder()
            .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])
            .map_err(|e| Error::Tiff(format!("Cannot write scale tag: {}", e)))?;

        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        image
            .encoder()
            .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
            .map_err(|e| Error::Tiff(format!("Cannot write tiepoint tag: {}", e)))?;
    }

    // Minimal key directory: GTModelTypeGeoKey = Projected, GTRasterTypeGeoKey = PixelIsArea
    let geokeys: [u16; 12] = [
        1, 1, 0, 2,
        1024, 0, 1, 1,
        1025, 0, 1, 1,
    ];
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(|e| Error::Tiff(format!("Cannot write geokey tag: {}", e)))?;

    image
        .write_data(&data)
        .map_err(|e| Error::Tiff(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;
    use tiff::encoder::colortype::RGB8;

    fn rgb_tiff(rows: usize, cols: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(rows * cols * 3);
        for r in 0..rows {
            for c in 0..cols {
                data.extend_from_slice(&[(r % 256) as u8, (c % 256) as u8, ((r + c) % 256) as u8]);
            }
        }
        let mut buf = Vec::new();
        let mut encoder = TiffEncoder::new(Cursor::new(&mut buf)).unwrap();
        encoder
            .write_image::<RGB8>(cols as u32, rows as u32, &data)
            .unwrap();
        buf
    }

    #[test]
    fn test_windowed_read_matches_pixels() {
        let source = TiffSource::from_buffer(rgb_tiff(120, 90)).unwrap();
        assert_eq!(source.shape(), (3, 120, 90));

        let window = PixelWindow::new(100, 120, 80, 90);
        let stack = source.read_window(&window).unwrap();
        assert_eq!(stack.shape(), (3, 20, 10));
        for r in 0..20 {
            for c in 0..10 {
                assert_eq!(stack.get(0, r, c).unwrap(), (100 + r) as f64);
                assert_eq!(stack.get(1, r, c).unwrap(), (80 + c) as f64);
                assert_eq!(stack.get(2, r, c).unwrap(), (180 + r + c) as f64);
            }
        }
    }

    #[test]
    fn test_window_out_of_bounds() {
        let source = TiffSource::from_buffer(rgb_tiff(10, 10)).unwrap();
        assert!(source.read_window(&PixelWindow::new(0, 11, 0, 10)).is_err());
    }

    #[test]
    fn test_geotiff_roundtrip_through_file() {
        let mut raster = Raster::from_vec((0..12).map(|v| v as f64 * 0.5).collect(), 3, 4).unwrap();
        raster.set_transform(GeoTransform::new(500.0, 1000.0, 2.5, -2.5));

        let file = NamedTempFile::new().unwrap();
        write_geotiff(&raster, file.path()).unwrap();

        let source = TiffSource::open(file.path()).unwrap();
        assert_eq!(source.shape(), (1, 3, 4));
        let gt = source.geo_transform();
        assert_relative_eq!(gt.origin_x, 500.0, epsilon = 1e-9);
        assert_relative_eq!(gt.origin_y, 1000.0, epsilon = 1e-9);
        assert_relative_eq!(gt.pixel_width, 2.5, epsilon = 1e-9);
        assert_relative_eq!(gt.pixel_height, -2.5, epsilon = 1e-9);

        let all = source.read_all().unwrap();
        assert_relative_eq!(all.get(0, 2, 3).unwrap(), 5.5, epsilon = 1e-6);

        let part = source.read_window(&PixelWindow::new(1, 3, 2, 4)).unwrap();
        assert_relative_eq!(part.get(0, 0, 0).unwrap(), 3.0, epsilon = 1e-6);
        assert_relative_eq!(part.transform().origin_x, 505.0, epsilon = 1e-9);
        assert_relative_eq!(part.transform().origin_y, 997.5, epsilon = 1e-9);
    }

    #[test]
    fn test_rotated_transform_roundtrip() {
        let mut raster: Raster<f64> = Raster::new(2, 2);
        raster.set_transform(GeoTransform {
            origin_x: 10.0,
            origin_y: 20.0,
            pixel_width: 1.0,
            pixel_height: -1.0,
            row_rotation: 0.25,
            col_rotation: 0.5,
        });
        let buf = write_geotiff_to_buffer(&raster).unwrap();
        let gt = TiffSource::from_buffer(buf).unwrap().geo_transform();
        assert_relative_eq!(gt.row_rotation, 0.25, epsilon = 1e-12);
        assert_relative_eq!(gt.col_rotation, 0.5, epsilon = 1e-12);
        assert_relative_eq!(gt.origin_y, 20.0, epsilon = 1e-12);
    }
}
