//! End-to-end tiled classification of a GeoTIFF orthomosaic

use approx::assert_relative_eq;
use ndarray::{Array2, Array3};
use ocdc_algorithms::prelude::*;
use ocdc_core::io::{write_geotiff, TiffSource};
use ocdc_parallel::{GeoTiffTileSink, ProcessingMode, TileSelection, TiledPipeline, TilingParams};

/// Single-band orthomosaic, 45 x 70, with a smooth ramp
fn orthomosaic() -> Raster<f64> {
    let mut r = Raster::from_array(Array2::from_shape_fn((45, 70), |(row, col)| {
        (row * 2 + col) as f64 + ((row * col) % 7) as f64
    }));
    r.set_transform(GeoTransform::new(500_000.0, 4_000_000.0, 0.5, -0.5));
    r
}

fn model() -> ColorModel {
    // Single-band reference class around 40
    let reference = BandStack::from_array(Array3::from_shape_fn((1, 12, 12), |(_, r, c)| {
        35.0 + ((r * 12 + c) % 11) as f64
    }));
    let mask = BandStack::from_array(Array3::from_elem((1, 12, 12), 255.0));
    let rp = ReferencePixels::load(
        &InMemoryReferenceLoader::new(reference, mask),
        ReferenceParams::default(),
    )
    .unwrap();
    assert_eq!(rp.len(), 144);
    ColorModel::fit(Method::Mahalanobis, 2.0, &rp).unwrap()
}

#[test]
fn classify_geotiff_in_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let ortho_path = dir.path().join("ortho.tiff");
    let ortho = orthomosaic();
    write_geotiff(&ortho, &ortho_path).unwrap();

    let source = TiffSource::open(&ortho_path).unwrap();
    let model = model();
    let sink = GeoTiffTileSink::create(dir.path().join("output/tiles")).unwrap();
    let pipeline = TiledPipeline::new(TilingParams {
        tile_size: 20,
        scale: 2,
        selection: TileSelection::All,
    })
    .unwrap()
    .with_mode(ProcessingMode::Parallel);

    let report = pipeline.run(&source, &model, &sink).unwrap().into_result().unwrap();
    assert_eq!(report.processed.len(), 12);

    // Whole-image reference result, downsampled the same way
    let full = BandStack::from_array(ortho.data().clone().insert_axis(ndarray::Axis(0)))
        .with_transform(*ortho.transform());
    let expected = model.calculate_distance(&full).unwrap();

    // Trailing corner tile: rows 40..45, cols 60..70, every 2nd pixel
    let corner = TiffSource::open(sink.tile_path(2, 3)).unwrap().read_all().unwrap();
    assert_eq!(corner.shape(), (1, 3, 5));
    for r in 0..3 {
        for c in 0..5 {
            let want = expected.get(40 + 2 * r, 60 + 2 * c).unwrap();
            assert_relative_eq!(corner.get(0, r, c).unwrap(), want, max_relative = 1e-6);
        }
    }

    let gt = corner.transform();
    assert_relative_eq!(gt.origin_x, 500_030.0);
    assert_relative_eq!(gt.origin_y, 3_999_980.0);
    assert_relative_eq!(gt.pixel_width, 1.0);
}

#[test]
fn rerun_single_tile() {
    let dir = tempfile::tempdir().unwrap();
    let ortho_path = dir.path().join("ortho.tiff");
    write_geotiff(&orthomosaic(), &ortho_path).unwrap();
    let source = TiffSource::open(&ortho_path).unwrap();

    let sink = GeoTiffTileSink::create(dir.path().join("tiles")).unwrap();
    let report = TiledPipeline::new(TilingParams {
        tile_size: 20,
        scale: 1,
        selection: TileSelection::Single(1, 2),
    })
    .unwrap()
    .run(&source, &model(), &sink)
    .unwrap();

    assert_eq!(report.processed, vec![(1, 2)]);
    let written: Vec<_> = std::fs::read_dir(sink.dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(written, vec!["distance_tile_1_2.tiff".to_string()]);
}

#[test]
fn tile_outside_grid_is_rejected_before_processing() {
    let dir = tempfile::tempdir().unwrap();
    let ortho_path = dir.path().join("ortho.tiff");
    write_geotiff(&orthomosaic(), &ortho_path).unwrap();
    let source = TiffSource::open(&ortho_path).unwrap();

    let sink = GeoTiffTileSink::create(dir.path().join("tiles")).unwrap();
    let err = TiledPipeline::new(TilingParams {
        tile_size: 20,
        scale: 1,
        selection: TileSelection::Single(16, 65),
    })
    .unwrap()
    .run(&source, &model(), &sink)
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(std::fs::read_dir(sink.dir()).unwrap().count(), 0);
}
