//! OCDC CLI - Orthomosaic color distance classification

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ocdc_algorithms::color_models::{ColorModel, Method};
use ocdc_algorithms::reference::{ReferenceParams, ReferencePixels};
use ocdc_algorithms::transform::Transform;
use ocdc_core::io::{RasterSource, TiffSource};
use ocdc_core::DistanceModel;
use ocdc_parallel::{GeoTiffTileSink, ProcessingMode, TileSelection, TiledPipeline, TilingParams};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ocdc")]
#[command(
    author,
    version,
    about = "Classify orthomosaic pixels by color distance to annotated reference pixels",
    long_about = None
)]
struct Cli {
    /// Orthomosaic to classify (GeoTIFF)
    orthomosaic: PathBuf,

    /// Reference image
    reference: PathBuf,

    /// Annotated copy of the reference image
    annotated: PathBuf,

    /// Bands to use, default is every band except the alpha channel
    #[arg(long = "bands_to_use", num_args = 1.., allow_negative_numbers = true)]
    bands_to_use: Option<Vec<i64>>,

    /// Alpha channel index, -1 for none
    #[arg(long = "alpha_channel", default_value_t = -1, allow_negative_numbers = true)]
    alpha_channel: i64,

    /// Keep every n-th pixel of each tile
    #[arg(long, default_value_t = 5)]
    scale: usize,

    /// Directory for the distance tiles
    #[arg(long = "output_tile_location", default_value = "output/tiles")]
    output_tile_location: PathBuf,

    /// Where to save the reference pixel values (CSV)
    #[arg(long = "mask_file_name", default_value = "pixel_values")]
    mask_file_name: PathBuf,

    /// Distance method: mahalanobis or gmm
    #[arg(long, default_value = "mahalanobis")]
    method: String,

    /// Method parameter (number of mixture components for gmm)
    #[arg(long, default_value_t = 2.0)]
    param: f64,

    /// Tile edge length in pixels
    #[arg(long = "tile_size", default_value_t = 3000)]
    tile_size: usize,

    /// Process only this tile
    #[arg(long = "run_specific_tile", num_args = 2, value_names = ["ROW", "COL"])]
    run_specific_tile: Option<Vec<usize>>,

    /// Process only these tiles, given as row col pairs (ignored when
    /// --run_specific_tile is set)
    #[arg(long = "run_specific_tileset", num_args = 1..)]
    run_specific_tileset: Option<Vec<usize>>,

    /// Gamma transform exponent
    #[arg(long = "gamma_transform")]
    gamma_transform: Option<f64>,

    /// Transform given as an expression, e.g. "lambda x: x ** 0.5"
    #[arg(long = "lambda_transform")]
    lambda_transform: Option<String>,

    /// Worker threads for tiles (0 = all cores, default sequential)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Options resolved before any file is read
#[derive(Debug)]
struct Settings {
    method: Method,
    transform: Option<Transform>,
    selection: TileSelection,
}

impl Settings {
    fn from_cli(cli: &Cli) -> ocdc_core::Result<Self> {
        let method: Method = cli.method.parse()?;
        let transform = Transform::from_options(cli.gamma_transform, cli.lambda_transform.as_deref())?;

        let selection = match (&cli.run_specific_tile, &cli.run_specific_tileset) {
            (Some(tile), _) => TileSelection::Single(tile[0], tile[1]),
            (None, Some(pairs)) => TileSelection::from_pairs(pairs)?,
            (None, None) => TileSelection::All,
        };

        Ok(Self {
            method,
            transform,
            selection,
        })
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("A global tracing subscriber is already installed");
    }
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn tile_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tiles ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// CSV destination for the reference pixel values; `.csv` is added when
/// the name has no extension
fn pixel_values_path(mask_file_name: &Path) -> PathBuf {
    if mask_file_name.extension().is_some() {
        mask_file_name.to_path_buf()
    } else {
        mask_file_name.with_extension("csv")
    }
}

/// Write the reference sample set, one row per pixel, one column per band
fn write_pixel_values(reference: &ReferencePixels, mask_file_name: &Path) -> Result<PathBuf> {
    let path = pixel_values_path(mask_file_name);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    let header: Vec<String> = reference
        .bands_to_use()
        .iter()
        .map(|b| format!("band_{}", b))
        .collect();
    writeln!(out, "{}", header.join(","))?;
    for row in reference.values().rows() {
        let fields: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", fields.join(","))?;
    }
    out.flush()?;
    Ok(path)
}

fn done(path: &Path, elapsed: std::time::Duration) {
    println!("Distance tiles saved to: {}", path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn run(cli: &Cli, settings: Settings) -> Result<()> {
    let start = Instant::now();

    let pb = spinner("Loading reference pixels...");
    let params = ReferenceParams {
        bands_to_use: cli.bands_to_use.clone(),
        alpha_channel: cli.alpha_channel,
        transform: settings.transform,
        ..Default::default()
    };
    let reference = ReferencePixels::from_paths(&cli.reference, &cli.annotated, params)
        .context("Failed to load reference pixels")?;
    pb.finish_and_clear();
    info!(
        "{} reference pixels over bands {:?}",
        reference.len(),
        reference.bands_to_use()
    );

    let csv = write_pixel_values(&reference, &cli.mask_file_name)?;
    info!("Reference pixel values written to {}", csv.display());

    let pb = spinner("Fitting color model...");
    let model = ColorModel::fit(settings.method, cli.param, &reference)
        .with_context(|| format!("Failed to fit {} model", settings.method))?;
    pb.finish_and_clear();

    let source = TiffSource::open(&cli.orthomosaic)
        .with_context(|| format!("Failed to open orthomosaic {}", cli.orthomosaic.display()))?;
    let (bands, rows, cols) = source.shape();
    info!("Orthomosaic: {} x {} with {} bands", cols, rows, bands);

    let pipeline = TiledPipeline::new(TilingParams {
        tile_size: cli.tile_size,
        scale: cli.scale,
        selection: settings.selection,
    })?
    .with_mode(ProcessingMode::from_jobs(cli.jobs));
    let tiles = pipeline.plan(&source)?;

    let sink = GeoTiffTileSink::create(&cli.output_tile_location).with_context(|| {
        format!(
            "Failed to create output directory {}",
            cli.output_tile_location.display()
        )
    })?;

    let bar = tile_bar(tiles.len());
    let report = pipeline.run_with_progress(&source, &model, &sink, |_, _| bar.inc(1))?;
    bar.finish_and_clear();

    for failure in &report.failures {
        warn!("Tile ({}, {}): {}", failure.row, failure.col, failure.error);
    }
    report
        .into_result()
        .with_context(|| format!("Classification with {} incomplete", model.name()))?;

    done(sink.dir(), start.elapsed());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let settings = Settings::from_cli(&cli).context("Invalid configuration")?;
    run(&cli, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ocdc_core::{Error, ErrorKind};

    fn parse(extra: &[&str]) -> std::result::Result<Cli, clap::Error> {
        let mut args = vec!["ocdc", "ortho.tiff", "reference.png", "annotated.png"];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args)
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.orthomosaic, PathBuf::from("ortho.tiff"));
        assert_eq!(cli.bands_to_use, None);
        assert_eq!(cli.alpha_channel, -1);
        assert_eq!(cli.scale, 5);
        assert_eq!(cli.output_tile_location, PathBuf::from("output/tiles"));
        assert_eq!(cli.mask_file_name, PathBuf::from("pixel_values"));
        assert_eq!(cli.method, "mahalanobis");
        assert_eq!(cli.param, 2.0);
        assert_eq!(cli.tile_size, 3000);
        assert!(cli.run_specific_tile.is_none());
        assert!(cli.run_specific_tileset.is_none());
        assert!(cli.gamma_transform.is_none());
        assert!(cli.lambda_transform.is_none());

        let settings = Settings::from_cli(&cli).unwrap();
        assert_eq!(settings.method, Method::Mahalanobis);
        assert!(settings.transform.is_none());
        assert_eq!(settings.selection, TileSelection::All);
    }

    #[test]
    fn test_all_options() {
        let cli = parse(&[
            "--bands_to_use", "0", "1", "2",
            "--alpha_channel", "3",
            "--scale", "2",
            "--output_tile_location", "out",
            "--mask_file_name", "px.csv",
            "--method", "gmm",
            "--param", "3",
            "--tile_size", "500",
            "--run_specific_tile", "16", "65",
            "--gamma_transform", "0.5",
            "--jobs", "4",
            "--verbose",
        ])
        .unwrap();
        assert_eq!(cli.bands_to_use, Some(vec![0, 1, 2]));
        assert_eq!(cli.alpha_channel, 3);
        assert_eq!(cli.scale, 2);
        assert_eq!(cli.tile_size, 500);
        assert_eq!(cli.param, 3.0);
        assert_eq!(cli.jobs, Some(4));
        assert!(cli.verbose);

        let settings = Settings::from_cli(&cli).unwrap();
        assert_eq!(settings.method, Method::GaussianMixture);
        assert_eq!(settings.selection, TileSelection::Single(16, 65));
        match settings.transform {
            Some(Transform::Gamma(g)) => assert_eq!(g.gamma(), 0.5),
            other => panic!("expected gamma transform, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_indices_parse() {
        let cli = parse(&["--bands_to_use", "-1", "--alpha_channel", "-1"]).unwrap();
        assert_eq!(cli.bands_to_use, Some(vec![-1]));
    }

    #[test]
    fn test_missing_positionals() {
        assert!(Cli::try_parse_from(["ocdc", "ortho.tiff", "reference.png"]).is_err());
        assert!(Cli::try_parse_from(["ocdc"]).is_err());
    }

    #[test]
    fn test_run_specific_tile_needs_two_values() {
        assert!(parse(&["--run_specific_tile", "16"]).is_err());
    }

    #[test]
    fn test_single_tile_takes_precedence_over_tileset() {
        let cli = parse(&["--run_specific_tile", "16", "65", "--run_specific_tileset", "16", "65"]).unwrap();
        assert_eq!(cli.run_specific_tile, Some(vec![16, 65]));
        assert_eq!(cli.run_specific_tileset, Some(vec![16, 65]));
        let settings = Settings::from_cli(&cli).unwrap();
        assert_eq!(settings.selection, TileSelection::Single(16, 65));

        let cli = parse(&["--run_specific_tile", "1", "2", "--run_specific_tileset", "3", "4"]).unwrap();
        assert_eq!(Settings::from_cli(&cli).unwrap().selection, TileSelection::Single(1, 2));
    }

    #[test]
    fn test_tileset() {
        let cli = parse(&["--run_specific_tileset", "1", "2", "3", "4", "1", "2"]).unwrap();
        let settings = Settings::from_cli(&cli).unwrap();
        assert_eq!(settings.selection, TileSelection::Set(vec![(1, 2), (3, 4)]));

        let cli = parse(&["--run_specific_tileset", "1", "2", "3"]).unwrap();
        assert!(Settings::from_cli(&cli).is_err());
    }

    #[test]
    fn test_both_transforms_rejected() {
        let cli = parse(&["--gamma_transform", "0.5", "--lambda_transform", "lambda x: x+5"]).unwrap();
        let err = Settings::from_cli(&cli).unwrap_err();
        assert!(matches!(err, Error::ConflictingTransforms));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_unknown_method_rejected() {
        let cli = parse(&["--method", "svm"]).unwrap();
        let err = Settings::from_cli(&cli).unwrap_err();
        assert_eq!(err.to_string(), "Method must be one of 'mahalanobis' or 'gmm', but got svm");
    }

    #[test]
    fn test_lambda_transform_setting() {
        let cli = parse(&["--lambda_transform", "lambda x: x+5"]).unwrap();
        let settings = Settings::from_cli(&cli).unwrap();
        assert_eq!(settings.transform.unwrap().apply(1.0).unwrap(), 6.0);
    }

    #[test]
    fn test_pixel_values_path() {
        assert_eq!(pixel_values_path(Path::new("pixel_values")), PathBuf::from("pixel_values.csv"));
        assert_eq!(pixel_values_path(Path::new("out/px.txt")), PathBuf::from("out/px.txt"));
    }

    #[test]
    fn test_write_pixel_values() {
        let dir = tempfile::tempdir().unwrap();
        let reference =
            ReferencePixels::from_values(vec![2, 0], array![[1.0, 2.5], [3.0, 4.0]], None).unwrap();
        let path = write_pixel_values(&reference, &dir.path().join("nested/values")).unwrap();
        assert_eq!(path, dir.path().join("nested/values.csv"));
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "band_2,band_0\n1,2.5\n3,4\n");
    }
}
