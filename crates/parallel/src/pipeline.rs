//! Tiled distance pipeline
//!
//! Applies a fitted [`DistanceModel`] to a raster too large to hold in
//! memory: each selected tile is read from the source, downsampled,
//! preprocessed by the model, scored and handed to a [`TileSink`].
//!
//! Tiles are independent. A failing tile is recorded in the
//! [`TileReport`] and the remaining tiles still run, except when a single
//! tile was requested, in which case its error is returned right away as
//! [`Error::Tile`].

use crate::sink::TileSink;
use crate::strategy::{ParallelStrategy, ProcessingMode};
use crate::tiled::{Tile, TileGrid, TileSelection};
use ocdc_core::io::RasterSource;
use ocdc_core::{DistanceModel, Error, Raster, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Parameters for tiled processing
#[derive(Debug, Clone)]
pub struct TilingParams {
    /// Tile edge length in source pixels (default: 3000)
    pub tile_size: usize,
    /// Keep every `scale`-th pixel of a tile (default: 5)
    pub scale: usize,
    /// Tiles to process (default: all)
    pub selection: TileSelection,
}

impl Default for TilingParams {
    fn default() -> Self {
        Self {
            tile_size: 3000,
            scale: 5,
            selection: TileSelection::All,
        }
    }
}

/// A tile that could not be processed
#[derive(Debug)]
pub struct TileFailure {
    pub row: usize,
    pub col: usize,
    pub error: Error,
}

/// Outcome of a pipeline run
#[derive(Debug, Default)]
pub struct TileReport {
    /// Addresses written to the sink, in selection order
    pub processed: Vec<(usize, usize)>,
    /// Tiles that failed, in selection order
    pub failures: Vec<TileFailure>,
    /// Tiles never started because the run was cancelled
    pub skipped: usize,
}

impl TileReport {
    /// Number of tiles selected for the run
    pub fn total(&self) -> usize {
        self.processed.len() + self.failures.len() + self.skipped
    }

    /// True when every selected tile was processed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0
    }

    /// Turn recorded failures into an error
    pub fn into_result(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(Error::TilesFailed {
                failed: self.failures.len(),
                total: self.total(),
            })
        }
    }
}

enum Outcome {
    Processed,
    Failed(Error),
    Skipped,
}

/// Runs a distance model over the tiles of a raster source
#[derive(Debug, Clone)]
pub struct TiledPipeline {
    params: TilingParams,
    mode: ProcessingMode,
    cancel: Option<Arc<AtomicBool>>,
}

impl TiledPipeline {
    pub fn new(params: TilingParams) -> Result<Self> {
        if params.tile_size == 0 {
            return Err(Error::InvalidParameter {
                name: "tile_size",
                value: params.tile_size.to_string(),
                reason: "must be positive".into(),
            });
        }
        if params.scale == 0 {
            return Err(Error::InvalidParameter {
                name: "scale",
                value: params.scale.to_string(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(Self {
            params,
            mode: ProcessingMode::Sequential,
            cancel: None,
        })
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Stop starting new tiles once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn params(&self) -> &TilingParams {
        &self.params
    }

    /// Tile grid over a source raster
    pub fn grid<S: RasterSource + ?Sized>(&self, source: &S) -> Result<TileGrid> {
        let (_, rows, cols) = source.shape();
        TileGrid::new(rows, cols, self.params.tile_size)
    }

    /// Tiles the configured selection resolves to, in processing order
    pub fn plan<S: RasterSource + ?Sized>(&self, source: &S) -> Result<Vec<Tile>> {
        self.params.selection.resolve(&self.grid(source)?)
    }

    /// Read, downsample, preprocess and score one tile
    pub fn process_tile<S, M>(&self, source: &S, model: &M, tile: &Tile) -> Result<Raster<f64>>
    where
        S: RasterSource + ?Sized,
        M: DistanceModel + ?Sized,
    {
        let stack = source.read_window(&tile.window)?;
        let stack = stack.downsample(self.params.scale)?;
        let stack = model.preprocess(stack)?;
        model.calculate_distance(&stack)
    }

    pub fn run<S, M, K>(&self, source: &S, model: &M, sink: &K) -> Result<TileReport>
    where
        S: RasterSource + ?Sized,
        M: DistanceModel + ?Sized,
        K: TileSink + ?Sized,
    {
        self.run_with_progress(source, model, sink, |_, _| {})
    }

    /// Like [`run`](Self::run), calling `progress` after every finished tile
    /// with the tile's error, if any.
    pub fn run_with_progress<S, M, K, P>(&self, source: &S, model: &M, sink: &K, progress: P) -> Result<TileReport>
    where
        S: RasterSource + ?Sized,
        M: DistanceModel + ?Sized,
        K: TileSink + ?Sized,
        P: Fn(&Tile, Option<&Error>) + Sync + Send,
    {
        let grid = self.grid(source)?;
        let tiles = self.params.selection.resolve(&grid)?;
        let (tile_rows, tile_cols) = grid.dims();
        info!(
            "Processing {} of {} tiles ({} x {} grid, tile size {}, scale {}) with {}",
            tiles.len(),
            grid.len(),
            tile_rows,
            tile_cols,
            self.params.tile_size,
            self.params.scale,
            model.name()
        );

        let outcomes = self.mode.par_map(0..tiles.len(), |i| {
            let tile = &tiles[i];
            if self.is_cancelled() {
                return Outcome::Skipped;
            }
            let start = Instant::now();
            let result = self
                .process_tile(source, model, tile)
                .and_then(|distance| sink.write_tile(tile, distance));
            debug!(
                "Tile ({}, {}) finished in {:.2?}",
                tile.row,
                tile.col,
                start.elapsed()
            );
            progress(tile, result.as_ref().err());
            match result {
                Ok(()) => Outcome::Processed,
                Err(e) => Outcome::Failed(e),
            }
        });

        let mut report = TileReport::default();
        for (tile, outcome) in tiles.iter().zip(outcomes) {
            match outcome {
                Outcome::Processed => report.processed.push(tile.address()),
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed(error) => {
                    if self.params.selection.is_single() {
                        return Err(error.in_tile(tile.row, tile.col));
                    }
                    warn!("Tile ({}, {}) failed: {}", tile.row, tile.col, error);
                    report.failures.push(TileFailure {
                        row: tile.row,
                        col: tile.col,
                        error,
                    });
                }
            }
        }

        if report.skipped > 0 {
            warn!("Cancelled, {} tiles not started", report.skipped);
        }
        info!(
            "{} tiles processed, {} failed",
            report.processed.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
