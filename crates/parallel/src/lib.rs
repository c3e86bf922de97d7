//! # OCDC Parallel
//!
//! Tiled processing of rasters too large to hold in memory.
//!
//! This crate provides:
//! - The tile grid and tile selections (whole grid, one tile, a tile set)
//! - A pipeline that scores every selected tile with a distance model
//! - Sinks that write or collect the distance tiles
//! - Sequential or Rayon-parallel tile iteration

pub mod pipeline;
pub mod sink;
pub mod strategy;
pub mod tiled;

pub use pipeline::{TileFailure, TileReport, TiledPipeline, TilingParams};
pub use sink::{GeoTiffTileSink, MemoryTileSink, TileSink};
pub use strategy::{ParallelStrategy, ProcessingMode};
pub use tiled::{Tile, TileGrid, TileSelection};
