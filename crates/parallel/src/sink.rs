//! Destinations for distance tiles

use crate::tiled::Tile;
use ocdc_core::io::write_geotiff;
use ocdc_core::{Error, Raster, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Receives each finished distance tile with its grid address.
///
/// Tiles may arrive from several threads and in any order.
pub trait TileSink: Send + Sync {
    fn write_tile(&self, tile: &Tile, distance: Raster<f64>) -> Result<()>;
}

impl<F> TileSink for F
where
    F: Fn(&Tile, Raster<f64>) -> Result<()> + Send + Sync,
{
    fn write_tile(&self, tile: &Tile, distance: Raster<f64>) -> Result<()> {
        self(tile, distance)
    }
}

/// Writes one single-band float GeoTIFF per tile into a directory
#[derive(Debug, Clone)]
pub struct GeoTiffTileSink {
    dir: PathBuf,
}

impl GeoTiffTileSink {
    /// Use `dir` as output directory, creating it if needed
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Output file of the tile at `(row, col)`
    pub fn tile_path(&self, row: usize, col: usize) -> PathBuf {
        self.dir.join(format!("distance_tile_{}_{}.tiff", row, col))
    }
}

impl TileSink for GeoTiffTileSink {
    fn write_tile(&self, tile: &Tile, distance: Raster<f64>) -> Result<()> {
        write_geotiff(&distance, self.tile_path(tile.row, tile.col))
    }
}

/// Keeps finished tiles in memory, keyed by grid address
#[derive(Debug, Default)]
pub struct MemoryTileSink {
    tiles: Mutex<BTreeMap<(usize, usize), Raster<f64>>>,
}

impl MemoryTileSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses received so far, in row-major order
    pub fn addresses(&self) -> Vec<(usize, usize)> {
        self.lock().map(|t| t.keys().copied().collect()).unwrap_or_default()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Raster<f64>> {
        self.lock().ok().and_then(|t| t.get(&(row, col)).cloned())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_tiles(self) -> BTreeMap<(usize, usize), Raster<f64>> {
        self.tiles.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<(usize, usize), Raster<f64>>>> {
        self.tiles
            .lock()
            .map_err(|_| Error::Other("tile store lock poisoned".into()))
    }
}

impl TileSink for MemoryTileSink {
    fn write_tile(&self, tile: &Tile, distance: Raster<f64>) -> Result<()> {
        self.lock()?.insert(tile.address(), distance);
        Ok(())
    }
}
