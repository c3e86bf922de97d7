//! Tile grid over a large raster

use ocdc_core::{Error, PixelWindow, Result};

/// A tile of the grid: its grid address and the pixel window it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Tile row in the grid
    pub row: usize,
    /// Tile column in the grid
    pub col: usize,
    /// Pixels covered in the source raster
    pub window: PixelWindow,
}

impl Tile {
    pub fn address(&self) -> (usize, usize) {
        (self.row, self.col)
    }
}

/// Square tiles of `tile_size` pixels covering a `rows` x `cols` raster.
///
/// Tiles on the trailing row and column are trimmed to the raster edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    rows: usize,
    cols: usize,
    tile_size: usize,
    tile_rows: usize,
    tile_cols: usize,
}

impl TileGrid {
    pub fn new(rows: usize, cols: usize, tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(Error::InvalidParameter {
                name: "tile_size",
                value: tile_size.to_string(),
                reason: "must be positive".into(),
            });
        }
        Ok(Self {
            rows,
            cols,
            tile_size,
            tile_rows: rows.div_ceil(tile_size),
            tile_cols: cols.div_ceil(tile_size),
        })
    }

    /// Grid dimensions as (tile rows, tile cols)
    pub fn dims(&self) -> (usize, usize) {
        (self.tile_rows, self.tile_cols)
    }

    /// Total number of tiles
    pub fn len(&self) -> usize {
        self.tile_rows * self.tile_cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.tile_rows && col < self.tile_cols
    }

    /// The tile at a grid address, `None` outside the grid
    pub fn tile(&self, row: usize, col: usize) -> Option<Tile> {
        if !self.contains(row, col) {
            return None;
        }
        let row_start = row * self.tile_size;
        let col_start = col * self.tile_size;
        Some(Tile {
            row,
            col,
            window: PixelWindow::new(
                row_start,
                (row_start + self.tile_size).min(self.rows),
                col_start,
                (col_start + self.tile_size).min(self.cols),
            ),
        })
    }

    /// All tiles, row by row
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.tile_rows)
            .flat_map(move |r| (0..self.tile_cols).map(move |c| (r, c)))
            .filter_map(move |(r, c)| self.tile(r, c))
    }
}

/// Which tiles of the grid to process
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TileSelection {
    /// The whole grid
    #[default]
    All,
    /// One tile, whose failure is returned directly
    Single(usize, usize),
    /// A list of tiles, processed in the given order
    Set(Vec<(usize, usize)>),
}

impl TileSelection {
    /// Build a tile set from a flat `row col row col ...` list.
    ///
    /// Repeated addresses are kept once, at their first position.
    pub fn from_pairs(values: &[usize]) -> Result<Self> {
        if values.len() % 2 != 0 {
            return Err(Error::InvalidParameter {
                name: "run_specific_tileset",
                value: format!("{:?}", values),
                reason: "expected row/col pairs".into(),
            });
        }
        let mut tiles: Vec<(usize, usize)> = Vec::with_capacity(values.len() / 2);
        for pair in values.chunks_exact(2) {
            let address = (pair[0], pair[1]);
            if !tiles.contains(&address) {
                tiles.push(address);
            }
        }
        Ok(TileSelection::Set(tiles))
    }

    /// Tiles to process on `grid`, in processing order.
    ///
    /// An address outside the grid is a configuration error.
    pub fn resolve(&self, grid: &TileGrid) -> Result<Vec<Tile>> {
        let lookup = |&(row, col): &(usize, usize)| {
            grid.tile(row, col).ok_or_else(|| {
                let (tile_rows, tile_cols) = grid.dims();
                Error::InvalidParameter {
                    name: "tile",
                    value: format!("({}, {})", row, col),
                    reason: format!("the tile grid is {} x {}", tile_rows, tile_cols),
                }
            })
        };
        match self {
            TileSelection::All => Ok(grid.tiles().collect()),
            TileSelection::Single(row, col) => Ok(vec![lookup(&(*row, *col))?]),
            TileSelection::Set(addresses) => addresses.iter().map(lookup).collect(),
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, TileSelection::Single(..))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_dims() {
        let grid = TileGrid::new(100, 250, 32).unwrap();
        assert_eq!(grid.dims(), (4, 8));
        assert_eq!(grid.len(), 32);
        assert!(TileGrid::new(10, 10, 0).is_err());
        assert!(TileGrid::new(0, 10, 4).unwrap().is_empty());
    }

    #[test]
    fn test_tile_coverage() {
        for (rows, cols, size) in [(100, 100, 32), (64, 64, 32), (7, 13, 5), (3, 3, 10)] {
            let grid = TileGrid::new(rows, cols, size).unwrap();
            let mut covered = vec![vec![0u8; cols]; rows];

            for tile in grid.tiles() {
                let w = tile.window;
                assert!(w.rows() <= size && w.cols() <= size);
                for r in w.row_start..w.row_end {
                    for c in w.col_start..w.col_end {
                        covered[r][c] += 1;
                    }
                }
            }

            // Every cell covered exactly once
            for r in 0..rows {
                for c in 0..cols {
                    assert_eq!(covered[r][c], 1, "Cell ({}, {}) covered {} times", r, c, covered[r][c]);
                }
            }
        }
    }

    #[test]
    fn test_only_trailing_tiles_are_short() {
        let grid = TileGrid::new(70, 45, 20).unwrap();
        for tile in grid.tiles() {
            let (tr, tc) = grid.dims();
            if tile.row + 1 < tr {
                assert_eq!(tile.window.rows(), 20);
            }
            if tile.col + 1 < tc {
                assert_eq!(tile.window.cols(), 20);
            }
        }
        let corner = grid.tile(3, 2).unwrap();
        assert_eq!(corner.window, PixelWindow::new(60, 70, 40, 45));
        assert!(grid.tile(4, 0).is_none());
    }

    #[test]
    fn test_tiles_row_major() {
        let grid = TileGrid::new(20, 30, 10).unwrap();
        let addresses: Vec<_> = grid.tiles().map(|t| t.address()).collect();
        assert_eq!(addresses, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
    }

    #[test]
    fn test_from_pairs() {
        let sel = TileSelection::from_pairs(&[1, 2, 0, 0, 1, 2, 3, 1]).unwrap();
        assert_eq!(sel, TileSelection::Set(vec![(1, 2), (0, 0), (3, 1)]));
        assert!(TileSelection::from_pairs(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_resolve() {
        let grid = TileGrid::new(100, 100, 10).unwrap();
        assert_eq!(TileSelection::All.resolve(&grid).unwrap().len(), 100);

        let single = TileSelection::Single(9, 9).resolve(&grid).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].window, PixelWindow::new(90, 100, 90, 100));

        let err = TileSelection::Single(16, 65).resolve(&grid).unwrap_err();
        assert_eq!(err.kind(), ocdc_core::ErrorKind::Configuration);
        assert!(TileSelection::Set(vec![(0, 0), (10, 0)]).resolve(&grid).is_err());
    }
}
