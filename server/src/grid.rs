//! Tile grid storage, room rectangles and the geometric queries floors run against them.

use shared::{Position, Tile};
use std::collections::{HashSet, VecDeque};

/// A grid cell as `(column, row)`.
pub type Cell = (usize, usize);

/// Row-major tile grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: usize,
    height: usize,
    tiles: Vec<Tile>,
}

impl Grid {
    /// Creates a grid of solid wall.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            tiles: vec![Tile::Wall; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Tile> {
        if x < self.width && y < self.height {
            Some(self.tiles[y * self.width + x])
        } else {
            None
        }
    }

    /// Writes a tile. Out-of-bounds writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, tile: Tile) {
        if x < self.width && y < self.height {
            self.tiles[y * self.width + x] = tile;
        }
    }

    pub fn codes(&self) -> Vec<u8> {
        self.tiles.iter().map(|t| t.code()).collect()
    }

    pub fn count(&self, tile: Tile) -> usize {
        self.tiles.iter().filter(|t| **t == tile).count()
    }

    /// Number of tiles an actor can stand on.
    pub fn open_tiles(&self) -> usize {
        self.tiles.iter().filter(|t| !t.is_solid()).count()
    }

    /// Fills the inclusive rectangle, clipped to the grid.
    pub fn fill_rect(&mut self, x0: isize, y0: isize, x1: isize, y1: isize, tile: Tile) {
        let x0 = x0.max(0) as usize;
        let y0 = y0.max(0) as usize;
        if x1 < 0 || y1 < 0 {
            return;
        }
        let x1 = (x1 as usize).min(self.width.saturating_sub(1));
        let y1 = (y1 as usize).min(self.height.saturating_sub(1));
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.set(x, y, tile);
            }
        }
    }

    /// Converts a world point to the cell containing it, or `None` outside the grid.
    pub fn cell_at(&self, x: f32, y: f32, tile_size: f32) -> Option<Cell> {
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }
        let cx = (x / tile_size).floor() as usize;
        let cy = (y / tile_size).floor() as usize;
        if cx < self.width && cy < self.height {
            Some((cx, cy))
        } else {
            None
        }
    }

    /// World position of a cell's centre.
    pub fn cell_center(cell: Cell, tile_size: f32) -> Position {
        Position::new(
            (cell.0 as f32 + 0.5) * tile_size,
            (cell.1 as f32 + 0.5) * tile_size,
        )
    }

    /// True when an actor of `size` centred on `pos` would touch a solid or
    /// out-of-bounds cell at any corner of its bounding box.
    pub fn collides(&self, pos: &Position, size: f32, tile_size: f32) -> bool {
        // Corners sit just inside the box so an actor flush with a tile edge
        // does not sample the neighbouring tile.
        let half = (size / 2.0 - 1e-3).max(0.0);
        let corners = [
            (pos.x - half, pos.y - half),
            (pos.x + half, pos.y - half),
            (pos.x - half, pos.y + half),
            (pos.x + half, pos.y + half),
        ];

        corners.iter().any(|&(x, y)| match self.cell_at(x, y, tile_size) {
            Some((cx, cy)) => self.get(cx, cy).map_or(true, Tile::is_solid),
            None => true,
        })
    }

    /// Every walkable cell reachable from `start` through 4-neighbour steps.
    pub fn reachable_from(&self, start: Cell) -> HashSet<Cell> {
        let mut seen = HashSet::new();
        if self.get(start.0, start.1).map_or(true, Tile::is_solid) {
            return seen;
        }

        let mut queue = VecDeque::from([start]);
        seen.insert(start);
        while let Some((x, y)) = queue.pop_front() {
            let neighbours = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for next in neighbours {
                if let Some(tile) = self.get(next.0, next.1) {
                    if !tile.is_solid() && seen.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        seen
    }
}

/// Axis-aligned room rectangle in tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Room {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

impl Room {
    pub fn new(x: usize, y: usize, w: usize, h: usize) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> Cell {
        (self.x + self.w / 2, self.y + self.h / 2)
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.0 >= self.x && cell.0 < self.x + self.w && cell.1 >= self.y && cell.1 < self.y + self.h
    }

    /// AABB overlap test with `self` expanded by `buffer` tiles on every side.
    pub fn intersects(&self, other: &Room, buffer: usize) -> bool {
        let (x, y) = (self.x as isize, self.y as isize);
        let (w, h) = (self.w as isize, self.h as isize);
        let b = buffer as isize;
        let (ox, oy) = (other.x as isize, other.y as isize);
        let (ow, oh) = (other.w as isize, other.h as isize);

        x - b < ox + ow && x + w + b > ox && y - b < oy + oh && y + h + b > oy
    }
}
