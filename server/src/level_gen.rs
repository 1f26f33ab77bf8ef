//! Procedural generation of dungeon floors and the village.
//!
//! Dungeon floors are rooms joined by L-shaped corridors; the village is an open
//! clearing with scattered trees and a cave mouth leading down. Shapes are fixed by
//! [`GenerationConfig`]. Placement is random, seeded explicitly in tests.

use crate::config::GenerationConfig;
use crate::error::{WorldError, WorldResult};
use crate::grid::{Cell, Grid, Room};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::Tile;

/// Random room samples allowed per requested room.
const PLACEMENT_TRIES_PER_ROOM: usize = 30;

/// Output of one generation run, before it is wrapped into a live floor.
#[derive(Debug, Clone)]
pub struct GeneratedLevel {
    pub level: u32,
    pub grid: Grid,
    pub rooms: Vec<Room>,
    pub up_stairs: Option<Cell>,
    pub down_stairs: Option<Cell>,
    /// Where freshly registered players appear.
    pub spawn: Cell,
}

pub struct LevelGenerator {
    config: GenerationConfig,
    last_level: u32,
    rng: StdRng,
}

impl LevelGenerator {
    /// Creates a generator for floors `0..=last_level` seeded from OS entropy.
    pub fn new(config: GenerationConfig, last_level: u32) -> Self {
        Self {
            config,
            last_level,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(config: GenerationConfig, last_level: u32, seed: u64) -> Self {
        Self {
            config,
            last_level,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generates the floor at `level`. Level 0 is always the village.
    pub fn generate(&mut self, level: u32) -> WorldResult<GeneratedLevel> {
        if level > self.last_level {
            return Err(WorldError::FloorUnavailable(level));
        }
        if level == 0 {
            return Ok(self.generate_village());
        }
        self.generate_dungeon(level)
    }

    fn generate_dungeon(&mut self, level: u32) -> WorldResult<GeneratedLevel> {
        for attempt in 1..=self.config.max_generation_attempts {
            let (grid, rooms) = self.carve_rooms();
            if !rooms.is_empty() {
                debug!(
                    "Generated level {} with {} rooms (attempt {})",
                    level,
                    rooms.len(),
                    attempt
                );
                return self.place_stairs(level, grid, rooms);
            }
            warn!(
                "Level {} generation attempt {} placed no rooms, retrying",
                level, attempt
            );
        }

        warn!("Level {} falling back to a single forced room", level);
        let (grid, rooms) = self.forced_room()?;
        self.place_stairs(level, grid, rooms)
    }

    /// Places up to a random target count of non-overlapping rooms and joins them.
    ///
    /// A rejected placement does not use up a room: sampling continues until the
    /// target is reached or `target * PLACEMENT_TRIES_PER_ROOM` samples have been
    /// drawn, so crowded grids can still come back short.
    fn carve_rooms(&mut self) -> (Grid, Vec<Room>) {
        let cfg = &self.config;
        let mut grid = Grid::new(cfg.grid_width, cfg.grid_height);
        let mut rooms: Vec<Room> = Vec::new();

        let target = self.rng.gen_range(cfg.min_rooms..=cfg.max_rooms);
        let mut tries = 0;

        while rooms.len() < target && tries < target * PLACEMENT_TRIES_PER_ROOM {
            tries += 1;

            let w = self.rng.gen_range(cfg.room_min_size..=cfg.room_max_size);
            let h = self.rng.gen_range(cfg.room_min_size..=cfg.room_max_size);
            // Keep a one-tile wall border around the grid
            if w + 2 >= cfg.grid_width || h + 2 >= cfg.grid_height {
                continue;
            }
            let x = self.rng.gen_range(1..=cfg.grid_width - w - 1);
            let y = self.rng.gen_range(1..=cfg.grid_height - h - 1);
            let room = Room::new(x, y, w, h);

            if rooms.iter().any(|other| room.intersects(other, cfg.room_buffer)) {
                continue;
            }

            carve_room(&mut grid, &room);
            if let Some(prev) = rooms.last() {
                carve_corridor(&mut grid, prev.center(), room.center(), cfg.corridor_width);
            }
            rooms.push(room);
        }

        connect_rooms(&mut grid, &rooms, cfg.corridor_width);
        (grid, rooms)
    }

    /// A single minimum-size room in the middle of the grid.
    fn forced_room(&self) -> WorldResult<(Grid, Vec<Room>)> {
        let cfg = &self.config;
        let size = cfg.room_min_size;
        if size + 2 >= cfg.grid_width || size + 2 >= cfg.grid_height {
            return Err(WorldError::GenerationFailed(format!(
                "a {}x{} room does not fit in a {}x{} grid",
                size, size, cfg.grid_width, cfg.grid_height
            )));
        }

        let room = Room::new(
            (cfg.grid_width - size) / 2,
            (cfg.grid_height - size) / 2,
            size,
            size,
        );
        let mut grid = Grid::new(cfg.grid_width, cfg.grid_height);
        carve_room(&mut grid, &room);
        Ok((grid, vec![room]))
    }

    /// Writes stairs into the first and last room centres.
    fn place_stairs(
        &self,
        level: u32,
        mut grid: Grid,
        rooms: Vec<Room>,
    ) -> WorldResult<GeneratedLevel> {
        let (Some(&first), Some(&last)) = (rooms.first(), rooms.last()) else {
            return Err(WorldError::GenerationFailed(format!(
                "level {} has no room for stairs",
                level
            )));
        };

        let up_stairs = (level > 0).then(|| first.center());
        let down_stairs = (level < self.last_level).then(|| {
            let center = last.center();
            if Some(center) == up_stairs {
                // One-room floor: step off the up-stairs, still inside the room
                (center.0 + 1, center.1)
            } else {
                center
            }
        });

        if let Some((x, y)) = up_stairs {
            grid.set(x, y, Tile::StairsUp);
        }
        if let Some((x, y)) = down_stairs {
            grid.set(x, y, Tile::StairsDown);
        }

        Ok(GeneratedLevel {
            level,
            grid,
            rooms,
            up_stairs,
            down_stairs,
            spawn: first.center(),
        })
    }

    /// The surface clearing: trees thicken toward the edge, a cave mouth leads down.
    pub fn generate_village(&mut self) -> GeneratedLevel {
        let cfg = self.config.clone();
        let mut grid = Grid::new(cfg.grid_width, cfg.grid_height);
        let (cx, cy) = (cfg.grid_width / 2, cfg.grid_height / 2);
        let radius = cfg.village_radius as f32;
        let rim_start = radius - cfg.village_rim_width as f32;

        for y in 0..cfg.grid_height {
            for x in 0..cfg.grid_width {
                let dx = x as f32 - cx as f32;
                let dy = y as f32 - cy as f32;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist > radius {
                    continue;
                }

                let rim_tree = dist > rim_start && self.rng.gen_bool(cfg.village_rim_tree_chance);
                let interior_tree = self.rng.gen_bool(cfg.village_interior_tree_chance);
                let tile = if rim_tree || interior_tree {
                    Tile::Obstacle
                } else {
                    Tile::Floor
                };
                grid.set(x, y, tile);
            }
        }

        let (cx_i, cy_i) = (cx as isize, cy as isize);
        // Plaza around the spawn point
        grid.fill_rect(cx_i - 1, cy_i - 1, cx_i + 1, cy_i + 1, Tile::Floor);

        let mouth_w = cfg.cave_mouth_width as isize;
        let mouth_h = cfg.cave_mouth_height as isize;
        let mouth = (cx, cy + cfg.village_radius - cfg.cave_mouth_height - 2);
        let (mx, my) = (mouth.0 as isize, mouth.1 as isize);
        let (x0, y0) = (mx - mouth_w / 2, my - mouth_h / 2);
        let (x1, y1) = (x0 + mouth_w - 1, y0 + mouth_h - 1);

        for y in (y0 - 1).max(0)..=(y1 + 1) {
            for x in (x0 - 1).max(0)..=(x1 + 1) {
                if grid.get(x as usize, y as usize) == Some(Tile::Obstacle) {
                    grid.set(x as usize, y as usize, Tile::Floor);
                }
            }
        }
        grid.fill_rect(x0, y0, x1, y1, Tile::Floor);
        // Clear road from the plaza to the cave mouth
        grid.fill_rect(cx_i, cy_i, cx_i, my, Tile::Floor);
        grid.set(mouth.0, mouth.1, Tile::StairsDown);

        debug!(
            "Generated village with {} trees",
            grid.count(Tile::Obstacle)
        );

        GeneratedLevel {
            level: 0,
            grid,
            rooms: Vec::new(),
            up_stairs: None,
            down_stairs: Some(mouth),
            spawn: (cx, cy),
        }
    }
}

fn carve_room(grid: &mut Grid, room: &Room) {
    grid.fill_rect(
        room.x as isize,
        room.y as isize,
        (room.x + room.w - 1) as isize,
        (room.y + room.h - 1) as isize,
        Tile::Floor,
    );
}

/// Horizontal run along the source row, then vertical run along the destination column.
fn carve_corridor(grid: &mut Grid, from: Cell, to: Cell, width: usize) {
    let lo = -((width / 2) as isize);
    let hi = lo + width as isize - 1;
    let max_x = grid.width() as isize - 2;
    let max_y = grid.height() as isize - 2;

    let (fx, fy) = (from.0 as isize, from.1 as isize);
    let (tx, ty) = (to.0 as isize, to.1 as isize);

    grid.fill_rect(
        fx.min(tx).max(1),
        (fy + lo).max(1),
        fx.max(tx).min(max_x),
        (fy + hi).min(max_y),
        Tile::Floor,
    );
    grid.fill_rect(
        (tx + lo).max(1),
        fy.min(ty).max(1),
        (tx + hi).min(max_x),
        fy.max(ty).min(max_y),
        Tile::Floor,
    );
}

/// Re-walks consecutive rooms and carves a corridor between any pair that flood-fill
/// says is still disconnected.
fn connect_rooms(grid: &mut Grid, rooms: &[Room], width: usize) {
    for pair in rooms.windows(2) {
        let (a, b) = (pair[0].center(), pair[1].center());
        if !grid.reachable_from(a).contains(&b) {
            debug!("Rooms at {:?} and {:?} disconnected, carving link", a, b);
            carve_corridor(grid, a, b, width);
        }
    }
}
