//! One live dungeon floor: its immutable grid plus the players, NPCs and treasure on it.
//!
//! All movement on a floor funnels through the grid's collision query, so players
//! and NPCs obey exactly the same rules. The floor never reaches outside itself;
//! transitions to other floors are reported upward as [`FloorEvent`]s.

use crate::config::{FloorConfig, WorldConfig};
use crate::entity::{Npc, Player};
use crate::grid::{Cell, Grid};
use crate::items::ItemCatalog;
use crate::level_gen::GeneratedLevel;
use crate::physics::Vector2;
use log::debug;
use rand::Rng;
use shared::{
    FloorSnapshot, Item, NpcView, PlayerView, Position, StairsDirection, Tile, TreasureView,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Item lying on the floor until some player walks over it.
#[derive(Debug, Clone, PartialEq)]
pub struct Treasure {
    pub id: u32,
    pub position: Position,
    pub item: Item,
}

/// Result of pressing the action key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StairsInteraction {
    pub floor_change: bool,
    pub direction: Option<StairsDirection>,
}

impl StairsInteraction {
    const NONE: StairsInteraction = StairsInteraction {
        floor_change: false,
        direction: None,
    };
}

/// Things that happened during a floor tick that someone outside the floor must act on.
#[derive(Debug, Clone, PartialEq)]
pub enum FloorEvent {
    PositionRejected {
        player_id: u32,
        position: Position,
    },
    StairsUsed {
        player_id: u32,
        direction: StairsDirection,
    },
    TreasureCollected {
        player_id: u32,
        item: Item,
        levels_gained: u32,
    },
}

/// Plain per-floor state for broadcasting.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastSnapshot {
    pub level: u32,
    pub players: Vec<PlayerView>,
    pub npcs: Vec<NpcView>,
    pub treasures: Vec<TreasureView>,
}

/// One live floor: its tile grid, stairs and the actors currently on it.
///
/// The floor owns its players, NPCs and treasure by id. Players enter through
/// [`FloorWorld::add_player`], which places arrivals on the stairs they came out of,
/// and leave through [`FloorWorld::remove_player`]; the world manager performs moves
/// between floors as remove-then-add.
///
/// Every change a player can make to their position goes through collision here,
/// whether it comes from held keys during [`FloorWorld::update`] or from a
/// client-proposed position in [`FloorWorld::process_position_update`]. NPCs follow
/// the same collision rule.
pub struct FloorWorld {
    level: u32,
    grid: Grid,
    up_stairs: Option<Cell>,
    down_stairs: Option<Cell>,
    spawn: Cell,
    settings: FloorConfig,
    config: Arc<WorldConfig>,
    players: HashMap<u32, Player>,
    npcs: HashMap<u32, Npc>,
    treasures: HashMap<u32, Treasure>,
    next_npc_id: u32,
    next_treasure_id: u32,
}

impl FloorWorld {
    /// Wraps a generated level. The floor starts empty; call [`FloorWorld::populate`].
    pub fn new(generated: GeneratedLevel, config: Arc<WorldConfig>) -> Self {
        let settings = config.floor(generated.level).cloned().unwrap_or(FloorConfig {
            enemy_level: generated.level,
            enemy_density: 0.0,
            treasure_density: 0.0,
        });

        Self {
            level: generated.level,
            grid: generated.grid,
            up_stairs: generated.up_stairs,
            down_stairs: generated.down_stairs,
            spawn: generated.spawn,
            settings,
            config,
            players: HashMap::new(),
            npcs: HashMap::new(),
            treasures: HashMap::new(),
            next_npc_id: 1,
            next_treasure_id: 1,
        }
    }

    pub fn populate<R: Rng>(&mut self, rng: &mut R, catalog: &ItemCatalog) {
        let npcs = self.generate_npcs(rng);
        let treasures = self.generate_treasure(rng, catalog);
        debug!(
            "Populated level {} with {} npcs and {} treasures",
            self.level, npcs, treasures
        );
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn settings(&self) -> &FloorConfig {
        &self.settings
    }

    pub fn up_stairs(&self) -> Option<Cell> {
        self.up_stairs
    }

    pub fn down_stairs(&self) -> Option<Cell> {
        self.down_stairs
    }

    pub fn spawn_position(&self) -> Position {
        Grid::cell_center(self.spawn, self.config.tile_size)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player_ids(&self) -> Vec<u32> {
        self.players.keys().copied().collect()
    }

    pub fn npcs(&self) -> impl Iterator<Item = &Npc> {
        self.npcs.values()
    }

    pub fn treasures(&self) -> impl Iterator<Item = &Treasure> {
        self.treasures.values()
    }

    /// Registers a player on this floor. Players arriving from another floor are
    /// placed on the stairs they would have come out of.
    pub fn add_player(&mut self, mut player: Player) {
        if player.previous_floor != self.level {
            let arrival = if player.previous_floor < self.level {
                self.up_stairs
            } else {
                self.down_stairs
            };
            let cell = arrival.unwrap_or(self.spawn);
            player.teleport(Grid::cell_center(cell, self.config.tile_size));
        }
        player.current_floor = self.level;
        self.players.insert(player.id, player);
    }

    pub fn remove_player(&mut self, id: u32) -> Option<Player> {
        self.players.remove(&id)
    }

    pub fn get_player(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_player_mut(&mut self, id: u32) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn check_collision(&self, pos: &Position, size: f32) -> bool {
        self.grid.collides(pos, size, self.config.tile_size)
    }

    /// Moves a player on the tile plane if the target is free. Height is untouched.
    pub fn update_player_position(&mut self, id: u32, new_pos: Position) -> bool {
        let size = match self.players.get(&id) {
            Some(player) => player.size,
            None => return false,
        };
        if self.check_collision(&new_pos, size) {
            return false;
        }
        if let Some(player) = self.players.get_mut(&id) {
            player.position.x = new_pos.x;
            player.position.y = new_pos.y;
        }
        true
    }

    /// Vets a client-proposed position: speed first, then collision.
    pub fn process_position_update(&mut self, id: u32, x: f32, y: f32, timestamp: u64) -> bool {
        let Some(player) = self.players.get(&id) else {
            return false;
        };
        let proposed = Position {
            x,
            y,
            z: player.position.z,
        };
        if !player.validate_proposed_position(&proposed, timestamp)
            || self.check_collision(&proposed, player.size)
        {
            return false;
        }
        if let Some(player) = self.players.get_mut(&id) {
            player.accept_proposed_position(proposed, timestamp);
        }
        true
    }

    pub fn handle_stairs_interaction(&self, id: u32) -> StairsInteraction {
        match self.players.get(&id) {
            Some(player) => stairs_interaction(
                &self.grid,
                self.up_stairs,
                self.down_stairs,
                &player.position,
                &self.config,
            ),
            None => StairsInteraction::NONE,
        }
    }

    /// Spawns NPCs on random floor cells, about `open tiles * enemy_density / 100` of them.
    /// Sparse floors may end up with fewer; placement gives up after a bounded number of misses.
    pub fn generate_npcs<R: Rng>(&mut self, rng: &mut R) -> usize {
        let target = self.density_target(self.settings.enemy_density);
        let attempts = target.saturating_mul(self.config.npc.max_spawn_attempts as usize);
        let mut spawned = 0;

        for _ in 0..attempts {
            if spawned == target {
                break;
            }
            let Some(position) = self.random_floor_position(rng, self.config.npc.size) else {
                continue;
            };

            let id = self.next_npc_id;
            self.next_npc_id += 1;
            let npc = Npc::spawn(
                id,
                position,
                self.settings.enemy_level,
                self.config.npc.aggressive_chance,
                rng,
            );
            self.npcs.insert(id, npc);
            spawned += 1;
        }

        if spawned < target {
            debug!(
                "Level {} spawned {} of {} npcs, floor too sparse ({} open tiles)",
                self.level,
                spawned,
                target,
                self.grid.open_tiles()
            );
        }
        spawned
    }

    pub fn generate_treasure<R: Rng>(&mut self, rng: &mut R, catalog: &ItemCatalog) -> usize {
        let target = self.density_target(self.settings.treasure_density);
        let attempts = target.saturating_mul(self.config.npc.max_spawn_attempts as usize);
        let mut placed = 0;

        for _ in 0..attempts {
            if placed == target {
                break;
            }
            let Some(position) = self.random_floor_position(rng, 0.0) else {
                continue;
            };
            if self.treasures.values().any(|t| t.position == position) {
                continue;
            }
            let Some(item) = catalog.random(rng).cloned() else {
                break;
            };

            let id = self.next_treasure_id;
            self.next_treasure_id += 1;
            self.treasures.insert(id, Treasure { id, position, item });
            placed += 1;
        }
        placed
    }

    pub fn spawn_npc(&mut self, npc: Npc) {
        self.next_npc_id = self.next_npc_id.max(npc.id + 1);
        self.npcs.insert(npc.id, npc);
    }

    fn density_target(&self, density: f32) -> usize {
        let area = self.grid.count(Tile::Floor) as f32;
        (area * density / 100.0).round().max(0.0) as usize
    }

    /// Centre of a random plain floor cell, provided an actor of `size` fits there.
    fn random_floor_position<R: Rng>(&self, rng: &mut R, size: f32) -> Option<Position> {
        let x = rng.gen_range(0..self.grid.width());
        let y = rng.gen_range(0..self.grid.height());
        if self.grid.get(x, y) != Some(Tile::Floor) {
            return None;
        }
        let position = Grid::cell_center((x, y), self.config.tile_size);
        (!self.check_collision(&position, size)).then_some(position)
    }

    /// Advances everything on the floor by one tick.
    ///
    /// Players apply their held keys, gravity, queued action presses and treasure
    /// pickups; then aggressive NPCs chase. `now_ms` is the world clock used for
    /// action cooldowns.
    pub fn update(&mut self, dt: f32, now_ms: u64) -> Vec<FloorEvent> {
        let events = self.update_players(dt, now_ms);
        self.update_npcs(dt);
        events
    }

    fn update_players(&mut self, dt: f32, now_ms: u64) -> Vec<FloorEvent> {
        let FloorWorld {
            level,
            grid,
            up_stairs,
            down_stairs,
            config,
            players,
            treasures,
            ..
        } = self;
        let config: &WorldConfig = config;
        let tile_size = config.tile_size;
        let mut events = Vec::new();

        for player in players.values_mut() {
            let step = player.wish_displacement(dt);
            if step != Vector2::ZERO {
                let target = Position {
                    x: player.position.x + step.x,
                    y: player.position.y + step.y,
                    z: player.position.z,
                };
                if grid.collides(&target, player.size, tile_size) {
                    events.push(FloorEvent::PositionRejected {
                        player_id: player.id,
                        position: player.position,
                    });
                } else {
                    player.position = target;
                }
            }

            player.step_vertical(config.player.jump_impulse, config.player.gravity, dt);

            if player.try_consume_action(now_ms, config.player.action_cooldown_ms) {
                let interaction =
                    stairs_interaction(grid, *up_stairs, *down_stairs, &player.position, config);
                if let Some(direction) = interaction.direction {
                    events.push(FloorEvent::StairsUsed {
                        player_id: player.id,
                        direction,
                    });
                }
            }

            let reach = config.treasure_pickup_radius;
            let collected: Vec<u32> = treasures
                .values()
                .filter(|t| t.position.planar_distance(&player.position) <= reach)
                .filter(|t| player.can_carry(t.item.id))
                .map(|t| t.id)
                .collect();
            for id in collected {
                if let Some(treasure) = treasures.remove(&id) {
                    if player.give_item(&treasure.item, 1).is_err() {
                        treasures.insert(id, treasure);
                        continue;
                    }
                    let levels_gained = player.gain_experience((10 * *level).max(5));
                    events.push(FloorEvent::TreasureCollected {
                        player_id: player.id,
                        item: treasure.item,
                        levels_gained,
                    });
                }
            }
        }
        events
    }

    /// Every aggressive NPC steps toward the nearest player inside its detection radius.
    /// A step that would collide is dropped whole.
    pub fn update_npcs(&mut self, dt: f32) {
        let npc_cfg = &self.config.npc;
        let tile_size = self.config.tile_size;

        for npc in self.npcs.values_mut().filter(|npc| npc.is_aggressive) {
            let nearest = self
                .players
                .values()
                .map(|p| (p, npc.position.planar_distance(&p.position)))
                .min_by(|a, b| a.1.total_cmp(&b.1));
            let Some((target, distance)) = nearest else {
                continue;
            };
            if distance > npc_cfg.detection_radius {
                continue;
            }

            let contact = (npc_cfg.size + target.size) / 2.0;
            let step = (npc_cfg.speed * dt).min(distance - contact);
            if step <= 0.0 {
                continue;
            }

            let direction = Vector2::new(
                target.position.x - npc.position.x,
                target.position.y - npc.position.y,
            )
            .normalize()
            .scale(step);
            let next = Position {
                x: npc.position.x + direction.x,
                y: npc.position.y + direction.y,
                z: npc.position.z,
            };
            if !self.grid.collides(&next, npc_cfg.size, tile_size) {
                npc.position = next;
            }
        }
    }

    pub fn broadcast_snapshot(&self) -> BroadcastSnapshot {
        let mut players: Vec<PlayerView> = self.players.values().map(Player::view).collect();
        players.sort_by_key(|p| p.id);
        let mut npcs: Vec<NpcView> = self.npcs.values().map(Npc::view).collect();
        npcs.sort_by_key(|n| n.id);
        let mut treasures: Vec<TreasureView> = self
            .treasures
            .values()
            .map(|t| TreasureView {
                id: t.id,
                position: t.position,
            })
            .collect();
        treasures.sort_by_key(|t| t.id);

        BroadcastSnapshot {
            level: self.level,
            players,
            npcs,
            treasures,
        }
    }

    pub fn floor_snapshot(&self) -> FloorSnapshot {
        let to_wire = |cell: Cell| (cell.0 as u32, cell.1 as u32);
        FloorSnapshot {
            level: self.level,
            width: self.grid.width() as u32,
            height: self.grid.height() as u32,
            tiles: self.grid.codes(),
            up_stairs: self.up_stairs.map(to_wire),
            down_stairs: self.down_stairs.map(to_wire),
            tile_size: self.config.tile_size,
            enemy_level: self.settings.enemy_level,
            enemy_density: self.settings.enemy_density,
            treasure_density: self.settings.treasure_density,
        }
    }
}

/// Checks both stairs cells. A player anywhere inside a stairs cell uses it, and so
/// does one whose centre is within `stairs_radius` of the stairs tile centre.
fn stairs_interaction(
    grid: &Grid,
    up: Option<Cell>,
    down: Option<Cell>,
    position: &Position,
    config: &WorldConfig,
) -> StairsInteraction {
    let standing_on = grid.cell_at(position.x, position.y, config.tile_size);
    let candidates = [(up, StairsDirection::Up), (down, StairsDirection::Down)];
    for (cell, direction) in candidates {
        let Some(cell) = cell else { continue };
        let center = Grid::cell_center(cell, config.tile_size);
        if standing_on == Some(cell) || center.planar_distance(position) <= config.stairs_radius {
            return StairsInteraction {
                floor_change: true,
                direction: Some(direction),
            };
        }
    }
    StairsInteraction::NONE
}
