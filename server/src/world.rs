//! The set of live floors and the single mutation path for everything on them.
//!
//! `WorldManager` owns every [`FloorWorld`] by level index and keeps an index of which
//! floor each player is on. Floors are generated lazily. The network loop is the only
//! caller, so `&mut self` is the whole synchronisation story.

use crate::config::WorldConfig;
use crate::entity::Player;
use crate::error::{WorldError, WorldResult};
use crate::floor::{BroadcastSnapshot, FloorEvent, FloorWorld};
use crate::items::{ItemCatalog, HEALING_POTION, WOODEN_SWORD};
use crate::level_gen::LevelGenerator;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    validate_username, FloorSnapshot, Item, ItemAction, MovementIntent, Position, StairsDirection,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Outcome of a tick that one specific client should hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    /// The held keys walked into something solid; `position` is where the player still is.
    PositionRejected { player_id: u32, position: Position },
    FloorChanged {
        player_id: u32,
        from: u32,
        to: u32,
        direction: StairsDirection,
    },
    TreasureCollected { player_id: u32, item: Item },
    LeveledUp { player_id: u32, level: u32 },
}

pub struct WorldManager {
    config: Arc<WorldConfig>,
    generator: LevelGenerator,
    catalog: ItemCatalog,
    rng: StdRng,
    floors: BTreeMap<u32, FloorWorld>,
    player_floor: HashMap<u32, u32>,
    clock_ms: u64,
    tick: u32,
}

impl WorldManager {
    /// Builds the world and generates the village. A `seed` makes generation and
    /// population reproducible.
    pub fn new(config: WorldConfig, seed: Option<u64>) -> WorldResult<Self> {
        config.validate()?;
        let last_level = config.last_level();
        let (generator, rng) = match seed {
            Some(seed) => (
                LevelGenerator::with_seed(config.generation.clone(), last_level, seed),
                StdRng::seed_from_u64(seed.wrapping_add(1)),
            ),
            None => (
                LevelGenerator::new(config.generation.clone(), last_level),
                StdRng::from_entropy(),
            ),
        };

        let mut world = Self {
            config: Arc::new(config),
            generator,
            catalog: ItemCatalog::standard(),
            rng,
            floors: BTreeMap::new(),
            player_floor: HashMap::new(),
            clock_ms: 0,
            tick: 0,
        };
        world.generate_floor(world.config.village_level)?;
        Ok(world)
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    /// Generates the floor at `level` unless it already exists.
    pub fn generate_floor(&mut self, level: u32) -> WorldResult<()> {
        if self.is_generated(level) {
            return Ok(());
        }

        let generated = self.generator.generate(level)?;
        let rooms = generated.rooms.len();
        let mut floor = FloorWorld::new(generated, Arc::clone(&self.config));
        floor.populate(&mut self.rng, &self.catalog);

        info!(
            "Generated level {} with {} rooms, {} npcs (enemy level {}), {} treasures",
            level,
            rooms,
            floor.npcs().count(),
            floor.settings().enemy_level,
            floor.treasures().count()
        );
        self.floors.insert(level, floor);
        Ok(())
    }

    pub fn pregenerate_all(&mut self) -> WorldResult<()> {
        for level in 0..self.config.floor_count() {
            self.generate_floor(level)?;
        }
        Ok(())
    }

    pub fn is_generated(&self, level: u32) -> bool {
        self.floors.contains_key(&level)
    }

    pub fn floor(&self, level: u32) -> Option<&FloorWorld> {
        self.floors.get(&level)
    }

    pub fn floor_mut(&mut self, level: u32) -> Option<&mut FloorWorld> {
        self.floors.get_mut(&level)
    }

    pub fn generated_levels(&self) -> Vec<u32> {
        self.floors.keys().copied().collect()
    }

    pub fn player_count(&self) -> usize {
        self.player_floor.len()
    }

    pub fn player_floor(&self, id: u32) -> Option<u32> {
        self.player_floor.get(&id).copied()
    }

    pub fn player(&self, id: u32) -> Option<&Player> {
        let level = self.player_floor(id)?;
        self.floors.get(&level)?.get_player(id)
    }

    fn player_mut(&mut self, id: u32) -> WorldResult<&mut Player> {
        let level = self.player_floor(id).ok_or(WorldError::PlayerNotFound(id))?;
        self.floors
            .get_mut(&level)
            .and_then(|floor| floor.get_player_mut(id))
            .ok_or(WorldError::PlayerNotFound(id))
    }

    /// Creates a player at the village spawn with the starter kit. Returns the level joined.
    pub fn register_player(&mut self, id: u32, username: &str) -> WorldResult<u32> {
        let username = validate_username(username)
            .ok_or_else(|| WorldError::InvalidUsername(username.to_string()))?;
        if self.player_floor.contains_key(&id) {
            return Err(WorldError::DuplicatePlayer(id));
        }

        let village = self.config.village_level;
        let floor = self
            .floors
            .get_mut(&village)
            .ok_or(WorldError::FloorUnavailable(village))?;

        let mut player = Player::new(
            id,
            username,
            village,
            floor.spawn_position(),
            &self.config.player,
        );
        for (item_id, quantity) in [(HEALING_POTION, 2), (WOODEN_SWORD, 1)] {
            let Some(item) = self.catalog.get(item_id) else {
                continue;
            };
            if let Err(e) = player.give_item(item, quantity) {
                warn!("Starter item {} not given to player {}: {}", item_id, id, e);
            }
        }

        info!(
            "Registered player {} ({}) on level {}",
            id, player.username, village
        );
        floor.add_player(player);
        self.player_floor.insert(id, village);
        Ok(village)
    }

    pub fn remove_player(&mut self, id: u32) -> Option<Player> {
        let level = self.player_floor.remove(&id)?;
        let player = self.floors.get_mut(&level)?.remove_player(id);
        if player.is_some() {
            info!("Removed player {} from level {}", id, level);
        }
        player
    }

    pub fn set_player_input(&mut self, id: u32, intent: MovementIntent) -> WorldResult<()> {
        self.player_mut(id)?.set_intent(intent);
        Ok(())
    }

    /// Runs the speed and collision checks on a client-proposed position.
    /// `Ok(false)` means the client must be corrected.
    pub fn process_position_update(
        &mut self,
        id: u32,
        x: f32,
        y: f32,
        timestamp: u64,
    ) -> WorldResult<bool> {
        let level = self.player_floor(id).ok_or(WorldError::PlayerNotFound(id))?;
        let floor = self
            .floors
            .get_mut(&level)
            .ok_or(WorldError::FloorUnavailable(level))?;
        Ok(floor.process_position_update(id, x, y, timestamp))
    }

    pub fn apply_item_action(&mut self, id: u32, action: ItemAction) -> WorldResult<()> {
        self.player_mut(id)?.apply_item_action(action)
    }

    /// Moves a player between two generated floors in one step. The target floor
    /// repositions the player onto its arrival stairs.
    pub fn move_player_to_floor(&mut self, id: u32, target: u32) -> bool {
        if !self.is_generated(target) {
            return false;
        }
        let Some(current) = self.player_floor(id) else {
            return false;
        };
        if current == target {
            return false;
        }
        let Some(mut player) = self
            .floors
            .get_mut(&current)
            .and_then(|floor| floor.remove_player(id))
        else {
            return false;
        };

        player.previous_floor = current;
        player.current_floor = target;
        if let Some(floor) = self.floors.get_mut(&target) {
            floor.add_player(player);
        }
        self.player_floor.insert(id, target);
        info!("Player {} moved from level {} to {}", id, current, target);
        true
    }

    /// Advances every occupied floor by `dt` seconds, then carries out any stairs
    /// transitions the tick produced. Unoccupied floors stay frozen.
    pub fn update(&mut self, dt: f32) -> Vec<WorldEvent> {
        self.tick = self.tick.wrapping_add(1);
        self.clock_ms += (dt * 1000.0).round() as u64;
        let now = self.clock_ms;

        let mut events = Vec::new();
        let mut transfers = Vec::new();
        let mut level_checks = Vec::new();

        for (&level, floor) in self.floors.iter_mut() {
            if floor.player_count() == 0 {
                continue;
            }
            for event in floor.update(dt, now) {
                match event {
                    FloorEvent::PositionRejected {
                        player_id,
                        position,
                    } => events.push(WorldEvent::PositionRejected {
                        player_id,
                        position,
                    }),
                    FloorEvent::TreasureCollected {
                        player_id,
                        item,
                        levels_gained,
                    } => {
                        events.push(WorldEvent::TreasureCollected { player_id, item });
                        if levels_gained > 0 {
                            level_checks.push(player_id);
                        }
                    }
                    FloorEvent::StairsUsed {
                        player_id,
                        direction,
                    } => transfers.push((player_id, level, direction)),
                }
            }
        }

        for player_id in level_checks {
            if let Some(player) = self.player(player_id) {
                events.push(WorldEvent::LeveledUp {
                    player_id,
                    level: player.stats().level,
                });
            }
        }

        for (player_id, from, direction) in transfers {
            let target = match direction {
                StairsDirection::Down => from.checked_add(1),
                StairsDirection::Up => from.checked_sub(1),
            };
            let Some(target) = target else { continue };

            if let Err(e) = self.generate_floor(target) {
                warn!(
                    "Player {} used stairs to level {} but it failed: {}",
                    player_id, target, e
                );
                continue;
            }
            if self.move_player_to_floor(player_id, target) {
                events.push(WorldEvent::FloorChanged {
                    player_id,
                    from,
                    to: target,
                    direction,
                });
            }
        }

        if !events.is_empty() {
            debug!("Tick {} produced {} world events", self.tick, events.len());
        }
        events
    }

    pub fn get_broadcast_snapshot(&self, level: u32) -> Option<BroadcastSnapshot> {
        self.floors.get(&level).map(FloorWorld::broadcast_snapshot)
    }

    /// Floor layout for delivery to a client, generating the floor first if needed.
    pub fn get_floor_snapshot(&mut self, level: u32) -> WorldResult<FloorSnapshot> {
        self.generate_floor(level)?;
        self.floors
            .get(&level)
            .map(FloorWorld::floor_snapshot)
            .ok_or(WorldError::FloorUnavailable(level))
    }
}
