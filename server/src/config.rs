//! Static world configuration, built once at startup and shared read-only.
//!
//! Defaults can be overridden by a JSON file and then by command-line flags.
//! Nothing reconfigures a running world.

use crate::error::{WorldError, WorldResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Shape of generated dungeon and village floors, in tiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub grid_width: usize,
    pub grid_height: usize,
    pub min_rooms: usize,
    pub max_rooms: usize,
    pub room_min_size: usize,
    pub room_max_size: usize,
    pub corridor_width: usize,
    /// Minimum gap kept between any two rooms.
    pub room_buffer: usize,
    /// Full regenerations tried before falling back to a single forced room.
    pub max_generation_attempts: u32,
    pub village_radius: usize,
    /// Width of the outer ring of the village circle that gets the denser tree cover.
    pub village_rim_width: usize,
    pub village_rim_tree_chance: f64,
    pub village_interior_tree_chance: f64,
    pub cave_mouth_width: usize,
    pub cave_mouth_height: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            grid_width: 64,
            grid_height: 48,
            min_rooms: 6,
            max_rooms: 10,
            room_min_size: 4,
            room_max_size: 9,
            corridor_width: 2,
            room_buffer: 2,
            max_generation_attempts: 8,
            village_radius: 18,
            village_rim_width: 4,
            village_rim_tree_chance: 0.35,
            village_interior_tree_chance: 0.03,
            cave_mouth_width: 3,
            cave_mouth_height: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub base_health: u32,
    pub base_mana: u32,
    pub base_strength: u32,
    pub base_dexterity: u32,
    pub base_intelligence: u32,
    pub base_next_level_exp: u32,
    /// Horizontal speed in world units per second.
    pub move_speed: f32,
    pub size: f32,
    pub jump_impulse: f32,
    pub gravity: f32,
    /// Allowed overshoot of `move_speed` for client-proposed positions.
    pub speed_tolerance: f32,
    pub action_cooldown_ms: u64,
    pub inventory_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            base_health: 100,
            base_mana: 50,
            base_strength: 10,
            base_dexterity: 10,
            base_intelligence: 10,
            base_next_level_exp: 100,
            move_speed: 160.0,
            size: 20.0,
            jump_impulse: 220.0,
            gravity: 600.0,
            speed_tolerance: 0.1,
            action_cooldown_ms: 1000,
            inventory_capacity: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpcConfig {
    pub detection_radius: f32,
    pub speed: f32,
    pub size: f32,
    /// Probability that a spawned NPC chases players.
    pub aggressive_chance: f64,
    /// Random cell samples allowed per requested NPC before giving up on it.
    pub max_spawn_attempts: u32,
}

impl Default for NpcConfig {
    fn default() -> Self {
        Self {
            detection_radius: 192.0,
            speed: 90.0,
            size: 20.0,
            aggressive_chance: 0.5,
            max_spawn_attempts: 20,
        }
    }
}

/// Per-floor population settings. Densities are percentages of open tiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorConfig {
    pub enemy_level: u32,
    pub enemy_density: f32,
    pub treasure_density: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub tile_size: f32,
    pub tick_rate: u32,
    pub village_level: u32,
    /// Players inside a stairs cell always use it; this also reaches players whose
    /// centre is this close to the stairs tile centre.
    pub stairs_radius: f32,
    pub treasure_pickup_radius: f32,
    pub generation: GenerationConfig,
    pub player: PlayerConfig,
    pub npc: NpcConfig,
    /// One entry per floor; the length is the floor count.
    pub floors: Vec<FloorConfig>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        let mut floors = vec![FloorConfig {
            enemy_level: 0,
            enemy_density: 0.0,
            treasure_density: 0.0,
        }];
        floors.extend((1..=5).map(|level| FloorConfig {
            enemy_level: level,
            enemy_density: 1.0 + level as f32 * 0.25,
            treasure_density: 0.4,
        }));

        Self {
            tile_size: 32.0,
            tick_rate: 60,
            village_level: 0,
            stairs_radius: 16.0,
            treasure_pickup_radius: 20.0,
            generation: GenerationConfig::default(),
            player: PlayerConfig::default(),
            npc: NpcConfig::default(),
            floors,
        }
    }
}

impl WorldConfig {
    /// Reads a JSON config file. Missing fields fall back to their defaults.
    pub fn from_file(path: &Path) -> WorldResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            WorldError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> WorldResult<Self> {
        let config: WorldConfig =
            serde_json::from_str(text).map_err(|e| WorldError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn floor_count(&self) -> u32 {
        self.floors.len() as u32
    }

    pub fn last_level(&self) -> u32 {
        self.floor_count().saturating_sub(1)
    }

    pub fn floor(&self, level: u32) -> Option<&FloorConfig> {
        self.floors.get(level as usize)
    }

    /// Rejects settings no generator or floor could honour.
    pub fn validate(&self) -> WorldResult<()> {
        let gen = &self.generation;
        let fail = |msg: &str| Err(WorldError::InvalidConfig(msg.to_string()));

        if self.floors.is_empty() {
            return fail("at least one floor is required");
        }
        if self.village_level != 0 {
            return fail("the village must be floor 0");
        }
        if !(self.tile_size > 0.0) {
            return fail("tile_size must be positive");
        }
        if self.tick_rate == 0 {
            return fail("tick_rate must be positive");
        }
        if gen.min_rooms == 0 || gen.min_rooms > gen.max_rooms {
            return fail("room count bounds must satisfy 0 < min_rooms <= max_rooms");
        }
        if gen.room_min_size < 3 || gen.room_min_size > gen.room_max_size {
            return fail("room size bounds must satisfy 3 <= room_min_size <= room_max_size");
        }
        if gen.corridor_width == 0 {
            return fail("corridor_width must be positive");
        }
        if gen.room_max_size + 2 >= gen.grid_width || gen.room_max_size + 2 >= gen.grid_height {
            return fail("rooms of room_max_size do not fit inside the grid");
        }
        if gen.village_radius < 4 || gen.village_radius * 2 + 2 > gen.grid_width.min(gen.grid_height)
        {
            return fail("village circle does not fit inside the grid");
        }
        if gen.cave_mouth_height + 2 >= gen.village_radius
            || gen.cave_mouth_width + 2 >= gen.village_radius
        {
            return fail("cave mouth does not fit inside the village circle");
        }
        let chances = [
            gen.village_rim_tree_chance,
            gen.village_interior_tree_chance,
            self.npc.aggressive_chance,
        ];
        if chances.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return fail("probabilities must lie in 0..=1");
        }
        if !(self.player.move_speed > 0.0) || !(self.npc.speed > 0.0) {
            return fail("speeds must be positive");
        }
        if !(self.player.size > 0.0) || self.player.size >= self.tile_size * 2.0 {
            return fail("player size must be positive and under two tiles");
        }
        if !(self.npc.size > 0.0) || self.npc.size >= self.tile_size * 2.0 {
            return fail("npc size must be positive and under two tiles");
        }
        if self.player.speed_tolerance < 0.0 {
            return fail("speed_tolerance must not be negative");
        }
        if self.player.inventory_capacity == 0 {
            return fail("inventory_capacity must be positive");
        }
        if self
            .floors
            .iter()
            .any(|f| f.enemy_density < 0.0 || f.treasure_density < 0.0)
        {
            return fail("densities must not be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WorldConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.floor_count(), 6);
        assert_eq!(config.last_level(), 5);
        assert_eq!(config.floor(0).unwrap().enemy_density, 0.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            WorldConfig::from_json(r#"{ "tile_size": 16.0, "generation": { "corridor_width": 3 } }"#)
                .unwrap();
        assert_eq!(config.tile_size, 16.0);
        assert_eq!(config.generation.corridor_width, 3);
        assert_eq!(config.generation.min_rooms, GenerationConfig::default().min_rooms);
        assert_eq!(config.floors.len(), WorldConfig::default().floors.len());
    }

    #[test]
    fn test_rejects_inverted_room_bounds() {
        let mut config = WorldConfig::default();
        config.generation.min_rooms = 5;
        config.generation.max_rooms = 3;
        assert!(matches!(config.validate(), Err(WorldError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_nonzero_village() {
        let mut config = WorldConfig::default();
        config.village_level = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_rooms() {
        let mut config = WorldConfig::default();
        config.generation.room_max_size = config.generation.grid_height;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(WorldConfig::from_json("{ not json").is_err());
    }
}
