//! Wire protocol and plain data records shared by the dungeon server and its clients.
//!
//! Everything in here is serializable with bincode and carries no references into
//! server internals, so snapshots can be built, encoded and dropped freely.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 8080;
pub const MAX_USERNAME_LEN: usize = 24;

/// Classification of one grid cell. The numeric codes are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Tile {
    Wall = 0,
    Floor = 1,
    StairsUp = 2,
    StairsDown = 3,
    Obstacle = 4,
}

impl Tile {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Tile> {
        match code {
            0 => Some(Tile::Wall),
            1 => Some(Tile::Floor),
            2 => Some(Tile::StairsUp),
            3 => Some(Tile::StairsDown),
            4 => Some(Tile::Obstacle),
            _ => None,
        }
    }

    /// Walls and obstacles block movement; everything else can be stood on.
    pub fn is_solid(self) -> bool {
        matches!(self, Tile::Wall | Tile::Obstacle)
    }
}

/// Direction of a floor transition. `Down` means a higher floor index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StairsDirection {
    Up,
    Down,
}

impl StairsDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            StairsDirection::Up => "up",
            StairsDirection::Down => "down",
        }
    }
}

/// World-space position. `x`/`y` are on the tile plane, `z` is height above the ground.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Distance on the tile plane, ignoring height.
    pub fn planar_distance(&self, other: &Position) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Held keys for one input frame, plus an optional camera facing on the tile plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovementIntent {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub action: bool,
    /// Forward direction of the client's camera. `None` means screen-up is forward.
    pub camera: Option<(f32, f32)>,
}

impl MovementIntent {
    pub fn is_valid(&self) -> bool {
        match self.camera {
            Some((x, y)) => x.is_finite() && y.is_finite(),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputState {
    pub sequence: u32,
    pub timestamp: u64,
    pub intent: MovementIntent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquipSlot {
    Weapon,
    Armor,
    Helmet,
    Boots,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Equipment(EquipSlot),
    Consumable { heal: u32, mana: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatBonus {
    pub health: u32,
    pub mana: u32,
    pub strength: u32,
    pub dexterity: u32,
    pub intelligence: u32,
}

/// Immutable item template. Inventory slots hold copies of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: u32,
    pub name: String,
    pub kind: ItemKind,
    pub bonus: StatBonus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySlot {
    pub item: Item,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Equipment {
    pub weapon: Option<Item>,
    pub armor: Option<Item>,
    pub helmet: Option<Item>,
    pub boots: Option<Item>,
}

impl Equipment {
    pub fn slot(&self, slot: EquipSlot) -> Option<&Item> {
        match slot {
            EquipSlot::Weapon => self.weapon.as_ref(),
            EquipSlot::Armor => self.armor.as_ref(),
            EquipSlot::Helmet => self.helmet.as_ref(),
            EquipSlot::Boots => self.boots.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, slot: EquipSlot) -> &mut Option<Item> {
        match slot {
            EquipSlot::Weapon => &mut self.weapon,
            EquipSlot::Armor => &mut self.armor,
            EquipSlot::Helmet => &mut self.helmet,
            EquipSlot::Boots => &mut self.boots,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        [&self.weapon, &self.armor, &self.helmet, &self.boots]
            .into_iter()
            .filter_map(|slot| slot.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub health: u32,
    pub max_health: u32,
    pub mana: u32,
    pub max_mana: u32,
    pub strength: u32,
    pub dexterity: u32,
    pub intelligence: u32,
    pub level: u32,
    pub experience: u32,
    pub next_level_exp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemAction {
    Equip { item_id: u32 },
    Unequip { slot: EquipSlot },
    Use { item_id: u32 },
    Drop { item_id: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NpcKind {
    Rat,
    Goblin,
    Skeleton,
    Slime,
}

impl NpcKind {
    pub const ALL: [NpcKind; 4] = [NpcKind::Rat, NpcKind::Goblin, NpcKind::Skeleton, NpcKind::Slime];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: u32,
    pub username: String,
    pub position: Position,
    pub size: f32,
    pub stats: Stats,
    pub equipment: Equipment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcView {
    pub id: u32,
    pub kind: NpcKind,
    pub position: Position,
    pub health: u32,
    pub max_health: u32,
    pub level: u32,
    pub is_aggressive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreasureView {
    pub id: u32,
    pub position: Position,
}

/// Everything a client needs to draw a floor, sent on request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorSnapshot {
    pub level: u32,
    pub width: u32,
    pub height: u32,
    /// Row-major tile codes, `width * height` long.
    pub tiles: Vec<u8>,
    pub up_stairs: Option<(u32, u32)>,
    pub down_stairs: Option<(u32, u32)>,
    pub tile_size: f32,
    pub enemy_level: u32,
    pub enemy_density: f32,
    pub treasure_density: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Register {
        client_version: u32,
        username: String,
    },
    Input {
        sequence: u32,
        timestamp: u64,
        intent: MovementIntent,
    },
    PositionUpdate {
        sequence: u32,
        timestamp: u64,
        x: f32,
        y: f32,
    },
    FloorRequest {
        level: u32,
    },
    ItemAction {
        action: ItemAction,
    },
    Disconnect,

    Registered {
        player_id: u32,
        level: u32,
    },
    FloorData {
        floor: FloorSnapshot,
    },
    WorldState {
        tick: u32,
        timestamp: u64,
        level: u32,
        last_processed_input: HashMap<u32, u32>,
        players: Vec<PlayerView>,
        npcs: Vec<NpcView>,
        treasures: Vec<TreasureView>,
    },
    PositionCorrection {
        x: f32,
        y: f32,
        z: f32,
    },
    FloorChanged {
        level: u32,
        direction: StairsDirection,
    },
    InventoryUpdate {
        inventory: Vec<InventorySlot>,
        equipment: Equipment,
        stats: Stats,
    },
    Error {
        message: String,
    },
    Disconnected {
        reason: String,
    },
}

/// Trims and checks a requested username, returning the cleaned name.
pub fn validate_username(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_USERNAME_LEN {
        return None;
    }
    if name.chars().any(|c| c.is_control()) {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_tile_codes() {
        for code in 0..=4u8 {
            let tile = Tile::from_code(code).unwrap();
            assert_eq!(tile.code(), code);
        }
        assert_eq!(Tile::from_code(5), None);
        assert!(Tile::Wall.is_solid());
        assert!(Tile::Obstacle.is_solid());
        assert!(!Tile::Floor.is_solid());
        assert!(!Tile::StairsUp.is_solid());
        assert!(!Tile::StairsDown.is_solid());
    }

    #[test]
    fn test_planar_distance_ignores_height() {
        let a = Position { x: 0.0, y: 0.0, z: 10.0 };
        let b = Position::new(3.0, 4.0);
        assert_approx_eq!(a.planar_distance(&b), 5.0, 1e-6);
    }

    #[test]
    fn test_intent_validation() {
        let mut intent = MovementIntent::default();
        assert!(intent.is_valid());

        intent.camera = Some((f32::NAN, 1.0));
        assert!(!intent.is_valid());

        intent.camera = Some((0.0, -1.0));
        intent.up = true;
        assert!(intent.is_valid());
    }

    #[test]
    fn test_username_validation() {
        assert_eq!(validate_username("  hero "), Some("hero".to_string()));
        assert_eq!(validate_username("   "), None);
        assert_eq!(validate_username(&"x".repeat(MAX_USERNAME_LEN + 1)), None);
        assert_eq!(validate_username("bad\nname"), None);
        assert!(validate_username(&"y".repeat(MAX_USERNAME_LEN)).is_some());
    }

    #[test]
    fn test_equipment_slots() {
        let sword = Item {
            id: 1,
            name: "Sword".to_string(),
            kind: ItemKind::Equipment(EquipSlot::Weapon),
            bonus: StatBonus {
                strength: 2,
                ..StatBonus::default()
            },
        };
        let mut equipment = Equipment::default();
        assert!(equipment.slot(EquipSlot::Weapon).is_none());

        *equipment.slot_mut(EquipSlot::Weapon) = Some(sword.clone());
        assert_eq!(equipment.slot(EquipSlot::Weapon), Some(&sword));
        assert_eq!(equipment.iter().count(), 1);
    }

    #[test]
    fn test_packet_serialization_input() {
        let packet = Packet::Input {
            sequence: 123,
            timestamp: 456789,
            intent: MovementIntent {
                up: true,
                right: true,
                camera: Some((0.0, -1.0)),
                ..MovementIntent::default()
            },
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Input {
                sequence,
                timestamp,
                intent,
            } => {
                assert_eq!(sequence, 123);
                assert_eq!(timestamp, 456789);
                assert!(intent.up && intent.right);
                assert!(!intent.down && !intent.left);
                assert_eq!(intent.camera, Some((0.0, -1.0)));
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_floor_data() {
        let floor = FloorSnapshot {
            level: 2,
            width: 3,
            height: 2,
            tiles: vec![0, 1, 2, 0, 3, 4],
            up_stairs: Some((2, 0)),
            down_stairs: Some((1, 1)),
            tile_size: 32.0,
            enemy_level: 2,
            enemy_density: 1.5,
            treasure_density: 0.5,
        };

        let serialized = bincode::serialize(&Packet::FloorData { floor: floor.clone() }).unwrap();
        match bincode::deserialize::<Packet>(&serialized).unwrap() {
            Packet::FloorData { floor: decoded } => assert_eq!(decoded, floor),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_direction_names() {
        assert_eq!(StairsDirection::Up.as_str(), "up");
        assert_eq!(StairsDirection::Down.as_str(), "down");
    }
}
