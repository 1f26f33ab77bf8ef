//! Authoritative actor records: players and NPCs.
//!
//! Floors own these by id. Nothing here knows about the grid; movement that needs
//! collision goes through [`crate::floor::FloorWorld`].

use crate::config::PlayerConfig;
use crate::error::{WorldError, WorldResult};
use crate::items::Inventory;
use crate::movement::{planar_displacement, MovementValidator};
use crate::physics::{Vector2, VerticalBody};
use log::info;
use rand::Rng;
use shared::{
    EquipSlot, Equipment, InventorySlot, Item, ItemAction, ItemKind, MovementIntent, NpcKind,
    NpcView, PlayerView, Position, StatBonus, Stats,
};

/// Stat values before equipment bonuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BaseAttributes {
    max_health: u32,
    max_mana: u32,
    strength: u32,
    dexterity: u32,
    intelligence: u32,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: u32,
    pub username: String,
    pub position: Position,
    pub current_floor: u32,
    pub previous_floor: u32,
    pub size: f32,
    pub move_speed: f32,
    pub vertical: VerticalBody,
    pub intent: MovementIntent,
    /// Set when an input frame carried the action key; cleared by the next tick.
    pub action_pending: bool,
    last_action_ms: Option<u64>,
    validator: MovementValidator,
    base: BaseAttributes,
    stats: Stats,
    inventory: Inventory,
    equipment: Equipment,
}

impl Player {
    pub fn new(id: u32, username: String, floor: u32, position: Position, cfg: &PlayerConfig) -> Self {
        let base = BaseAttributes {
            max_health: cfg.base_health,
            max_mana: cfg.base_mana,
            strength: cfg.base_strength,
            dexterity: cfg.base_dexterity,
            intelligence: cfg.base_intelligence,
        };
        let stats = Stats {
            health: cfg.base_health,
            max_health: cfg.base_health,
            mana: cfg.base_mana,
            max_mana: cfg.base_mana,
            strength: cfg.base_strength,
            dexterity: cfg.base_dexterity,
            intelligence: cfg.base_intelligence,
            level: 1,
            experience: 0,
            next_level_exp: cfg.base_next_level_exp.max(1),
        };

        Self {
            id,
            username,
            position,
            current_floor: floor,
            previous_floor: floor,
            size: cfg.size,
            move_speed: cfg.move_speed,
            vertical: VerticalBody::default(),
            intent: MovementIntent::default(),
            action_pending: false,
            last_action_ms: None,
            validator: MovementValidator::new(cfg.move_speed, cfg.speed_tolerance),
            base,
            stats,
            inventory: Inventory::new(cfg.inventory_capacity),
            equipment: Equipment::default(),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn inventory(&self) -> &[InventorySlot] {
        self.inventory.slots()
    }

    pub fn equipment(&self) -> &Equipment {
        &self.equipment
    }

    /// Stores the latest held keys. An action press stays queued until the next tick.
    ///
    /// Input frames carry no position, so they leave the movement validator's
    /// anchor alone.
    pub fn set_intent(&mut self, intent: MovementIntent) {
        self.action_pending |= intent.action;
        self.intent = intent;
    }

    /// Planar step the held keys ask for this tick, before collision.
    pub fn wish_displacement(&self, dt: f32) -> Vector2 {
        planar_displacement(&self.intent, self.move_speed, dt)
    }

    /// Speed check for a client-proposed position. Does not move the player.
    pub fn validate_proposed_position(&self, proposed: &Position, timestamp: u64) -> bool {
        self.validator.check(&self.position, proposed, timestamp)
    }

    pub fn accept_proposed_position(&mut self, position: Position, timestamp: u64) {
        self.position = Position {
            z: self.position.z,
            ..position
        };
        self.validator.commit(self.position, timestamp);
    }

    /// Places the player on the ground at `position` and carries the speed anchor along.
    pub fn teleport(&mut self, position: Position) {
        self.position = position;
        self.vertical = VerticalBody::default();
        self.validator.rebase(position);
    }

    /// Runs jump and gravity for one tick and mirrors the height onto `position.z`.
    pub fn step_vertical(&mut self, jump_impulse: f32, gravity: f32, dt: f32) {
        if self.intent.jump {
            self.vertical.jump(jump_impulse);
        }
        self.vertical.simulate(gravity, dt);
        self.position.z = self.vertical.height;
    }

    /// Consumes a queued action press if the cooldown has expired.
    pub fn try_consume_action(&mut self, now_ms: u64, cooldown_ms: u64) -> bool {
        if !std::mem::take(&mut self.action_pending) {
            return false;
        }
        if let Some(last) = self.last_action_ms {
            if now_ms.saturating_sub(last) < cooldown_ms {
                return false;
            }
        }
        self.last_action_ms = Some(now_ms);
        true
    }

    /// Adds experience and applies every level-up it pays for. Returns levels gained.
    pub fn gain_experience(&mut self, amount: u32) -> u32 {
        self.stats.experience += amount;
        let mut gained = 0;

        while self.stats.experience >= self.stats.next_level_exp {
            self.stats.experience -= self.stats.next_level_exp;
            self.stats.level += 1;
            self.stats.next_level_exp = (self.stats.next_level_exp as f32 * 1.5).ceil() as u32;

            self.base.max_health += 10;
            self.base.max_mana += 5;
            self.base.strength += 1;
            self.base.dexterity += 1;
            self.base.intelligence += 1;
            gained += 1;
        }

        if gained > 0 {
            self.recompute_stats();
            self.stats.health = self.stats.max_health;
            self.stats.mana = self.stats.max_mana;
            info!(
                "Player {} reached level {}",
                self.id, self.stats.level
            );
        }
        gained
    }

    pub fn give_item(&mut self, item: &Item, quantity: u32) -> WorldResult<()> {
        self.inventory.add(item, quantity)
    }

    pub fn can_carry(&self, item_id: u32) -> bool {
        self.inventory.can_accept(item_id)
    }

    pub fn apply_item_action(&mut self, action: ItemAction) -> WorldResult<()> {
        match action {
            ItemAction::Equip { item_id } => self.equip(item_id),
            ItemAction::Unequip { slot } => self.unequip(slot),
            ItemAction::Use { item_id } => self.use_item(item_id),
            ItemAction::Drop { item_id } => self.inventory.take_one(item_id).map(|_| ()),
        }
    }

    /// Moves one unit from the inventory into its slot, swapping out any previous item.
    pub fn equip(&mut self, item_id: u32) -> WorldResult<()> {
        let slot = match self.inventory.find(item_id).map(|item| item.kind) {
            Some(ItemKind::Equipment(slot)) => slot,
            Some(_) => return Err(WorldError::NotEquippable(item_id)),
            None => return Err(WorldError::UnknownItem(item_id)),
        };

        let item = self.inventory.take_one(item_id)?;
        if let Some(previous) = self.equipment.slot(slot).cloned() {
            if !self.inventory.can_accept(previous.id) {
                self.inventory.add(&item, 1)?;
                return Err(WorldError::InventoryFull);
            }
            self.inventory.add(&previous, 1)?;
        }
        *self.equipment.slot_mut(slot) = Some(item);
        self.recompute_stats();
        Ok(())
    }

    pub fn unequip(&mut self, slot: EquipSlot) -> WorldResult<()> {
        let item = self
            .equipment
            .slot(slot)
            .cloned()
            .ok_or(WorldError::SlotEmpty(slot))?;
        self.inventory.add(&item, 1)?;
        *self.equipment.slot_mut(slot) = None;
        self.recompute_stats();
        Ok(())
    }

    pub fn use_item(&mut self, item_id: u32) -> WorldResult<()> {
        let (heal, mana) = match self.inventory.find(item_id).map(|item| item.kind) {
            Some(ItemKind::Consumable { heal, mana }) => (heal, mana),
            Some(_) => return Err(WorldError::NotUsable(item_id)),
            None => return Err(WorldError::UnknownItem(item_id)),
        };
        self.inventory.take_one(item_id)?;
        self.stats.health = (self.stats.health + heal).min(self.stats.max_health);
        self.stats.mana = (self.stats.mana + mana).min(self.stats.max_mana);
        Ok(())
    }

    /// Derives displayed stats from base attributes plus equipment bonuses.
    fn recompute_stats(&mut self) {
        let bonus = self
            .equipment
            .iter()
            .fold(StatBonus::default(), |acc, item| StatBonus {
                health: acc.health + item.bonus.health,
                mana: acc.mana + item.bonus.mana,
                strength: acc.strength + item.bonus.strength,
                dexterity: acc.dexterity + item.bonus.dexterity,
                intelligence: acc.intelligence + item.bonus.intelligence,
            });

        self.stats.max_health = self.base.max_health + bonus.health;
        self.stats.max_mana = self.base.max_mana + bonus.mana;
        self.stats.strength = self.base.strength + bonus.strength;
        self.stats.dexterity = self.base.dexterity + bonus.dexterity;
        self.stats.intelligence = self.base.intelligence + bonus.intelligence;
        self.stats.health = self.stats.health.min(self.stats.max_health);
        self.stats.mana = self.stats.mana.min(self.stats.max_mana);
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            username: self.username.clone(),
            position: self.position,
            size: self.size,
            stats: self.stats,
            equipment: self.equipment.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Npc {
    pub id: u32,
    pub kind: NpcKind,
    pub position: Position,
    pub health: u32,
    pub max_health: u32,
    pub level: u32,
    pub is_aggressive: bool,
}

impl Npc {
    /// Rolls a random kind and scales its health with `enemy_level`.
    pub fn spawn<R: Rng>(
        id: u32,
        position: Position,
        enemy_level: u32,
        aggressive_chance: f64,
        rng: &mut R,
    ) -> Self {
        let kind = NpcKind::ALL[rng.gen_range(0..NpcKind::ALL.len())];
        let level = enemy_level.max(1);
        let max_health = base_health(kind) * (level + 1) / 2;

        Self {
            id,
            kind,
            position,
            health: max_health,
            max_health,
            level,
            is_aggressive: rng.gen_bool(aggressive_chance),
        }
    }

    pub fn view(&self) -> NpcView {
        NpcView {
            id: self.id,
            kind: self.kind,
            position: self.position,
            health: self.health,
            max_health: self.max_health,
            level: self.level,
            is_aggressive: self.is_aggressive,
        }
    }
}

fn base_health(kind: NpcKind) -> u32 {
    match kind {
        NpcKind::Rat => 12,
        NpcKind::Slime => 18,
        NpcKind::Goblin => 25,
        NpcKind::Skeleton => 30,
    }
}
