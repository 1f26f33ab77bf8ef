//! Item templates and quantity-stacked inventories.

use crate::error::{WorldError, WorldResult};
use rand::Rng;
use shared::{EquipSlot, InventorySlot, Item, ItemKind, StatBonus};
use std::collections::BTreeMap;

pub const HEALING_POTION: u32 = 1;
pub const MANA_POTION: u32 = 2;
pub const WOODEN_SWORD: u32 = 10;
pub const IRON_SWORD: u32 = 11;
pub const LEATHER_ARMOR: u32 = 20;
pub const CHAIN_MAIL: u32 = 21;
pub const LEATHER_CAP: u32 = 30;
pub const IRON_HELM: u32 = 31;
pub const LEATHER_BOOTS: u32 = 40;

/// Read-only set of item templates keyed by id.
#[derive(Debug, Clone)]
pub struct ItemCatalog {
    items: BTreeMap<u32, Item>,
}

impl ItemCatalog {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items: items.into_iter().map(|item| (item.id, item)).collect(),
        }
    }

    /// The built-in item set.
    pub fn standard() -> Self {
        let gear = |id: u32, name: &str, slot: EquipSlot, bonus: StatBonus| Item {
            id,
            name: name.to_string(),
            kind: ItemKind::Equipment(slot),
            bonus,
        };
        let potion = |id: u32, name: &str, heal: u32, mana: u32| Item {
            id,
            name: name.to_string(),
            kind: ItemKind::Consumable { heal, mana },
            bonus: StatBonus::default(),
        };

        Self::new(vec![
            potion(HEALING_POTION, "Healing Potion", 40, 0),
            potion(MANA_POTION, "Mana Potion", 0, 30),
            gear(
                WOODEN_SWORD,
                "Wooden Sword",
                EquipSlot::Weapon,
                StatBonus {
                    strength: 2,
                    ..StatBonus::default()
                },
            ),
            gear(
                IRON_SWORD,
                "Iron Sword",
                EquipSlot::Weapon,
                StatBonus {
                    strength: 5,
                    dexterity: 1,
                    ..StatBonus::default()
                },
            ),
            gear(
                LEATHER_ARMOR,
                "Leather Armor",
                EquipSlot::Armor,
                StatBonus {
                    health: 15,
                    ..StatBonus::default()
                },
            ),
            gear(
                CHAIN_MAIL,
                "Chain Mail",
                EquipSlot::Armor,
                StatBonus {
                    health: 35,
                    ..StatBonus::default()
                },
            ),
            gear(
                LEATHER_CAP,
                "Leather Cap",
                EquipSlot::Helmet,
                StatBonus {
                    health: 5,
                    intelligence: 1,
                    ..StatBonus::default()
                },
            ),
            gear(
                IRON_HELM,
                "Iron Helm",
                EquipSlot::Helmet,
                StatBonus {
                    health: 12,
                    ..StatBonus::default()
                },
            ),
            gear(
                LEATHER_BOOTS,
                "Leather Boots",
                EquipSlot::Boots,
                StatBonus {
                    dexterity: 2,
                    ..StatBonus::default()
                },
            ),
        ])
    }

    pub fn get(&self, id: u32) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn random<R: Rng>(&self, rng: &mut R) -> Option<&Item> {
        if self.items.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.items.len());
        self.items.values().nth(index)
    }
}

/// Fixed number of distinct stacks, each holding any quantity of one item id.
#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    slots: Vec<InventorySlot>,
    capacity: usize,
}

impl Inventory {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
        }
    }

    pub fn slots(&self) -> &[InventorySlot] {
        &self.slots
    }

    pub fn quantity(&self, item_id: u32) -> u32 {
        self.slots
            .iter()
            .find(|slot| slot.item.id == item_id)
            .map_or(0, |slot| slot.quantity)
    }

    pub fn can_accept(&self, item_id: u32) -> bool {
        self.quantity(item_id) > 0 || self.slots.len() < self.capacity
    }

    /// Adds `quantity` copies of `item`, stacking onto an existing slot when possible.
    pub fn add(&mut self, item: &Item, quantity: u32) -> WorldResult<()> {
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.item.id == item.id) {
            slot.quantity += quantity;
            return Ok(());
        }
        if self.slots.len() >= self.capacity {
            return Err(WorldError::InventoryFull);
        }
        self.slots.push(InventorySlot {
            item: item.clone(),
            quantity,
        });
        Ok(())
    }

    /// Takes one unit of `item_id` out, dropping the slot when it empties.
    pub fn take_one(&mut self, item_id: u32) -> WorldResult<Item> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.item.id == item_id)
            .ok_or(WorldError::UnknownItem(item_id))?;

        let slot = &mut self.slots[index];
        slot.quantity -= 1;
        let item = slot.item.clone();
        if slot.quantity == 0 {
            self.slots.remove(index);
        }
        Ok(item)
    }

    pub fn find(&self, item_id: u32) -> Option<&Item> {
        self.slots
            .iter()
            .find(|slot| slot.item.id == item_id)
            .map(|slot| &slot.item)
    }
}
