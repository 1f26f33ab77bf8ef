//! Error taxonomy for the world simulation.
//!
//! Invalid movement and collisions are not errors: those paths return `false`
//! and the caller re-syncs the client. Only faults that must reach a caller
//! (a floor that cannot be served, an impossible item action) live here.

use shared::EquipSlot;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum WorldError {
    #[error("floor {0} unavailable")]
    FloorUnavailable(u32),

    #[error("level generation failed: {0}")]
    GenerationFailed(String),

    #[error("player {0} not found")]
    PlayerNotFound(u32),

    #[error("player {0} is already registered")]
    DuplicatePlayer(u32),

    #[error("invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown item {0}")]
    UnknownItem(u32),

    #[error("item {0} cannot be equipped")]
    NotEquippable(u32),

    #[error("item {0} cannot be used")]
    NotUsable(u32),

    #[error("nothing equipped in {0:?} slot")]
    SlotEmpty(EquipSlot),

    #[error("inventory is full")]
    InventoryFull,
}

pub type WorldResult<T> = Result<T, WorldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            WorldError::FloorUnavailable(7).to_string(),
            "floor 7 unavailable"
        );
        assert_eq!(WorldError::InventoryFull.to_string(), "inventory is full");
        assert_eq!(
            WorldError::SlotEmpty(EquipSlot::Boots).to_string(),
            "nothing equipped in Boots slot"
        );
    }
}
