//! Replication keys and the state snapshots that travel from the
//! authoritative side to replicas.
//!
//! Two levels of keys are tracked: the inventory key changes when an
//! inventory gains or loses a slot, and each item key changes when that
//! item's fields change. A sender compares keys with the last value it sent
//! and skips everything that did not move.

use crate::inventory::InventoryId;
use crate::item::{ItemDef, ItemId};
use crate::pickup::PickupId;
use serde::{Deserialize, Serialize};

/// Monotonically increasing change counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicationKey(pub u32);

impl ReplicationKey {
    pub fn bump(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

/// Replicated fields of one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemState {
    pub id: ItemId,
    pub def: ItemDef,
    pub quantity: u32,
    pub key: ReplicationKey,
}

/// Structural part of an inventory: configuration and slot order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryHeader {
    pub inventory: InventoryId,
    /// Character that owns the inventory
    pub owner: u32,
    pub key: ReplicationKey,
    pub capacity: u32,
    pub weight_capacity: f32,
    pub items: Vec<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupState {
    pub pickup: PickupId,
    pub key: ReplicationKey,
    pub x: f32,
    pub y: f32,
    pub name_text: String,
    pub action_text: String,
    pub interaction_time: f32,
    pub interaction_distance: f32,
    pub item: Option<ItemState>,
}

/// Per-tick view of a character, sent unconditionally like a position update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    pub id: u32,
    pub inventory: InventoryId,
    pub x: f32,
    pub y: f32,
    pub health: f32,
    pub max_health: f32,
    pub viewed: Option<PickupId>,
    pub interacting: bool,
    /// 0..1 progress of the hold-to-interact countdown
    pub interact_percentage: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicationUpdate {
    InventoryHeader(InventoryHeader),
    InventoryItem {
        inventory: InventoryId,
        item: ItemState,
    },
    InventoryRemoved {
        inventory: InventoryId,
    },
    PickupSpawned(PickupState),
    PickupItem {
        pickup: PickupId,
        item: Option<ItemState>,
    },
    PickupDestroyed {
        pickup: PickupId,
    },
    Character(CharacterState),
    CharacterRemoved {
        id: u32,
    },
}
