//! Per-client key diffing of the authoritative world.
//!
//! For every observer the gate remembers the key it last sent for each
//! inventory, item and pickup. A pass only emits what moved since then:
//!
//! - an inventory header when the inventory key changed (slot added or
//!   removed, capacity changed)
//! - an item when its own key changed (quantity edit)
//! - a pickup when its key changed, or just its item when only the item
//!   changed
//!
//! Objects that disappeared produce a removal update and are forgotten.
//! Character states are small and change every tick, so they are always
//! sent.
//!
//! Datagrams can be lost, so the server calls [`ReplicationGate::reset_observer`]
//! periodically; the next pass then sends everything again.

use log::debug;
use shared::{
    CharacterState, Inventory, InventoryId, ItemId, Pickup, PickupId, ReplicationKey,
    ReplicationUpdate,
};
use std::collections::{HashMap, HashSet};

/// Everything one observer is allowed to see this tick
#[derive(Debug, Default)]
pub struct ReplicationScope<'a> {
    pub inventories: Vec<&'a Inventory>,
    pub pickups: Vec<&'a Pickup>,
    pub characters: Vec<CharacterState>,
}

#[derive(Debug, Default)]
struct ObserverChannel {
    inventories: HashMap<InventoryId, ReplicationKey>,
    items: HashMap<ItemId, ReplicationKey>,
    pickups: HashMap<PickupId, ReplicationKey>,
    pickup_items: HashMap<PickupId, Option<(ItemId, ReplicationKey)>>,
    characters: HashSet<u32>,
}

#[derive(Debug, Default)]
pub struct ReplicationGate {
    observers: HashMap<u32, ObserverChannel>,
}

impl ReplicationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: u32) {
        self.observers.entry(observer).or_default();
    }

    pub fn remove_observer(&mut self, observer: u32) -> bool {
        self.observers.remove(&observer).is_some()
    }

    /// Forgets everything sent to `observer` so the next pass is a full
    /// snapshot
    pub fn reset_observer(&mut self, observer: u32) {
        if let Some(channel) = self.observers.get_mut(&observer) {
            *channel = ObserverChannel::default();
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Computes the updates `observer` needs and records them as sent
    pub fn replicate(&mut self, observer: u32, scope: &ReplicationScope) -> Vec<ReplicationUpdate> {
        let channel = self.observers.entry(observer).or_default();
        let mut updates = Vec::new();

        replicate_inventories(channel, &scope.inventories, &mut updates);
        replicate_pickups(channel, &scope.pickups, &mut updates);
        replicate_characters(channel, &scope.characters, &mut updates);

        if !updates.is_empty() {
            debug!("Observer {}: {} updates", observer, updates.len());
        }
        updates
    }
}

fn replicate_inventories(
    channel: &mut ObserverChannel,
    inventories: &[&Inventory],
    updates: &mut Vec<ReplicationUpdate>,
) {
    let mut seen_items = HashSet::new();

    for inventory in inventories {
        let id = inventory.id();
        if channel.inventories.get(&id) != Some(&inventory.replication_key()) {
            updates.push(ReplicationUpdate::InventoryHeader(inventory.header()));
            channel.inventories.insert(id, inventory.replication_key());
        }

        for item in inventory.items() {
            seen_items.insert(item.id());
            if channel.items.get(&item.id()) != Some(&item.replication_key()) {
                updates.push(ReplicationUpdate::InventoryItem {
                    inventory: id,
                    item: item.state(),
                });
                channel.items.insert(item.id(), item.replication_key());
            }
        }
    }

    let live: HashSet<InventoryId> = inventories.iter().map(|inv| inv.id()).collect();
    channel.inventories.retain(|id, _| {
        let keep = live.contains(id);
        if !keep {
            updates.push(ReplicationUpdate::InventoryRemoved { inventory: *id });
        }
        keep
    });
    // Removed items disappear from the header's slot list, no update needed
    channel.items.retain(|id, _| seen_items.contains(id));
}

fn replicate_pickups(
    channel: &mut ObserverChannel,
    pickups: &[&Pickup],
    updates: &mut Vec<ReplicationUpdate>,
) {
    for pickup in pickups {
        let id = pickup.id();
        let item_key = pickup
            .item()
            .map(|item| (item.id(), item.replication_key()));

        if channel.pickups.get(&id) != Some(&pickup.replication_key()) {
            updates.push(ReplicationUpdate::PickupSpawned(pickup.state()));
            channel.pickups.insert(id, pickup.replication_key());
            channel.pickup_items.insert(id, item_key);
        } else if channel.pickup_items.get(&id) != Some(&item_key) {
            updates.push(ReplicationUpdate::PickupItem {
                pickup: id,
                item: pickup.item_state(),
            });
            channel.pickup_items.insert(id, item_key);
        }
    }

    let live: HashSet<PickupId> = pickups.iter().map(|pickup| pickup.id()).collect();
    channel.pickups.retain(|id, _| {
        let keep = live.contains(id);
        if !keep {
            updates.push(ReplicationUpdate::PickupDestroyed { pickup: *id });
        }
        keep
    });
    channel.pickup_items.retain(|id, _| live.contains(id));
}

fn replicate_characters(
    channel: &mut ObserverChannel,
    characters: &[CharacterState],
    updates: &mut Vec<ReplicationUpdate>,
) {
    for character in characters {
        updates.push(ReplicationUpdate::Character(character.clone()));
    }

    let live: HashSet<u32> = characters.iter().map(|c| c.id).collect();
    for gone in channel.characters.difference(&live) {
        updates.push(ReplicationUpdate::CharacterRemoved { id: *gone });
    }
    channel.characters = live;
}
