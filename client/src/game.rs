use log::{debug, info, warn};
use serde_json::{json, Value};
use shared::{
    CharacterState, Inventory, InventoryEvent, InventoryId, ItemClassId, ItemId, Pickup,
    PickupId, ReplicationUpdate,
};
use std::collections::HashMap;

/// Read-only mirror of everything the server replicates to this client.
///
/// Nothing here is ever mutated by local input: requests go to the server
/// and their effect shows up once the next replication pass arrives.
#[derive(Debug, Default)]
pub struct ClientGameState {
    pub client_id: Option<u32>,
    pub tick: u32,
    pub last_processed_input: u32,
    inventories: HashMap<InventoryId, Inventory>,
    pickups: HashMap<PickupId, Pickup>,
    characters: HashMap<u32, CharacterState>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one `Replication` packet. Packets from an older tick than
    /// one already applied are dropped.
    pub fn apply_replication(
        &mut self,
        tick: u32,
        last_processed_input: u32,
        updates: Vec<ReplicationUpdate>,
    ) -> bool {
        if tick < self.tick {
            debug!("Dropping stale replication for tick {} (at {})", tick, self.tick);
            return false;
        }
        self.tick = tick;
        self.last_processed_input = self.last_processed_input.max(last_processed_input);

        for update in updates {
            self.apply_update(update);
        }
        true
    }

    pub fn apply_update(&mut self, update: ReplicationUpdate) {
        match update {
            ReplicationUpdate::InventoryHeader(header) => {
                let inventory = self.inventories.entry(header.inventory).or_insert_with(|| {
                    let mut inventory = Inventory::replica(&header);
                    let id = header.inventory;
                    inventory.subscribe(move |event| match event {
                        InventoryEvent::InventoryUpdated => debug!("Inventory {:?} updated", id),
                        InventoryEvent::ItemModified(item) => {
                            debug!("Inventory {:?}: item {:?} modified", id, item)
                        }
                    });
                    inventory
                });
                if let Err(e) = inventory.apply_header(&header) {
                    warn!("Could not apply inventory header: {}", e);
                }
            }

            ReplicationUpdate::InventoryItem { inventory, item } => {
                match self.inventories.get_mut(&inventory) {
                    Some(replica) => {
                        if let Err(e) = replica.apply_item_state(&item) {
                            warn!("Could not apply item state: {}", e);
                        }
                    }
                    // Header was lost, the next resync brings it back
                    None => debug!("Item for unknown inventory {:?}", inventory),
                }
            }

            ReplicationUpdate::InventoryRemoved { inventory } => {
                self.inventories.remove(&inventory);
            }

            ReplicationUpdate::PickupSpawned(state) => match self.pickups.get_mut(&state.pickup) {
                Some(pickup) => {
                    if let Err(e) = pickup.apply_state(&state) {
                        warn!("Could not apply pickup state: {}", e);
                    }
                }
                None => {
                    self.pickups
                        .insert(state.pickup, Pickup::from_replicated(&state));
                }
            },

            ReplicationUpdate::PickupItem { pickup, item } => {
                if let Some(replica) = self.pickups.get_mut(&pickup) {
                    if let Err(e) = replica.apply_item_state(item.as_ref()) {
                        warn!("Could not apply pickup item: {}", e);
                    }
                }
            }

            ReplicationUpdate::PickupDestroyed { pickup } => {
                self.pickups.remove(&pickup);
            }

            ReplicationUpdate::Character(state) => {
                self.characters.insert(state.id, state);
            }

            ReplicationUpdate::CharacterRemoved { id } => {
                if self.characters.remove(&id).is_some() {
                    info!("Player {} left", id);
                }
            }
        }
    }

    pub fn character(&self) -> Option<&CharacterState> {
        self.client_id.and_then(|id| self.characters.get(&id))
    }

    pub fn characters(&self) -> impl Iterator<Item = &CharacterState> {
        self.characters.values()
    }

    pub fn inventory(&self) -> Option<&Inventory> {
        self.character()
            .and_then(|character| self.inventories.get(&character.inventory))
    }

    pub fn pickup(&self, id: PickupId) -> Option<&Pickup> {
        self.pickups.get(&id)
    }

    /// Pickups ordered by distance to the local character
    pub fn pickups_by_distance(&self) -> Vec<(&Pickup, f32)> {
        let (x, y) = self
            .character()
            .map(|character| (character.x, character.y))
            .unwrap_or_default();

        let mut pickups: Vec<(&Pickup, f32)> = self
            .pickups
            .values()
            .map(|pickup| (pickup, pickup.distance_to(x, y)))
            .collect();
        pickups.sort_by(|a, b| a.1.total_cmp(&b.1));
        pickups
    }

    /// Resolves a 1-based slot number or an item class to an item in the
    /// local inventory
    pub fn resolve_item(&self, reference: &str) -> Option<ItemId> {
        let inventory = self.inventory()?;

        if let Ok(slot) = reference.parse::<usize>() {
            return slot
                .checked_sub(1)
                .and_then(|index| inventory.items().get(index))
                .map(|item| item.id());
        }
        inventory
            .find_item_by_class(&ItemClassId::new(reference))
            .map(|item| item.id())
    }

    pub fn describe_inventory(&self) -> String {
        let Some(inventory) = self.inventory() else {
            return "No inventory replicated yet".to_string();
        };

        let mut lines = vec![format!(
            "Inventory: {}/{} slots, weight {:.1}/{:.1}",
            inventory.len(),
            inventory.capacity(),
            inventory.current_weight(),
            inventory.weight_capacity()
        )];
        for (slot, item) in inventory.items().iter().enumerate() {
            lines.push(format!(
                "  {:>2}. {} x{} ({:.1})",
                slot + 1,
                item.display_name(),
                item.quantity(),
                item.stack_weight()
            ));
        }
        if let Some(character) = self.character() {
            lines.push(format!(
                "Health {:.0}/{:.0}",
                character.health, character.max_health
            ));
        }
        lines.join("\n")
    }

    pub fn inventory_json(&self) -> Value {
        match self.inventory() {
            Some(inventory) => json!({
                "id": inventory.id().0,
                "capacity": inventory.capacity(),
                "weight_capacity": inventory.weight_capacity(),
                "current_weight": inventory.current_weight(),
                "items": inventory.items().iter().map(|item| json!({
                    "id": item.id().0,
                    "class": item.class().as_str(),
                    "name": item.display_name(),
                    "quantity": item.quantity(),
                    "weight": item.stack_weight(),
                })).collect::<Vec<_>>(),
            }),
            None => Value::Null,
        }
    }

    pub fn describe_pickups(&self) -> String {
        let viewed = self.character().and_then(|character| character.viewed);
        let pickups = self.pickups_by_distance();
        if pickups.is_empty() {
            return "No pickups in the world".to_string();
        }

        pickups
            .into_iter()
            .map(|(pickup, distance)| {
                let marker = if Some(pickup.id()) == viewed { '>' } else { ' ' };
                let contents = pickup
                    .item()
                    .map(|item| format!("{} x{}", item.display_name(), item.quantity()))
                    .unwrap_or_else(|| "empty".to_string());
                format!(
                    "{} #{} {} at ({:.0}, {:.0}), {:.0} away",
                    marker,
                    pickup.id().0,
                    contents,
                    pickup.x,
                    pickup.y,
                    distance
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// One-line status of the character's current interaction, if any
    pub fn interaction_status(&self) -> Option<String> {
        let character = self.character()?;
        let pickup = self.pickup(character.viewed?)?;
        let interactable = pickup.interactable();

        Some(if character.interacting {
            format!(
                "{} {}: {:.0}%",
                interactable.action_text(),
                interactable.name_text(),
                character.interact_percentage * 100.0
            )
        } else {
            format!(
                "Looking at {} ({})",
                interactable.name_text(),
                interactable.action_text()
            )
        })
    }
}
