use crate::character::Character;
use crate::config::{ConfigError, PlayerConfig, WorldConfig};
use crate::replication::ReplicationScope;
use log::{debug, error, info, warn};
use rand::Rng;
use shared::{
    ClientRequest, FocusCandidate, InputState, InventoryError, ItemCatalog, ItemDef, ItemId,
    ItemTemplate, Lifecycle, Pickup, PickupError, PickupId, TakeOutcome, UseOutcome,
    INTERACTION_CHECK_DISTANCE, PLAYER_SIZE, WORLD_HEIGHT, WORLD_WIDTH,
};
use std::collections::HashMap;
use thiserror::Error;

/// How far from the character dropped items land
const DROP_SCATTER: f32 = 24.0;

#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("no character for client {0}")]
    UnknownPlayer(u32),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Pickup(#[from] PickupError),
}

/// The authoritative world: characters, pickups and the item catalog
#[derive(Debug)]
pub struct GameState {
    pub tick: u32,
    pub characters: HashMap<u32, Character>,
    pub pickups: HashMap<PickupId, Pickup>,
    catalog: ItemCatalog,
    player_config: PlayerConfig,
    next_pickup_id: u32,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(ItemCatalog::with_defaults(), PlayerConfig::default())
    }
}

impl GameState {
    pub fn new(catalog: ItemCatalog, player_config: PlayerConfig) -> Self {
        Self {
            tick: 0,
            characters: HashMap::new(),
            pickups: HashMap::new(),
            catalog,
            player_config,
            next_pickup_id: 1,
        }
    }

    /// Builds the world described by `world`, with its starting pickups
    /// already instantiated
    pub fn from_world(world: &WorldConfig) -> Result<Self, ConfigError> {
        let catalog = world.catalog()?;
        let templates = world.pickup_templates(&catalog)?;

        let mut state = Self::new(catalog, world.player.clone());
        for (template, x, y) in templates {
            state.spawn_template_pickup(template, x, y);
        }
        info!(
            "World ready: {} item classes, {} pickups",
            state.catalog.len(),
            state.pickups.len()
        );
        Ok(state)
    }

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    pub fn add_player(&mut self, client_id: u32) {
        let spawn_x = 100.0 + (client_id as f32 * 60.0) % (WORLD_WIDTH - 200.0);
        let spawn_y = WORLD_HEIGHT / 2.0;

        let mut character = Character::new(client_id, spawn_x, spawn_y, &self.player_config);
        character.init();
        character.on_authority_gained();

        info!("Added player {} at ({}, {})", client_id, spawn_x, spawn_y);
        self.characters.insert(client_id, character);
    }

    pub fn remove_player(&mut self, client_id: &u32) {
        if let Some(mut character) = self.characters.remove(client_id) {
            character
                .interaction_mut()
                .couldnt_find_interactable(*client_id, &mut self.pickups);
            character.on_destroy();
            info!("Removed player {}", client_id);
        }
    }

    /// Places a pickup from a designer template; the item is created when
    /// the pickup gains authority
    pub fn spawn_template_pickup(&mut self, template: ItemTemplate, x: f32, y: f32) -> PickupId {
        let id = self.next_pickup_id();
        let mut pickup = Pickup::templated(id, x, y, template);
        pickup.init();
        pickup.on_authority_gained();
        self.pickups.insert(id, pickup);
        id
    }

    /// Spawns a pickup holding `quantity` units of `def` at runtime
    pub fn spawn_pickup(
        &mut self,
        def: &ItemDef,
        quantity: u32,
        x: f32,
        y: f32,
    ) -> Result<PickupId, PickupError> {
        let id = self.next_pickup_id();
        let mut pickup = Pickup::spawned(id, x, y);
        pickup.init();
        pickup.initialize(def, quantity)?;
        pickup.on_authority_gained();
        self.pickups.insert(id, pickup);

        debug!("Spawned pickup {:?} with {} x{}", id, def.class, quantity);
        Ok(id)
    }

    /// Applies one client input: movement, then interact press or release
    pub fn apply_input(&mut self, client_id: u32, input: &InputState, dt: f32) {
        let Some(character) = self.characters.get_mut(&client_id) else {
            return;
        };
        character.apply_movement(input, dt);

        match character.interact_edge(input.interact) {
            Some(true) => {
                self.perform_interaction_check(client_id);
                let fired = self.characters.get_mut(&client_id).and_then(|character| {
                    character
                        .interaction_mut()
                        .begin_interact(client_id, &mut self.pickups)
                });
                if let Some(target) = fired {
                    self.take_pickup(client_id, target);
                }
            }
            Some(false) => {
                character
                    .interaction_mut()
                    .end_interact(client_id, &mut self.pickups);
            }
            None => {}
        }
    }

    /// Handles a mutation request. The result is only logged; clients see
    /// the effect through replication.
    pub fn apply_request(
        &mut self,
        client_id: u32,
        request: ClientRequest,
    ) -> Result<(), RequestError> {
        let character = self
            .characters
            .get_mut(&client_id)
            .ok_or(RequestError::UnknownPlayer(client_id))?;

        match request {
            ClientRequest::UseItem { item } => {
                let outcome = character.use_item(item)?;
                if outcome == UseOutcome::NoEffect {
                    debug!("Player {} used {:?} without effect", client_id, item);
                }
                Ok(())
            }
            ClientRequest::DropItem { item, quantity } => self.drop_item(client_id, item, quantity),
        }
    }

    /// Removes up to `quantity` units from the player's inventory and puts
    /// them into the world as a new pickup
    pub fn drop_item(
        &mut self,
        client_id: u32,
        item: ItemId,
        quantity: u32,
    ) -> Result<(), RequestError> {
        let character = self
            .characters
            .get_mut(&client_id)
            .ok_or(RequestError::UnknownPlayer(client_id))?;

        let def = character
            .inventory()
            .item(item)
            .map(|item| item.def().clone())
            .ok_or(InventoryError::UnknownItem(item))?;
        let dropped = character.inventory_mut().consume_item(item, quantity)?;
        if dropped == 0 {
            return Ok(());
        }

        let mut rng = rand::thread_rng();
        let x = (character.x + rng.gen_range(-DROP_SCATTER..DROP_SCATTER))
            .clamp(0.0, WORLD_WIDTH - PLAYER_SIZE);
        let y = (character.y + rng.gen_range(-DROP_SCATTER..DROP_SCATTER))
            .clamp(0.0, WORLD_HEIGHT - PLAYER_SIZE);

        let id = self.spawn_pickup(&def, dropped, x, y)?;
        info!("Player {} dropped {} x{} as {:?}", client_id, def.class, dropped, id);
        Ok(())
    }

    /// Advances interaction timers and removes pickups that were taken
    pub fn update(&mut self, dt: f32) {
        let ids: Vec<u32> = self.characters.keys().copied().collect();

        for client_id in ids {
            let interacting = self
                .characters
                .get(&client_id)
                .map(|character| character.interaction().is_interacting())
                .unwrap_or(false);
            if interacting {
                self.perform_interaction_check(client_id);
            }

            let fired = self.characters.get_mut(&client_id).and_then(|character| {
                character
                    .interaction_mut()
                    .update(client_id, dt, &mut self.pickups)
            });
            if let Some(target) = fired {
                self.take_pickup(client_id, target);
            }
        }

        self.destroy_depleted_pickups();
    }

    /// Proximity scan standing in for a line trace: the closest pickup within
    /// range becomes the focus candidate
    pub fn perform_interaction_check(&mut self, client_id: u32) {
        let Some(character) = self.characters.get_mut(&client_id) else {
            return;
        };
        let (cx, cy) = (character.x, character.y);

        let candidate = self
            .pickups
            .values()
            .filter(|pickup| !pickup.is_pending_destroy())
            .map(|pickup| FocusCandidate {
                target: pickup.id(),
                distance: pickup.distance_to(cx, cy),
            })
            .filter(|candidate| candidate.distance <= INTERACTION_CHECK_DISTANCE)
            .min_by(|a, b| a.distance.total_cmp(&b.distance));

        character
            .interaction_mut()
            .handle_focus(client_id, candidate, &mut self.pickups);
    }

    /// Everything `observer` should see: its own inventory, all pickups and
    /// all characters
    pub fn replication_scope(&self, observer: u32) -> ReplicationScope<'_> {
        ReplicationScope {
            inventories: self
                .characters
                .get(&observer)
                .map(|character| vec![character.inventory()])
                .unwrap_or_default(),
            pickups: self.pickups.values().collect(),
            characters: self
                .characters
                .values()
                .map(|character| character.state(self.interact_percentage(character)))
                .collect(),
        }
    }

    fn interact_percentage(&self, character: &Character) -> f32 {
        character
            .interaction()
            .viewed()
            .and_then(|target| self.pickups.get(&target))
            .map(|pickup| {
                character
                    .interaction()
                    .interact_percentage(pickup.interactable().interaction_time)
            })
            .unwrap_or(0.0)
    }

    fn take_pickup(&mut self, client_id: u32, target: PickupId) {
        let (Some(character), Some(pickup)) = (
            self.characters.get_mut(&client_id),
            self.pickups.get_mut(&target),
        ) else {
            warn!("Player {} tried to take missing pickup {:?}", client_id, target);
            return;
        };

        match pickup.take(character.inventory_mut()) {
            Ok(result) => {
                info!(
                    "Player {} took {}/{} from {:?}: {:?}",
                    client_id, result.added.granted, result.added.requested, target, result.outcome
                );
                if result.outcome != TakeOutcome::Depleted && !result.added.reason.is_empty() {
                    debug!("Player {}: {}", client_id, result.added.reason);
                }
            }
            Err(e) => error!("Player {} failed to take {:?}: {}", client_id, target, e),
        }
    }

    fn destroy_depleted_pickups(&mut self) {
        let depleted: Vec<PickupId> = self
            .pickups
            .values()
            .filter(|pickup| pickup.is_pending_destroy())
            .map(Pickup::id)
            .collect();

        for id in depleted {
            for (client_id, character) in self.characters.iter_mut() {
                if character.interaction().viewed() == Some(id) {
                    character
                        .interaction_mut()
                        .couldnt_find_interactable(*client_id, &mut self.pickups);
                }
            }
            if let Some(mut pickup) = self.pickups.remove(&id) {
                pickup.on_destroy();
                debug!("Destroyed pickup {:?}", id);
            }
        }
    }

    fn next_pickup_id(&mut self) -> PickupId {
        let id = PickupId(self.next_pickup_id);
        self.next_pickup_id += 1;
        id
    }
}
