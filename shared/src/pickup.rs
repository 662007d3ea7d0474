//! World objects that hold one item and hand it to whoever takes them.
//!
//! A pickup placed in the world file starts out [`PickupContents::Templated`]
//! and is turned into a live item the first time the authority sees it. A
//! pickup spawned at runtime (a dropped item) is initialized directly.

use crate::error::PickupError;
use crate::interaction::{Interactable, InteractableSource};
use crate::inventory::{Inventory, ItemAddResult};
use crate::item::{Item, ItemDef};
use crate::replication::{ItemState, PickupState, ReplicationKey};
use crate::{Lifecycle, NetRole, PICKUP_INTERACTION_DISTANCE, PICKUP_INTERACTION_TIME};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PickupId(pub u32);

/// Designer-authored prototype of the item a pickup starts with
#[derive(Debug, Clone, PartialEq)]
pub struct ItemTemplate {
    pub def: ItemDef,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickupContents {
    Templated(ItemTemplate),
    Instantiated(Item),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeOutcome {
    /// Part of the item was taken; this many units stay in the world
    Remaining(u32),
    /// Everything was taken and the pickup should be destroyed
    Depleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TakeResult {
    pub added: ItemAddResult,
    pub outcome: TakeOutcome,
}

#[derive(Debug)]
pub struct Pickup {
    id: PickupId,
    role: NetRole,
    pub x: f32,
    pub y: f32,
    contents: PickupContents,
    interactable: Interactable,
    rep_key: ReplicationKey,
    placed_in_world: bool,
    pending_destroy: bool,
}

impl Pickup {
    /// A pickup placed in the world file
    pub fn templated(id: PickupId, x: f32, y: f32, template: ItemTemplate) -> Self {
        let mut pickup = Self::spawned(id, x, y);
        pickup.contents = PickupContents::Templated(template);
        pickup.placed_in_world = true;
        pickup
    }

    /// A pickup spawned at runtime; call [`Pickup::initialize`] next
    pub fn spawned(id: PickupId, x: f32, y: f32) -> Self {
        let mut interactable = Interactable::new(PICKUP_INTERACTION_TIME, PICKUP_INTERACTION_DISTANCE);
        interactable.set_name_text("Pickup");
        interactable.set_action_text("Take");

        Self {
            id,
            role: NetRole::Authority,
            x,
            y,
            contents: PickupContents::Empty,
            interactable,
            rep_key: ReplicationKey::default(),
            placed_in_world: false,
            pending_destroy: false,
        }
    }

    pub fn from_replicated(state: &PickupState) -> Self {
        let mut interactable = Interactable::new(state.interaction_time, state.interaction_distance);
        interactable.set_name_text(state.name_text.clone());
        interactable.set_action_text(state.action_text.clone());

        let contents = match &state.item {
            Some(item) => PickupContents::Instantiated(Item::from_replicated(item, None)),
            None => PickupContents::Empty,
        };

        Self {
            id: state.pickup,
            role: NetRole::Replica,
            x: state.x,
            y: state.y,
            contents,
            interactable,
            rep_key: state.key,
            placed_in_world: false,
            pending_destroy: false,
        }
    }

    pub fn id(&self) -> PickupId {
        self.id
    }

    pub fn role(&self) -> NetRole {
        self.role
    }

    pub fn contents(&self) -> &PickupContents {
        &self.contents
    }

    pub fn item(&self) -> Option<&Item> {
        match &self.contents {
            PickupContents::Instantiated(item) => Some(item),
            _ => None,
        }
    }

    pub fn interactable(&self) -> &Interactable {
        &self.interactable
    }

    pub fn interactable_mut(&mut self) -> &mut Interactable {
        &mut self.interactable
    }

    pub fn replication_key(&self) -> ReplicationKey {
        self.rep_key
    }

    pub fn is_pending_destroy(&self) -> bool {
        self.pending_destroy
    }

    pub fn distance_to(&self, x: f32, y: f32) -> f32 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }

    /// Creates the live item. A zero quantity leaves the pickup empty.
    pub fn initialize(&mut self, def: &ItemDef, quantity: u32) -> Result<(), PickupError> {
        self.ensure_authority("initialize")?;

        if quantity == 0 {
            warn!("Pickup {:?} initialized with nothing in it", self.id);
            return Ok(());
        }

        let mut item = Item::new(def.clone(), quantity);
        item.mark_dirty();
        self.interactable.set_name_text(item.display_name().to_string());
        self.contents = PickupContents::Instantiated(item);
        self.rep_key.bump();

        debug!("Pickup {:?} holds {} x{}", self.id, def.class, quantity);
        Ok(())
    }

    /// Moves as much of the item as fits into `taker`.
    ///
    /// Whatever does not fit stays in the world. When everything was taken
    /// the pickup is flagged for destruction and further takes fail.
    pub fn take(&mut self, taker: &mut Inventory) -> Result<TakeResult, PickupError> {
        self.ensure_authority("take")?;

        if self.pending_destroy {
            return Err(PickupError::Empty);
        }
        let PickupContents::Instantiated(item) = &mut self.contents else {
            return Err(PickupError::Empty);
        };

        let added = taker.try_add_item(item)?;
        let quantity = item.quantity();

        let outcome = if added.granted < quantity {
            let remaining = quantity - added.granted;
            if item.set_quantity(remaining) {
                self.interactable.refresh_widget();
            }
            TakeOutcome::Remaining(remaining)
        } else {
            self.pending_destroy = true;
            TakeOutcome::Depleted
        };

        Ok(TakeResult { added, outcome })
    }

    /// Replicated pickup header: position, texts and key
    pub fn state(&self) -> PickupState {
        PickupState {
            pickup: self.id,
            key: self.rep_key,
            x: self.x,
            y: self.y,
            name_text: self.interactable.name_text().to_string(),
            action_text: self.interactable.action_text().to_string(),
            interaction_time: self.interactable.interaction_time,
            interaction_distance: self.interactable.interaction_distance,
            item: self.item_state(),
        }
    }

    pub fn item_state(&self) -> Option<ItemState> {
        self.item().map(Item::state)
    }

    pub fn apply_state(&mut self, state: &PickupState) -> Result<(), PickupError> {
        self.ensure_replica()?;

        self.x = state.x;
        self.y = state.y;
        self.rep_key = state.key;
        self.interactable.interaction_time = state.interaction_time;
        self.interactable.interaction_distance = state.interaction_distance;
        if self.interactable.name_text() != state.name_text {
            self.interactable.set_name_text(state.name_text.clone());
        }
        if self.interactable.action_text() != state.action_text {
            self.interactable.set_action_text(state.action_text.clone());
        }
        self.apply_item_state(state.item.as_ref())
    }

    /// Applies the replicated item. Field changes refresh the interaction
    /// widget.
    pub fn apply_item_state(&mut self, state: Option<&ItemState>) -> Result<(), PickupError> {
        self.ensure_replica()?;

        match (state, &mut self.contents) {
            (Some(state), PickupContents::Instantiated(item)) if item.id() == state.id => {
                if item.apply_state(state) {
                    self.interactable.refresh_widget();
                }
            }
            (Some(state), _) => {
                let item = Item::from_replicated(state, None);
                self.interactable.set_name_text(item.display_name().to_string());
                self.contents = PickupContents::Instantiated(item);
            }
            (None, _) => self.contents = PickupContents::Empty,
        }
        Ok(())
    }

    fn ensure_authority(&self, operation: &'static str) -> Result<(), PickupError> {
        if self.role != NetRole::Authority {
            error!("Pickup {:?}: {} called on a replica, ignoring", self.id, operation);
            return Err(PickupError::NotAuthorized { operation });
        }
        Ok(())
    }

    fn ensure_replica(&self) -> Result<(), PickupError> {
        if self.role != NetRole::Replica {
            error!("Pickup {:?}: replicated state pushed into the authority", self.id);
            return Err(PickupError::NotAuthorized {
                operation: "apply_state",
            });
        }
        Ok(())
    }
}

impl Lifecycle for Pickup {
    fn init(&mut self) {
        self.interactable.set_action_text("Take");
    }

    fn on_authority_gained(&mut self) {
        if self.role != NetRole::Authority || !self.placed_in_world {
            return;
        }
        if let PickupContents::Templated(template) = &self.contents {
            let template = template.clone();
            if let Err(e) = self.initialize(&template.def, template.quantity) {
                error!("Failed to initialize pickup {:?}: {}", self.id, e);
            }
        }
    }

    fn on_destroy(&mut self) {
        self.interactable.deactivate();
        self.contents = PickupContents::Empty;
        self.pending_destroy = true;
    }
}

impl InteractableSource for HashMap<PickupId, Pickup> {
    fn interactable_mut(&mut self, target: PickupId) -> Option<&mut Interactable> {
        self.get_mut(&target)
            .filter(|pickup| !pickup.is_pending_destroy())
            .map(Pickup::interactable_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{AddOutcome, InventoryId};

    fn stone() -> ItemDef {
        ItemDef::new("stone", "Stone").with_weight(1.0).with_max_stack(10)
    }

    fn stone_pickup(quantity: u32) -> Pickup {
        let mut pickup = Pickup::spawned(PickupId(1), 10.0, 20.0);
        pickup.initialize(&stone(), quantity).unwrap();
        pickup
    }

    #[test]
    fn test_template_instantiates_once() {
        let template = ItemTemplate {
            def: stone(),
            quantity: 3,
        };
        let mut pickup = Pickup::templated(PickupId(1), 0.0, 0.0, template);
        assert!(pickup.item().is_none());

        pickup.init();
        pickup.on_authority_gained();
        let first_id = pickup.item().unwrap().id();
        pickup.on_authority_gained();

        assert_eq!(pickup.item().unwrap().id(), first_id);
        assert_eq!(pickup.item().unwrap().quantity(), 3);
        assert_eq!(pickup.interactable().name_text(), "Stone");
        assert_eq!(pickup.interactable().action_text(), "Take");
    }

    #[test]
    fn test_runtime_pickup_ignores_template_hook() {
        let mut pickup = Pickup::spawned(PickupId(1), 0.0, 0.0);
        pickup.on_authority_gained();
        assert_eq!(pickup.contents(), &PickupContents::Empty);
    }

    #[test]
    fn test_take_everything() {
        let mut pickup = stone_pickup(3);
        let mut taker = Inventory::new(InventoryId(5), 5, 20, 100.0);

        let result = pickup.take(&mut taker).unwrap();

        assert_eq!(result.added.outcome, AddOutcome::All);
        assert_eq!(result.outcome, TakeOutcome::Depleted);
        assert!(pickup.is_pending_destroy());
        assert_eq!(taker.items()[0].quantity(), 3);
        assert_eq!(pickup.take(&mut taker), Err(PickupError::Empty));
    }

    #[test]
    fn test_partial_take_leaves_remainder() {
        let mut pickup = stone_pickup(3);
        // Room for two units of weight only
        let mut taker = Inventory::new(InventoryId(5), 5, 20, 2.0);
        let item_key = pickup.item().unwrap().replication_key();

        let result = pickup.take(&mut taker).unwrap();

        assert_eq!(result.added.granted, 2);
        assert_eq!(result.outcome, TakeOutcome::Remaining(1));
        assert_eq!(taker.items()[0].quantity(), 2);
        assert_eq!(pickup.item().unwrap().quantity(), 1);
        assert_ne!(pickup.item().unwrap().replication_key(), item_key);
        assert!(!pickup.is_pending_destroy());
    }

    #[test]
    fn test_take_into_full_inventory() {
        let mut pickup = stone_pickup(3);
        let mut taker = Inventory::new(InventoryId(5), 5, 0, 100.0);

        let result = pickup.take(&mut taker).unwrap();

        assert_eq!(result.added.outcome, AddOutcome::None);
        assert_eq!(result.outcome, TakeOutcome::Remaining(3));
    }

    #[test]
    fn test_empty_pickup_cannot_be_taken() {
        let mut pickup = Pickup::spawned(PickupId(1), 0.0, 0.0);
        let mut taker = Inventory::new(InventoryId(5), 5, 20, 100.0);

        assert_eq!(pickup.take(&mut taker), Err(PickupError::Empty));
    }

    #[test]
    fn test_replica_rejects_take() {
        let authority = stone_pickup(3);
        let mut replica = Pickup::from_replicated(&authority.state());
        let mut taker = Inventory::new(InventoryId(5), 5, 20, 100.0);

        assert!(matches!(
            replica.take(&mut taker),
            Err(PickupError::NotAuthorized { .. })
        ));
    }

    #[test]
    fn test_replica_follows_item_changes() {
        let mut authority = stone_pickup(3);
        let mut replica = Pickup::from_replicated(&authority.state());
        let mut taker = Inventory::new(InventoryId(5), 5, 20, 2.0);

        authority.take(&mut taker).unwrap();
        replica
            .apply_item_state(authority.item_state().as_ref())
            .unwrap();

        assert_eq!(replica.item().unwrap().quantity(), 1);
        assert_eq!(replica.item().unwrap().id(), authority.item().unwrap().id());
        assert_eq!(replica.interactable().name_text(), "Stone");
    }

    #[test]
    fn test_destroy_deactivates_interaction() {
        let mut pickup = stone_pickup(1);
        pickup.interactable_mut().begin_interact(3);

        pickup.on_destroy();

        assert!(!pickup.interactable().is_active());
        assert!(pickup.interactable().interactors().is_empty());
        assert!(pickup.item().is_none());
    }
}
