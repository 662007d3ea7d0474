//! The inventory store: an ordered list of item stacks with a slot capacity
//! and a weight budget.
//!
//! Only the authoritative copy may be mutated. Replicas are rebuilt from
//! [`InventoryHeader`] and [`ItemState`] updates and are otherwise read-only.
//!
//! ### Replication keys
//!
//! The inventory key advances when a slot is added or removed and when the
//! capacity configuration changes. In-place quantity edits only advance the
//! key of the affected item.

use crate::error::InventoryError;
use crate::events::{Observers, SubscriptionId};
use crate::item::{Item, ItemClassId, ItemDef, ItemId};
use crate::replication::{InventoryHeader, ItemState, ReplicationKey};
use crate::NetRole;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

/// Unique id of an inventory. Character inventories share the character id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InventoryId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    None,
    Some,
    All,
}

/// Result of [`Inventory::try_add_item`].
///
/// Running out of slots or weight is an expected outcome, not an error, so
/// the reason is carried as display text for the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemAddResult {
    pub outcome: AddOutcome,
    pub requested: u32,
    pub granted: u32,
    pub reason: String,
}

impl ItemAddResult {
    pub fn added_none(requested: u32, reason: impl Into<String>) -> Self {
        Self {
            outcome: AddOutcome::None,
            requested,
            granted: 0,
            reason: reason.into(),
        }
    }

    pub fn added_some(requested: u32, granted: u32, reason: impl Into<String>) -> Self {
        Self {
            outcome: AddOutcome::Some,
            requested,
            granted,
            reason: reason.into(),
        }
    }

    pub fn added_all(requested: u32) -> Self {
        Self {
            outcome: AddOutcome::All,
            requested,
            granted: requested,
            reason: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryEvent {
    /// A slot was added or removed, or the capacity configuration changed
    InventoryUpdated,
    /// Fields of one item changed in place
    ItemModified(ItemId),
}

const INVENTORY_FULL: &str = "Couldn't add item to inventory. Inventory is full.";

/// Weights below this are treated as weightless
const WEIGHT_EPSILON: f32 = 1e-6;

#[derive(Debug)]
pub struct Inventory {
    id: InventoryId,
    owner: u32,
    role: NetRole,
    capacity: u32,
    weight_capacity: f32,
    items: Vec<Item>,
    rep_key: ReplicationKey,
    /// Replicas only: slot order from the last applied header
    slot_order: Vec<ItemId>,
    observers: Observers<InventoryEvent>,
}

impl Inventory {
    /// Creates an authoritative, empty inventory
    pub fn new(id: InventoryId, owner: u32, capacity: u32, weight_capacity: f32) -> Self {
        Self {
            id,
            owner,
            role: NetRole::Authority,
            capacity,
            weight_capacity,
            items: Vec::new(),
            rep_key: ReplicationKey::default(),
            slot_order: Vec::new(),
            observers: Observers::new(),
        }
    }

    /// Creates an empty replica from a replicated header. Items arrive
    /// through [`Inventory::apply_item_state`].
    pub fn replica(header: &InventoryHeader) -> Self {
        Self {
            id: header.inventory,
            owner: header.owner,
            role: NetRole::Replica,
            capacity: header.capacity,
            weight_capacity: header.weight_capacity,
            items: Vec::new(),
            rep_key: header.key,
            slot_order: header.items.clone(),
            observers: Observers::new(),
        }
    }

    pub fn id(&self) -> InventoryId {
        self.id
    }

    pub fn owner(&self) -> u32 {
        self.owner
    }

    pub fn role(&self) -> NetRole {
        self.role
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn weight_capacity(&self) -> f32 {
        self.weight_capacity
    }

    pub fn replication_key(&self) -> ReplicationKey {
        self.rep_key
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&InventoryEvent) + Send + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Tries to add the candidate's class and quantity to this inventory.
    ///
    /// The candidate itself is never stored: either an existing stack of the
    /// same class grows, or a fresh item owned by this inventory is created.
    /// A stack that is already full is not split into a second slot.
    pub fn try_add_item(&mut self, candidate: &Item) -> Result<ItemAddResult, InventoryError> {
        self.ensure_authority("try_add_item")?;

        let requested = candidate.quantity();
        let def = candidate.def();

        if requested == 0 {
            return Ok(ItemAddResult::added_none(0, "Nothing to add."));
        }

        if def.stackable {
            if let Some(index) = self.position_of_class(&def.class) {
                return Ok(self.add_to_stack(index, def, requested));
            }
        } else {
            debug_assert_eq!(requested, 1, "non-stackable items hold exactly one");
        }

        Ok(self.add_new_slot(def, requested))
    }

    /// Builds a transient candidate of `def` and delegates to
    /// [`Inventory::try_add_item`]. The quantity is clamped to the class
    /// stack limit first.
    pub fn try_add_item_from_class(
        &mut self,
        def: &ItemDef,
        quantity: u32,
    ) -> Result<ItemAddResult, InventoryError> {
        if !def.stackable && quantity > 1 {
            error!(
                "Requested {} of non-stackable '{}', clamping to 1",
                quantity, def.class
            );
            debug_assert!(false, "non-stackable class requested with quantity {}", quantity);
        }

        let candidate = Item::new(def.clone(), quantity);
        self.try_add_item(&candidate)
    }

    /// Removes up to `quantity` units of `item` and returns how many were
    /// removed. An item that reaches zero leaves the inventory.
    pub fn consume_item(&mut self, item: ItemId, quantity: u32) -> Result<u32, InventoryError> {
        self.ensure_authority("consume_item")?;

        let index = self
            .position_of(item)
            .ok_or(InventoryError::UnknownItem(item))?;

        let current = self.items[index].quantity();
        let removed = quantity.min(current);
        if removed == 0 {
            return Ok(0);
        }

        if current - removed == 0 {
            self.items.remove(index);
            self.rep_key.bump();
            self.observers.notify(&InventoryEvent::InventoryUpdated);
        } else {
            self.items[index].set_quantity(current - removed);
            self.observers.notify(&InventoryEvent::ItemModified(item));
        }

        debug!("Inventory {:?}: consumed {} of {:?}", self.id, removed, item);
        Ok(removed)
    }

    /// Consumes the whole stack
    pub fn consume_all(&mut self, item: ItemId) -> Result<u32, InventoryError> {
        self.consume_item(item, u32::MAX)
    }

    /// Removes the item. Returns false if it was not present.
    pub fn remove_item(&mut self, item: ItemId) -> Result<bool, InventoryError> {
        self.ensure_authority("remove_item")?;

        match self.position_of(item) {
            Some(index) => {
                self.items.remove(index);
                self.rep_key.bump();
                self.observers.notify(&InventoryEvent::InventoryUpdated);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_capacity(&mut self, capacity: u32) -> Result<(), InventoryError> {
        self.ensure_authority("set_capacity")?;
        if self.items.len() > capacity as usize {
            warn!(
                "Inventory {:?} holds {} slots, more than the new capacity {}",
                self.id,
                self.items.len(),
                capacity
            );
        }
        self.capacity = capacity;
        self.rep_key.bump();
        self.observers.notify(&InventoryEvent::InventoryUpdated);
        Ok(())
    }

    pub fn set_weight_capacity(&mut self, weight_capacity: f32) -> Result<(), InventoryError> {
        self.ensure_authority("set_weight_capacity")?;
        self.weight_capacity = weight_capacity;
        self.rep_key.bump();
        self.observers.notify(&InventoryEvent::InventoryUpdated);
        Ok(())
    }

    /// First item of the same class as `candidate`
    pub fn find_item(&self, candidate: &Item) -> Option<&Item> {
        self.find_item_by_class(candidate.class())
    }

    pub fn find_item_by_class(&self, class: &ItemClassId) -> Option<&Item> {
        self.items.iter().find(|item| item.class() == class)
    }

    pub fn find_items_by_class(&self, class: &ItemClassId) -> Vec<&Item> {
        self.items.iter().filter(|item| item.class() == class).collect()
    }

    /// True if the inventory holds at least `quantity` units of `class`
    /// across all of its stacks
    pub fn has_item(&self, class: &ItemClassId, quantity: u32) -> bool {
        let total: u64 = self
            .find_items_by_class(class)
            .iter()
            .map(|item| item.quantity() as u64)
            .sum();
        total > 0 && total >= quantity as u64
    }

    pub fn current_weight(&self) -> f32 {
        self.items.iter().map(Item::stack_weight).sum()
    }

    /// Replicated configuration and slot order
    pub fn header(&self) -> InventoryHeader {
        InventoryHeader {
            inventory: self.id,
            owner: self.owner,
            key: self.rep_key,
            capacity: self.capacity,
            weight_capacity: self.weight_capacity,
            items: self.items.iter().map(Item::id).collect(),
        }
    }

    /// Applies a replicated header: configuration, key and slot order.
    /// Items that are no longer listed are dropped.
    pub fn apply_header(&mut self, header: &InventoryHeader) -> Result<(), InventoryError> {
        self.ensure_replica()?;

        self.owner = header.owner;
        self.capacity = header.capacity;
        self.weight_capacity = header.weight_capacity;
        self.rep_key = header.key;

        self.slot_order = header.items.clone();
        self.items.retain(|item| header.items.contains(&item.id()));
        self.sort_by_slot_order();

        self.observers.notify(&InventoryEvent::InventoryUpdated);
        Ok(())
    }

    /// Applies replicated fields of one item, inserting it if unknown
    pub fn apply_item_state(&mut self, state: &ItemState) -> Result<(), InventoryError> {
        self.ensure_replica()?;

        match self.position_of(state.id) {
            Some(index) => {
                if self.items[index].apply_state(state) {
                    self.observers.notify(&InventoryEvent::ItemModified(state.id));
                }
            }
            None => {
                self.items.push(Item::from_replicated(state, Some(self.id)));
                self.sort_by_slot_order();
                self.observers.notify(&InventoryEvent::InventoryUpdated);
            }
        }
        Ok(())
    }

    /// Items missing from the header order keep their relative order at the end
    fn sort_by_slot_order(&mut self) {
        let order = &self.slot_order;
        self.items.sort_by_key(|item| {
            order
                .iter()
                .position(|id| *id == item.id())
                .unwrap_or(usize::MAX)
        });
    }

    fn add_to_stack(&mut self, index: usize, def: &ItemDef, requested: u32) -> ItemAddResult {
        let weight_limit = self.weight_limit(def.weight);
        let existing = &mut self.items[index];

        let max = existing.max_stack_size();
        if existing.quantity() >= max {
            return ItemAddResult::added_none(
                requested,
                format!(
                    "Couldn't add {}. You already have a full stack of this item.",
                    def.display_name
                ),
            );
        }

        let room = max - existing.quantity();
        let mut granted = requested.min(room);
        let mut reason = format!(
            "Couldn't add entire stack of {} to inventory. Your stack is full.",
            def.display_name
        );

        if let Some(limit) = weight_limit {
            if limit < granted {
                granted = limit;
                reason = format!(
                    "Couldn't add entire stack of {} to inventory. Carrying too much weight.",
                    def.display_name
                );
            }
        }

        if granted == 0 {
            return ItemAddResult::added_none(requested, "Couldn't add item to inventory.");
        }

        let id = existing.id();
        existing.set_quantity(existing.quantity() + granted);
        debug_assert!(existing.quantity() <= max);
        self.observers.notify(&InventoryEvent::ItemModified(id));

        if granted < requested {
            ItemAddResult::added_some(requested, granted, reason)
        } else {
            ItemAddResult::added_all(requested)
        }
    }

    fn add_new_slot(&mut self, def: &ItemDef, requested: u32) -> ItemAddResult {
        if self.items.len() + 1 > self.capacity as usize {
            return ItemAddResult::added_none(requested, INVENTORY_FULL);
        }

        let mut granted = requested.min(def.max_allowed());
        let mut reason = format!(
            "Couldn't add entire stack of {} to inventory. Stack limit reached.",
            def.display_name
        );

        if let Some(limit) = self.weight_limit(def.weight) {
            if limit < granted {
                granted = limit;
                reason = format!(
                    "Couldn't add entire stack of {} to inventory. Carrying too much weight.",
                    def.display_name
                );
            }
        }

        if granted == 0 {
            return ItemAddResult::added_none(
                requested,
                "Couldn't add item to inventory. Carrying too much weight.",
            );
        }

        let mut item = Item::new(def.clone(), granted);
        item.added_to_inventory(self.id);
        item.mark_dirty();
        self.items.push(item);
        self.rep_key.bump();
        self.observers.notify(&InventoryEvent::InventoryUpdated);

        if granted < requested {
            ItemAddResult::added_some(requested, granted, reason)
        } else {
            ItemAddResult::added_all(requested)
        }
    }

    /// Units of `unit_weight` that still fit, or None for weightless items
    fn weight_limit(&self, unit_weight: f32) -> Option<u32> {
        if unit_weight.abs() < WEIGHT_EPSILON {
            return None;
        }
        let remaining = self.weight_capacity - self.current_weight();
        if remaining <= 0.0 {
            return Some(0);
        }
        Some((remaining / unit_weight).floor() as u32)
    }

    fn position_of(&self, item: ItemId) -> Option<usize> {
        self.items.iter().position(|i| i.id() == item)
    }

    fn position_of_class(&self, class: &ItemClassId) -> Option<usize> {
        self.items.iter().position(|i| i.class() == class)
    }

    fn ensure_authority(&self, operation: &'static str) -> Result<(), InventoryError> {
        if self.role != NetRole::Authority {
            error!(
                "Inventory {:?}: {} called on a replica, ignoring",
                self.id, operation
            );
            return Err(InventoryError::NotAuthorized { operation });
        }
        Ok(())
    }

    fn ensure_replica(&self) -> Result<(), InventoryError> {
        if self.role != NetRole::Replica {
            error!("Inventory {:?}: replicated state pushed into the authority", self.id);
            return Err(InventoryError::ReplicaOnly);
        }
        Ok(())
    }
}
