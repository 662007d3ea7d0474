//! Items: the replicable, stackable unit of game data.
//!
//! An [`ItemDef`] is the static class data shared by every instance of a
//! class (think of it as the class), and an [`Item`] is one live instance
//! with a quantity and a replication key.

use crate::inventory::InventoryId;
use crate::replication::{ItemState, ReplicationKey};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// Unique id of one item instance, assigned by the authoritative side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl ItemId {
    /// Allocates a new id. Only the authoritative side constructs items.
    pub fn fresh() -> Self {
        ItemId(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Class tag of an item. Two items stack only if their classes match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemClassId(pub String);

impl ItemClassId {
    pub fn new(class: impl Into<String>) -> Self {
        ItemClassId(class.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemClassId {
    fn from(class: &str) -> Self {
        ItemClassId::new(class)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemRarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    VeryRare,
    Legendary,
}

/// What happens when an item of this class is used.
///
/// Externally tagged so the same representation works for TOML catalogs and
/// bincode datagrams.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    Material,
    Food { heal_amount: f32 },
}

/// Static data of an item class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDef {
    pub class: ItemClassId,

    pub display_name: String,

    #[serde(default)]
    pub description: String,

    /// Verb shown by the UI next to the use button
    #[serde(default = "default_use_action_text")]
    pub use_action_text: String,

    #[serde(default)]
    pub rarity: ItemRarity,

    /// Weight of a single unit
    #[serde(default)]
    pub weight: f32,

    #[serde(default = "default_stackable")]
    pub stackable: bool,

    /// Ignored for non-stackable classes, which always hold exactly one
    #[serde(default = "default_max_stack_size")]
    pub max_stack_size: u32,

    #[serde(default)]
    pub kind: ItemKind,
}

fn default_use_action_text() -> String {
    "Use".to_string()
}

fn default_stackable() -> bool {
    true
}

fn default_max_stack_size() -> u32 {
    2
}

impl ItemDef {
    pub fn new(class: impl Into<String>, display_name: impl Into<String>) -> Self {
        ItemDef {
            class: ItemClassId::new(class),
            display_name: display_name.into(),
            description: String::new(),
            use_action_text: default_use_action_text(),
            rarity: ItemRarity::Common,
            weight: 0.0,
            stackable: default_stackable(),
            max_stack_size: default_max_stack_size(),
            kind: ItemKind::Material,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_max_stack(mut self, max_stack_size: u32) -> Self {
        self.stackable = true;
        self.max_stack_size = max_stack_size;
        self
    }

    pub fn non_stackable(mut self) -> Self {
        self.stackable = false;
        self.max_stack_size = 1;
        self
    }

    pub fn with_kind(mut self, kind: ItemKind) -> Self {
        if let ItemKind::Food { .. } = kind {
            self.use_action_text = "Consume".to_string();
        }
        self.kind = kind;
        self
    }

    /// Upper bound for the quantity of one instance
    pub fn max_allowed(&self) -> u32 {
        if self.stackable {
            self.max_stack_size.max(1)
        } else {
            1
        }
    }
}

/// Something an item can be used on
pub trait ItemUser {
    fn heal(&mut self, amount: f32);
}

/// Effect of [`Item::use_on`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UseOutcome {
    /// The item did nothing and should stay in the inventory
    NoEffect,
    /// The item applied its effect and one unit should be consumed
    Consumed,
}

/// One live instance of an item class
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    id: ItemId,
    def: ItemDef,
    quantity: u32,
    rep_key: ReplicationKey,
    owning_inventory: Option<InventoryId>,
}

impl Item {
    /// Creates a new instance with a fresh id. The quantity is clamped to
    /// what the class allows.
    pub fn new(def: ItemDef, quantity: u32) -> Self {
        let mut item = Item {
            id: ItemId::fresh(),
            def,
            quantity: 0,
            rep_key: ReplicationKey::default(),
            owning_inventory: None,
        };
        item.set_quantity(quantity);
        item
    }

    /// Rebuilds an item on a replica from replicated state
    pub fn from_replicated(state: &ItemState, owning_inventory: Option<InventoryId>) -> Self {
        Item {
            id: state.id,
            def: state.def.clone(),
            quantity: state.quantity.min(state.def.max_allowed()),
            rep_key: state.key,
            owning_inventory,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn def(&self) -> &ItemDef {
        &self.def
    }

    pub fn class(&self) -> &ItemClassId {
        &self.def.class
    }

    pub fn display_name(&self) -> &str {
        &self.def.display_name
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn weight(&self) -> f32 {
        self.def.weight
    }

    pub fn is_stackable(&self) -> bool {
        self.def.stackable
    }

    pub fn max_stack_size(&self) -> u32 {
        self.def.max_allowed()
    }

    pub fn replication_key(&self) -> ReplicationKey {
        self.rep_key
    }

    pub fn owning_inventory(&self) -> Option<InventoryId> {
        self.owning_inventory
    }

    pub fn stack_weight(&self) -> f32 {
        self.quantity as f32 * self.def.weight
    }

    /// Sets the quantity, clamped into `[0, max_allowed]`.
    ///
    /// Returns true if the stored quantity changed; only then is the
    /// replication key bumped.
    pub fn set_quantity(&mut self, quantity: u32) -> bool {
        let clamped = quantity.min(self.def.max_allowed());
        if clamped == self.quantity {
            return false;
        }
        self.quantity = clamped;
        self.mark_dirty();
        true
    }

    /// Flags the item as changed so the next replication pass sends it
    pub fn mark_dirty(&mut self) {
        self.rep_key.bump();
    }

    pub fn added_to_inventory(&mut self, inventory: InventoryId) {
        self.owning_inventory = Some(inventory);
    }

    /// Applies the item's effect to `user`
    pub fn use_on(&self, user: &mut dyn ItemUser) -> UseOutcome {
        match self.def.kind {
            ItemKind::Material => UseOutcome::NoEffect,
            ItemKind::Food { heal_amount } => {
                info!("Ate some {}", self.def.display_name);
                user.heal(heal_amount);
                UseOutcome::Consumed
            }
        }
    }

    /// Snapshot of the replicated fields
    pub fn state(&self) -> ItemState {
        ItemState {
            id: self.id,
            def: self.def.clone(),
            quantity: self.quantity,
            key: self.rep_key,
        }
    }

    /// Overwrites the replicated fields with inbound state. Returns true if
    /// anything visible changed.
    pub(crate) fn apply_state(&mut self, state: &ItemState) -> bool {
        let quantity = state.quantity.min(state.def.max_allowed());
        let changed = self.quantity != quantity || self.def != state.def;
        self.def = state.def.clone();
        self.quantity = quantity;
        self.rep_key = state.key;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn wood() -> ItemDef {
        ItemDef::new("wood", "Wood").with_weight(1.5).with_max_stack(10)
    }

    struct Patient {
        health: f32,
    }

    impl ItemUser for Patient {
        fn heal(&mut self, amount: f32) {
            self.health += amount;
        }
    }

    #[test]
    fn test_new_item_clamps_quantity() {
        let item = Item::new(wood(), 25);
        assert_eq!(item.quantity(), 10);

        let axe = Item::new(ItemDef::new("axe", "Axe").non_stackable(), 3);
        assert_eq!(axe.quantity(), 1);
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = Item::new(wood(), 1);
        let b = Item::new(wood(), 1);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_set_quantity_bumps_key_only_on_change() {
        let mut item = Item::new(wood(), 4);
        let key = item.replication_key();

        assert!(!item.set_quantity(4));
        assert_eq!(item.replication_key(), key);

        assert!(item.set_quantity(6));
        assert_eq!(item.quantity(), 6);
        assert_ne!(item.replication_key(), key);
    }

    #[test]
    fn test_set_quantity_clamped_noop_keeps_key() {
        let mut item = Item::new(wood(), 10);
        let key = item.replication_key();

        // 50 clamps to 10, which is the current value
        assert!(!item.set_quantity(50));
        assert_eq!(item.quantity(), 10);
        assert_eq!(item.replication_key(), key);
    }

    #[test]
    fn test_set_quantity_bounds_for_many_inputs() {
        let defs = [wood(), ItemDef::new("axe", "Axe").non_stackable()];
        for def in defs {
            let max = def.max_allowed();
            let mut item = Item::new(def, 0);
            for n in [0, 1, 2, 5, 9, 10, 11, 100, u32::MAX] {
                let previous = item.quantity();
                let key = item.replication_key();
                item.set_quantity(n);
                assert!(item.quantity() <= max);
                assert_eq!(item.replication_key() != key, item.quantity() != previous);
            }
        }
    }

    #[test]
    fn test_stack_weight() {
        let item = Item::new(wood(), 4);
        assert_approx_eq!(item.stack_weight(), 6.0);
    }

    #[test]
    fn test_use_food_heals() {
        let apple = ItemDef::new("apple", "Apple").with_kind(ItemKind::Food { heal_amount: 20.0 });
        assert_eq!(apple.use_action_text, "Consume");

        let item = Item::new(apple, 1);
        let mut patient = Patient { health: 50.0 };

        assert_eq!(item.use_on(&mut patient), UseOutcome::Consumed);
        assert_approx_eq!(patient.health, 70.0);
    }

    #[test]
    fn test_use_material_has_no_effect() {
        let item = Item::new(wood(), 1);
        let mut patient = Patient { health: 50.0 };

        assert_eq!(item.use_on(&mut patient), UseOutcome::NoEffect);
        assert_approx_eq!(patient.health, 50.0);
    }

    #[test]
    fn test_replicated_roundtrip_keeps_identity() {
        let mut item = Item::new(wood(), 3);
        item.added_to_inventory(InventoryId(9));
        let replica = Item::from_replicated(&item.state(), item.owning_inventory());

        assert_eq!(replica, item);
    }
}
