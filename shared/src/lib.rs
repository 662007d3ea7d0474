//! # Shared Inventory Library
//!
//! Types and game rules used by both the authoritative server and the
//! replica clients. Everything in here is pure data and logic; sockets and
//! timing live in the `server` and `client` crates.
//!
//! ## Authority Model
//!
//! Exactly one side owns the truth. Every inventory and pickup carries a
//! [`NetRole`]: the authority may mutate it, a replica may only apply
//! replicated state. Calling a mutating operation on a replica is a
//! programming error and returns [`InventoryError::NotAuthorized`] (or the
//! pickup equivalent) after logging.
//!
//! ## Module Organization
//!
//! ### Items (`item`, `catalog`)
//! Item classes ([`ItemDef`]) are loaded into an [`ItemCatalog`]. Live
//! [`Item`]s carry a quantity that is always clamped to the class stack limit
//! and a replication key that moves whenever a replicated field changes.
//!
//! ### Inventory (`inventory`)
//! Ordered stacks with a slot capacity and a weight budget. Adding reports a
//! structured [`ItemAddResult`] (none, some or all of the request) instead of
//! failing when the inventory is full or too heavy.
//!
//! ### Pickups and Interaction (`pickup`, `interaction`)
//! Pickups are world objects holding one item. Characters focus them through
//! a proximity scan and take them by holding the interact input for the
//! pickup's interaction time.
//!
//! ### Replication (`replication`, `protocol`)
//! Keyed state snapshots and the packet protocol exchanged over UDP.
//!
//! ### Events (`events`)
//! Synchronous observer lists used for UI refresh notifications.

pub mod catalog;
pub mod error;
pub mod events;
pub mod interaction;
pub mod inventory;
pub mod item;
pub mod pickup;
pub mod protocol;
pub mod replication;

pub use catalog::ItemCatalog;
pub use error::{CatalogError, InventoryError, PickupError};
pub use events::{Observers, SubscriptionId};
pub use interaction::{
    FocusCandidate, InteractTimer, Interactable, InteractableSource, InteractionEvent,
    InteractionState,
};
pub use inventory::{AddOutcome, Inventory, InventoryEvent, InventoryId, ItemAddResult};
pub use item::{Item, ItemClassId, ItemDef, ItemId, ItemKind, ItemRarity, ItemUser, UseOutcome};
pub use pickup::{ItemTemplate, Pickup, PickupContents, PickupId, TakeOutcome, TakeResult};
pub use protocol::{ClientRequest, InputState, Packet};
pub use replication::{
    CharacterState, InventoryHeader, ItemState, PickupState, ReplicationKey, ReplicationUpdate,
};

pub const PROTOCOL_VERSION: u32 = 1;

pub const WORLD_WIDTH: f32 = 800.0;
pub const WORLD_HEIGHT: f32 = 600.0;
pub const PLAYER_SPEED: f32 = 150.0;
pub const PLAYER_SIZE: f32 = 32.0;

pub const DEFAULT_INVENTORY_CAPACITY: u32 = 20;
pub const DEFAULT_WEIGHT_CAPACITY: f32 = 60.0;
pub const DEFAULT_MAX_HEALTH: f32 = 100.0;

/// Range of the proximity scan that looks for something to focus
pub const INTERACTION_CHECK_DISTANCE: f32 = 300.0;
pub const PICKUP_INTERACTION_TIME: f32 = 0.5;
pub const PICKUP_INTERACTION_DISTANCE: f32 = 80.0;

/// Upper bound for one datagram; larger replication batches are split
pub const MAX_PACKET_SIZE: usize = 16 * 1024;

/// Longest class id or display name an item class may register with
pub const MAX_ITEM_NAME_LEN: usize = 64;
/// Longest item description; keeps a single item update well inside a datagram
pub const MAX_ITEM_DESCRIPTION_LEN: usize = 1024;

/// Whether this copy of an object may originate changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetRole {
    Authority,
    Replica,
}

/// Lifecycle hooks driven by whoever owns the object (the server game state).
///
/// `init` runs once after construction, `on_authority_gained` when the
/// authoritative side first takes ownership, and `on_destroy` right before
/// the object is dropped.
pub trait Lifecycle {
    fn init(&mut self) {}

    fn on_authority_gained(&mut self) {}

    fn on_destroy(&mut self) {}
}
