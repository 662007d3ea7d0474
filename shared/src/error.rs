use crate::item::{ItemClassId, ItemId};
use thiserror::Error;

/// Errors raised by inventory operations.
///
/// Capacity and weight limits are not errors; they are reported through
/// [`crate::inventory::ItemAddResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// A mutating operation was issued on a replica
    #[error("{operation} requires authority")]
    NotAuthorized { operation: &'static str },

    /// The referenced item is not in this inventory
    #[error("item {0:?} is not in this inventory")]
    UnknownItem(ItemId),

    /// Replicated state was pushed into the authoritative copy
    #[error("replicated state can only be applied to a replica")]
    ReplicaOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PickupError {
    #[error("{operation} requires authority")]
    NotAuthorized { operation: &'static str },

    /// The pickup holds no item (never initialized, or already taken)
    #[error("pickup holds no item")]
    Empty,

    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read item catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse item catalog: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("item class '{0}' already registered")]
    DuplicateClass(ItemClassId),

    #[error("invalid definition for '{class}': {reason}")]
    InvalidDefinition { class: ItemClassId, reason: String },

    #[error("unknown item class '{0}'")]
    UnknownClass(ItemClassId),
}
