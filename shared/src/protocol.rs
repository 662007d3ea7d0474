use crate::item::ItemId;
use crate::replication::ReplicationUpdate;
use serde::{Deserialize, Serialize};

/// A mutation a replica asks the authority to perform on its own character.
/// The effect is observed through replication, never returned directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientRequest {
    UseItem { item: ItemId },
    DropItem { item: ItemId, quantity: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Input {
        sequence: u32,
        timestamp: u64,
        left: bool,
        right: bool,
        up: bool,
        down: bool,
        /// Interact input is held down
        interact: bool,
    },
    Request(ClientRequest),
    Disconnect,

    Connected {
        client_id: u32,
    },
    Replication {
        tick: u32,
        /// Last input sequence processed for the receiving client
        last_processed_input: u32,
        updates: Vec<ReplicationUpdate>,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
    pub sequence: u32,
    pub timestamp: u64,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub interact: bool,
}

impl InputState {
    /// Unit movement direction, not normalized for diagonals
    pub fn direction(&self) -> (f32, f32) {
        let mut dx = 0.0;
        let mut dy = 0.0;
        if self.left {
            dx -= 1.0;
        }
        if self.right {
            dx += 1.0;
        }
        if self.up {
            dy -= 1.0;
        }
        if self.down {
            dy += 1.0;
        }
        (dx, dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InventoryId;
    use crate::item::ItemDef;
    use crate::replication::{ItemState, ReplicationKey};

    #[test]
    fn test_packet_serialization_input() {
        let packet = Packet::Input {
            sequence: 123,
            timestamp: 456789,
            left: true,
            right: false,
            up: false,
            down: true,
            interact: true,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Input {
                sequence,
                left,
                down,
                interact,
                ..
            } => {
                assert_eq!(sequence, 123);
                assert!(left);
                assert!(down);
                assert!(interact);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_replication() {
        let item = ItemState {
            id: ItemId(8),
            def: ItemDef::new("apple", "Apple").with_max_stack(5),
            quantity: 3,
            key: ReplicationKey(2),
        };
        let packet = Packet::Replication {
            tick: 42,
            last_processed_input: 7,
            updates: vec![ReplicationUpdate::InventoryItem {
                inventory: InventoryId(1),
                item: item.clone(),
            }],
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Replication { tick, updates, .. } => {
                assert_eq!(tick, 42);
                assert_eq!(
                    updates,
                    vec![ReplicationUpdate::InventoryItem {
                        inventory: InventoryId(1),
                        item,
                    }]
                );
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_request() {
        let packet = Packet::Request(ClientRequest::DropItem {
            item: ItemId(3),
            quantity: 2,
        });

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        assert_eq!(deserialized, packet);
    }

    #[test]
    fn test_input_direction() {
        let input = InputState {
            sequence: 1,
            timestamp: 0,
            left: true,
            right: false,
            up: true,
            down: true,
            interact: false,
        };

        assert_eq!(input.direction(), (-1.0, 0.0));
    }
}
