//! Integration tests across the shared model, the authoritative server and
//! the client replicas.

use bincode::{deserialize, serialize};
use client::game::ClientGameState;
use server::game::GameState;
use server::network::Server;
use server::replication::ReplicationGate;
use shared::{
    AddOutcome, ClientRequest, InputState, Inventory, InventoryId, ItemCatalog, ItemClassId,
    Packet, ReplicationUpdate, MAX_PACKET_SIZE, PROTOCOL_VERSION,
};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

fn input(sequence: u32, interact: bool) -> InputState {
    InputState {
        sequence,
        timestamp: sequence as u64,
        interact,
        ..InputState::default()
    }
}

/// Pushes one gate pass for `observer` into the client replica
fn sync(gate: &mut ReplicationGate, world: &GameState, observer: u32, replica: &mut ClientGameState) {
    let updates = gate.replicate(observer, &world.replication_scope(observer));
    let tick = replica.tick + 1;
    replica.apply_replication(tick, 0, updates);
}

fn snapshot(inventory: &Inventory) -> Vec<(ItemClassId, u32)> {
    inventory
        .items()
        .iter()
        .map(|item| (item.class().clone(), item.quantity()))
        .collect()
}

/// AUTHORITY TO REPLICA
mod replication_tests {
    use super::*;

    #[test]
    fn replica_converges_through_edits() {
        let catalog = ItemCatalog::with_defaults();
        let wood = catalog.get(&ItemClassId::new("wood")).unwrap().clone();
        let apple = catalog.get(&ItemClassId::new("apple")).unwrap().clone();

        let mut world = GameState::default();
        world.add_player(1);
        let mut gate = ReplicationGate::new();
        let mut replica = ClientGameState::new();
        replica.client_id = Some(1);

        let inventory = world.characters.get_mut(&1).unwrap().inventory_mut();
        inventory.try_add_item_from_class(&wood, 7).unwrap();
        inventory.try_add_item_from_class(&apple, 3).unwrap();
        sync(&mut gate, &world, 1, &mut replica);

        let authority = world.characters[&1].inventory();
        assert_eq!(snapshot(replica.inventory().unwrap()), snapshot(authority));

        // Partial consume, then remove a whole slot
        let inventory = world.characters.get_mut(&1).unwrap().inventory_mut();
        let wood_id = inventory.items()[0].id();
        let apple_id = inventory.items()[1].id();
        inventory.consume_item(wood_id, 2).unwrap();
        inventory.remove_item(apple_id).unwrap();
        sync(&mut gate, &world, 1, &mut replica);

        let authority = world.characters[&1].inventory();
        let mirrored = replica.inventory().unwrap();
        assert_eq!(snapshot(mirrored), snapshot(authority));
        assert_eq!(mirrored.replication_key(), authority.replication_key());
        assert!((mirrored.current_weight() - authority.current_weight()).abs() < 1e-4);

        // Nothing changed: the gate stays quiet apart from character states
        let updates = gate.replicate(1, &world.replication_scope(1));
        assert!(updates
            .iter()
            .all(|update| matches!(update, ReplicationUpdate::Character(_))));
    }

    #[test]
    fn resync_restores_slot_order_after_lost_item() {
        let catalog = ItemCatalog::with_defaults();
        let wood = catalog.get(&ItemClassId::new("wood")).unwrap().clone();
        let stone = catalog.get(&ItemClassId::new("stone")).unwrap().clone();

        let mut world = GameState::default();
        world.add_player(1);
        let mut gate = ReplicationGate::new();
        let mut replica = ClientGameState::new();
        replica.client_id = Some(1);

        // The wood item update never arrives
        let inventory = world.characters.get_mut(&1).unwrap().inventory_mut();
        inventory.try_add_item_from_class(&wood, 2).unwrap();
        let updates: Vec<ReplicationUpdate> = gate
            .replicate(1, &world.replication_scope(1))
            .into_iter()
            .filter(|update| !matches!(update, ReplicationUpdate::InventoryItem { .. }))
            .collect();
        replica.apply_replication(1, 0, updates);

        let inventory = world.characters.get_mut(&1).unwrap().inventory_mut();
        inventory.try_add_item_from_class(&stone, 1).unwrap();
        sync(&mut gate, &world, 1, &mut replica);
        assert_eq!(replica.inventory().unwrap().len(), 1);

        gate.reset_observer(1);
        sync(&mut gate, &world, 1, &mut replica);

        let authority = world.characters[&1].inventory();
        let mirrored = replica.inventory().unwrap();
        assert_eq!(snapshot(mirrored), snapshot(authority));
        assert_eq!(mirrored.items()[0].class().as_str(), "wood");
    }

    #[test]
    fn replica_rejects_local_mutation() {
        let mut world = GameState::default();
        world.add_player(1);
        let mut gate = ReplicationGate::new();
        let mut replica = ClientGameState::new();
        replica.client_id = Some(1);
        sync(&mut gate, &world, 1, &mut replica);

        let header = replica.inventory().unwrap().header();
        let mut local = Inventory::replica(&header);
        let wood = ItemCatalog::with_defaults()
            .get(&ItemClassId::new("wood"))
            .unwrap()
            .clone();

        assert!(local.try_add_item_from_class(&wood, 1).is_err());
        assert!(local.is_empty());
    }

    #[test]
    fn other_players_inventory_not_replicated() {
        let mut world = GameState::default();
        world.add_player(1);
        world.add_player(2);
        let mut gate = ReplicationGate::new();
        let mut replica = ClientGameState::new();
        replica.client_id = Some(1);

        let updates = gate.replicate(1, &world.replication_scope(1));

        let inventories: Vec<InventoryId> = updates
            .iter()
            .filter_map(|update| match update {
                ReplicationUpdate::InventoryHeader(header) => Some(header.inventory),
                _ => None,
            })
            .collect();
        assert_eq!(inventories, vec![InventoryId(1)]);
        replica.apply_replication(1, 0, updates);
        assert_eq!(replica.characters().count(), 2);
    }
}

/// PICKUPS END TO END
mod pickup_tests {
    use super::*;

    #[test]
    fn hold_interact_takes_pickup_and_replicates() {
        let mut world = GameState::default();
        world.add_player(1);
        let (x, y) = {
            let character = &world.characters[&1];
            (character.x, character.y)
        };
        let wood = world.catalog().get(&ItemClassId::new("wood")).unwrap().clone();
        let pickup = world.spawn_pickup(&wood, 6, x + 20.0, y).unwrap();

        let mut gate = ReplicationGate::new();
        let mut replica = ClientGameState::new();
        replica.client_id = Some(1);
        sync(&mut gate, &world, 1, &mut replica);
        assert!(replica.pickup(pickup).is_some());

        world.apply_input(1, &input(1, true), 0.0);
        world.update(0.3);
        sync(&mut gate, &world, 1, &mut replica);
        let character = replica.character().unwrap();
        assert_eq!(character.viewed, Some(pickup));
        assert!(character.interacting);
        assert!(replica.inventory().unwrap().is_empty());

        world.update(0.3);
        sync(&mut gate, &world, 1, &mut replica);

        assert!(replica.pickup(pickup).is_none());
        let inventory = replica.inventory().unwrap();
        assert_eq!(inventory.items()[0].class().as_str(), "wood");
        assert_eq!(inventory.items()[0].quantity(), 6);
    }

    #[test]
    fn weight_limited_take_leaves_remainder() {
        let mut world = GameState::default();
        world.add_player(1);
        let (x, y) = {
            let character = world.characters.get_mut(&1).unwrap();
            character.inventory_mut().set_weight_capacity(4.0).unwrap();
            (character.x, character.y)
        };
        let stone = world.catalog().get(&ItemClassId::new("stone")).unwrap().clone();
        let pickup = world.spawn_pickup(&stone, 3, x, y + 10.0).unwrap();

        world.apply_input(1, &input(1, true), 0.0);
        world.update(1.0);

        let inventory = world.characters[&1].inventory();
        assert_eq!(inventory.items()[0].quantity(), 2);
        let remaining = world.pickups.get(&pickup).unwrap();
        assert_eq!(remaining.item().unwrap().quantity(), 1);
        assert!(!remaining.is_pending_destroy());
    }

    #[test]
    fn drop_then_take_back() {
        let mut world = GameState::default();
        world.add_player(1);
        let apple = world.catalog().get(&ItemClassId::new("apple")).unwrap().clone();
        let inventory = world.characters.get_mut(&1).unwrap().inventory_mut();
        let added = inventory.try_add_item_from_class(&apple, 4).unwrap();
        assert_eq!(added.outcome, AddOutcome::All);
        let item = inventory.items()[0].id();

        world
            .apply_request(1, ClientRequest::DropItem { item, quantity: 4 })
            .unwrap();
        assert!(world.characters[&1].inventory().is_empty());
        assert_eq!(world.pickups.len(), 1);

        world.apply_input(1, &input(1, true), 0.0);
        world.update(1.0);

        assert!(world.pickups.is_empty());
        assert_eq!(world.characters[&1].inventory().items()[0].quantity(), 4);
    }
}

/// SERVER OVER UDP
mod network_tests {
    use super::*;

    async fn recv_packet(socket: &UdpSocket) -> Packet {
        let mut buffer = vec![0u8; MAX_PACKET_SIZE];
        let (len, _) = socket.recv_from(&mut buffer).await.unwrap();
        deserialize(&buffer[..len]).unwrap()
    }

    async fn send(socket: &UdpSocket, packet: &Packet, addr: std::net::SocketAddr) {
        socket.send_to(&serialize(packet).unwrap(), addr).await.unwrap();
    }

    #[tokio::test]
    async fn connect_and_receive_replication() {
        let mut server = Server::new("127.0.0.1:0", Duration::from_millis(10), 4, GameState::default())
            .await
            .unwrap()
            .with_resync_interval(50);
        let addr = server.local_addr().unwrap();

        let client = async move {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            send(
                &socket,
                &Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                addr,
            )
            .await;

            let client_id = loop {
                if let Packet::Connected { client_id } = recv_packet(&socket).await {
                    break client_id;
                }
            };

            let mut replica = ClientGameState::new();
            replica.client_id = Some(client_id);
            while replica.inventory().is_none() || replica.character().is_none() {
                if let Packet::Replication {
                    tick,
                    last_processed_input,
                    updates,
                } = recv_packet(&socket).await
                {
                    replica.apply_replication(tick, last_processed_input, updates);
                }
            }

            send(&socket, &Packet::Disconnect, addr).await;
            replica
        };

        let replica = tokio::select! {
            result = server.run() => panic!("server stopped early: {:?}", result.err()),
            replica = timeout(Duration::from_secs(5), client) => replica.unwrap(),
        };

        assert_eq!(replica.inventory().unwrap().capacity(), 20);
        assert!(replica.tick > 0);
    }

    #[tokio::test]
    async fn protocol_mismatch_rejected() {
        let mut server = Server::new("127.0.0.1:0", Duration::from_millis(10), 4, GameState::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let client = async move {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            send(
                &socket,
                &Packet::Connect {
                    client_version: PROTOCOL_VERSION + 1,
                },
                addr,
            )
            .await;
            recv_packet(&socket).await
        };

        let reply = tokio::select! {
            result = server.run() => panic!("server stopped early: {:?}", result.err()),
            reply = timeout(Duration::from_secs(5), client) => reply.unwrap(),
        };

        assert!(matches!(reply, Packet::Disconnected { .. }));
        assert_eq!(server.game_state().characters.len(), 0);
    }
}
