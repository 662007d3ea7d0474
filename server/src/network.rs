//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::game::GameState;
use crate::replication::ReplicationGate;
use bincode::{deserialize, serialize, serialized_size};
use log::{debug, error, info, warn};
use shared::{ClientRequest, InputState, Packet, ReplicationUpdate, MAX_PACKET_SIZE};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    BroadcastPacket { packet: Packet, exclude: Option<u32> },
}

/// Main server coordinating networking, the authoritative world and
/// replication
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    gate: ReplicationGate,
    pending_requests: Vec<(u32, ClientRequest)>,
    tick_duration: Duration,
    resync_interval: u32,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        game_state: GameState,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game_state,
            gate: ReplicationGate::new(),
            pending_requests: Vec::new(),
            tick_duration,
            resync_interval: 0,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    /// Resends full state to each client every `ticks` ticks. Zero disables
    /// the periodic resync.
    pub fn with_resync_interval(mut self, ticks: u32) -> Self {
        self.resync_interval = ticks;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender that can stop the main loop with [`ServerMessage::Shutdown`]
    pub fn control_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    async fn find_client(&self, addr: SocketAddr) -> Option<u32> {
        let clients = self.clients.read().await;
        clients.find_client_by_addr(addr)
    }

    async fn disconnect_client(&mut self, client_id: u32) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id);
        }
        self.drop_client_state(client_id);
    }

    fn drop_client_state(&mut self, client_id: u32) {
        self.gate.remove_observer(client_id);
        self.game_state.remove_player(&client_id);
        self.pending_requests.retain(|(id, _)| *id != client_id);
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != shared::PROTOCOL_VERSION {
                    warn!(
                        "Rejecting {}: protocol version {} != {}",
                        addr,
                        client_version,
                        shared::PROTOCOL_VERSION
                    );
                    let response = Packet::Disconnected {
                        reason: "Protocol version mismatch".to_string(),
                    };
                    self.send_packet(response, addr);
                    return;
                }

                // Remove existing connection if present
                if let Some(existing_id) = self.find_client(addr).await {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.disconnect_client(existing_id).await;
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                if let Some(client_id) = client_id {
                    self.game_state.add_player(client_id);
                    self.gate.add_observer(client_id);
                    self.send_packet(Packet::Connected { client_id }, addr);
                } else {
                    let response = Packet::Disconnected {
                        reason: "Server full".to_string(),
                    };
                    self.send_packet(response, addr);
                }
            }

            Packet::Input {
                sequence,
                timestamp,
                left,
                right,
                up,
                down,
                interact,
            } => {
                if let Some(client_id) = self.find_client(addr).await {
                    let input = InputState {
                        sequence,
                        timestamp,
                        left,
                        right,
                        up,
                        down,
                        interact,
                    };

                    let mut clients = self.clients.write().await;
                    clients.add_input(client_id, input);
                }
            }

            Packet::Request(request) => {
                if let Some(client_id) = self.find_client(addr).await {
                    self.clients.write().await.touch(client_id);
                    self.pending_requests.push((client_id, request));
                } else {
                    warn!("Request from unknown address {}", addr);
                }
            }

            Packet::Disconnect => {
                if let Some(client_id) = self.find_client(addr).await {
                    self.disconnect_client(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Applies queued inputs in timestamp order. Each client's movement for
    /// the tick is split evenly across the inputs it sent.
    async fn process_inputs(&mut self, dt: f32) {
        let all_inputs = {
            let clients = self.clients.read().await;
            clients.get_chronological_inputs()
        };

        let mut per_client: HashMap<u32, u32> = HashMap::new();
        for (client_id, _) in &all_inputs {
            *per_client.entry(*client_id).or_default() += 1;
        }

        let mut clients = self.clients.write().await;
        for (client_id, input) in &all_inputs {
            let share = dt / per_client[client_id] as f32;
            self.game_state.apply_input(*client_id, input, share);
            clients.mark_input_processed(*client_id, input.sequence);
        }
        clients.cleanup_processed_inputs();
    }

    fn process_requests(&mut self) {
        for (client_id, request) in std::mem::take(&mut self.pending_requests) {
            debug!("Client {} requested {:?}", client_id, request);
            if let Err(e) = self.game_state.apply_request(client_id, request) {
                warn!("Request from client {} rejected: {}", client_id, e);
            }
        }
    }

    /// Runs the replication gate for every client and queues the resulting
    /// packets
    async fn replicate_to_clients(&mut self) {
        let (client_addrs, last_processed) = {
            let clients = self.clients.read().await;
            (clients.get_client_addrs(), clients.get_last_processed_inputs())
        };

        let tick = self.game_state.tick;
        for (client_id, addr) in client_addrs {
            if self.resync_interval > 0
                && tick.wrapping_add(client_id) % self.resync_interval == 0
            {
                debug!("Full resync for client {}", client_id);
                self.gate.reset_observer(client_id);
            }

            let scope = self.game_state.replication_scope(client_id);
            let updates = self.gate.replicate(client_id, &scope);
            let last = last_processed.get(&client_id).copied().unwrap_or(0);

            for packet in split_replication(tick, last, updates) {
                self.send_packet(packet, addr);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.drop_client_state(client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            self.broadcast_packet(
                                Packet::Disconnected { reason: "Server shutting down".to_string() },
                                None,
                            );
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.process_inputs(dt).await;
                    self.process_requests();
                    self.game_state.update(dt);
                    self.game_state.tick = self.game_state.tick.wrapping_add(1);
                    self.replicate_to_clients().await;

                    // Periodic monitoring
                    if self.game_state.tick % 300 == 0 {
                        let client_count = self.clients.read().await.len();
                        if client_count > 0 {
                            debug!("Tick {}: {} clients, {} pickups, {:.1}Hz",
                                   self.game_state.tick, client_count,
                                   self.game_state.pickups.len(), 1.0 / dt);
                        }
                    }
                },
            }
        }

        // Give the sender task a moment to flush the goodbye packets
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }
}

/// Packs updates into as few `Replication` packets as fit in a datagram.
/// Always yields at least one packet so the client hears about the tick.
pub fn split_replication(
    tick: u32,
    last_processed_input: u32,
    updates: Vec<ReplicationUpdate>,
) -> Vec<Packet> {
    // Packet tag, tick, sequence and vector length
    const ENVELOPE: u64 = 4 + 4 + 4 + 8;
    let budget = MAX_PACKET_SIZE as u64 - ENVELOPE;

    let mut packets = Vec::new();
    let mut batch = Vec::new();
    let mut batch_size = 0u64;

    for update in updates {
        let size = match serialized_size(&update) {
            Ok(size) => size,
            Err(e) => {
                error!("Dropping update that cannot be encoded: {}", e);
                continue;
            }
        };
        if size > budget {
            error!("Dropping {} byte update larger than a datagram", size);
            continue;
        }
        if batch_size + size > budget && !batch.is_empty() {
            packets.push(Packet::Replication {
                tick,
                last_processed_input,
                updates: std::mem::take(&mut batch),
            });
            batch_size = 0;
        }
        batch_size += size;
        batch.push(update);
    }

    if !batch.is_empty() || packets.is_empty() {
        packets.push(Packet::Replication {
            tick,
            last_processed_input,
            updates: batch,
        });
    }
    packets
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{
        InventoryId, ItemCatalog, ItemDef, ItemId, ItemState, ReplicationKey,
        MAX_ITEM_DESCRIPTION_LEN, MAX_ITEM_NAME_LEN,
    };
    use std::net::{IpAddr, Ipv4Addr};

    fn item_update(id: u64, description_len: usize) -> ReplicationUpdate {
        let mut def = ItemDef::new("wood", "Wood");
        def.description = "x".repeat(description_len);
        ReplicationUpdate::InventoryItem {
            inventory: InventoryId(1),
            item: ItemState {
                id: ItemId(id),
                def,
                quantity: 1,
                key: ReplicationKey(1),
            },
        }
    }

    #[test]
    fn test_server_message_creation() {
        let packet = Packet::Connect { client_version: 1 };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let msg = ServerMessage::PacketReceived {
            packet: packet.clone(),
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Connect { client_version } => {
                        assert_eq!(client_version, 1);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        assert!(tx.send(ServerMessage::ClientTimeout { client_id: 42 }).is_ok());

        match rx.try_recv() {
            Ok(ServerMessage::ClientTimeout { client_id }) => assert_eq!(client_id, 42),
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_split_empty_still_sends_tick() {
        let packets = split_replication(7, 3, Vec::new());

        match packets.as_slice() {
            [Packet::Replication {
                tick,
                last_processed_input,
                updates,
            }] => {
                assert_eq!(*tick, 7);
                assert_eq!(*last_processed_input, 3);
                assert!(updates.is_empty());
            }
            _ => panic!("Unexpected packets: {:?}", packets),
        }
    }

    #[test]
    fn test_split_large_batches() {
        let updates: Vec<_> = (0..20).map(|id| item_update(id, 2000)).collect();

        let packets = split_replication(1, 0, updates);

        assert!(packets.len() > 1);
        let mut total = 0;
        for packet in &packets {
            assert!(serialize(packet).unwrap().len() <= MAX_PACKET_SIZE);
            if let Packet::Replication { updates, .. } = packet {
                total += updates.len();
            }
        }
        assert_eq!(total, 20);
    }

    #[test]
    fn test_largest_registrable_item_is_never_dropped() {
        let mut def = ItemDef::new("c".repeat(MAX_ITEM_NAME_LEN), "n".repeat(MAX_ITEM_NAME_LEN));
        def.description = "d".repeat(MAX_ITEM_DESCRIPTION_LEN);
        let mut catalog = ItemCatalog::new();
        tokio_test::assert_ok!(catalog.register(def.clone()));

        let update = ReplicationUpdate::InventoryItem {
            inventory: InventoryId(1),
            item: ItemState {
                id: ItemId(1),
                def,
                quantity: 1,
                key: ReplicationKey(1),
            },
        };
        let packets = split_replication(1, 0, vec![update.clone()]);

        assert_eq!(packets.len(), 1);
        match &packets[0] {
            Packet::Replication { updates, .. } => assert_eq!(updates, &vec![update]),
            other => panic!("Unexpected packet: {:?}", other),
        }
        assert!(serialize(&packets[0]).unwrap().len() <= MAX_PACKET_SIZE);
    }

    #[test]
    fn test_split_keeps_order() {
        let updates: Vec<_> = (0..3).map(|id| item_update(id, 10)).collect();

        let packets = split_replication(1, 0, updates.clone());

        assert_eq!(
            packets,
            vec![Packet::Replication {
                tick: 1,
                last_processed_input: 0,
                updates,
            }]
        );
    }

    #[tokio::test]
    async fn test_server_binds_ephemeral_port() {
        let server = tokio_test::assert_ok!(
            Server::new(
                "127.0.0.1:0",
                Duration::from_millis(16),
                4,
                GameState::default(),
            )
            .await
        );

        let addr = tokio_test::assert_ok!(server.local_addr());
        assert_ne!(addr.port(), 0);
        assert_eq!(server.game_state().tick, 0);
    }
}
