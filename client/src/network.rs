use crate::game::ClientGameState;
use crate::input::{Command, InputManager, HELP};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{
    ClientRequest, InputState, ItemId, Packet, PickupId, MAX_PACKET_SIZE, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::interval;

const CONNECT_RETRY: Duration = Duration::from_secs(1);

/// Headless console client. Holds replicas only and forwards every
/// mutation to the server.
pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    name: String,
    connected: bool,
    last_connect_attempt: Option<Instant>,

    game_state: ClientGameState,
    input_manager: InputManager,

    // What was last printed, to only report changes
    last_focus: Option<(PickupId, bool)>,
    last_inventory: Vec<(ItemId, u32)>,
}

impl Client {
    pub async fn new(server_addr: &str, name: String) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            name,
            connected: false,
            last_connect_attempt: None,
            game_state: ClientGameState::new(),
            input_manager: InputManager::new(),
            last_focus: None,
            last_inventory: Vec::new(),
        })
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("{} connecting to {}...", self.name, self.server_addr);
        self.last_connect_attempt = Some(Instant::now());

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    pub fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                self.game_state = ClientGameState::new();
                self.game_state.client_id = Some(client_id);
                self.connected = true;
            }

            Packet::Replication {
                tick,
                last_processed_input,
                updates,
            } => {
                if !self.connected {
                    return;
                }
                debug!("Tick {}: {} updates", tick, updates.len());
                self.game_state
                    .apply_replication(tick, last_processed_input, updates);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                println!("Disconnected by server: {}", reason);
                self.connected = false;
                self.game_state.client_id = None;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    async fn send_input(&mut self, input: InputState) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected {
            return Ok(());
        }

        let packet = Packet::Input {
            sequence: input.sequence,
            timestamp: input.timestamp,
            left: input.left,
            right: input.right,
            up: input.up,
            down: input.down,
            interact: input.interact,
        };
        self.send_packet(&packet).await
    }

    async fn send_request(&self, request: ClientRequest) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected {
            println!("Not connected yet");
            return Ok(());
        }
        self.send_packet(&Packet::Request(request)).await
    }

    /// Runs one console command. Returns false when the client should quit.
    async fn handle_command(&mut self, command: Command) -> Result<bool, Box<dyn std::error::Error>> {
        match command {
            Command::Inventory { json: true } => {
                println!("{}", serde_json::to_string_pretty(&self.game_state.inventory_json())?);
            }
            Command::Inventory { json: false } => println!("{}", self.game_state.describe_inventory()),
            Command::Pickups => println!("{}", self.game_state.describe_pickups()),
            Command::Status => match self.game_state.interaction_status() {
                Some(status) => println!("{}", status),
                None => println!("Nothing in reach"),
            },
            Command::Take => self.input_manager.set_interact(true),
            Command::Release => self.input_manager.set_interact(false),
            Command::Move(direction) => self.input_manager.set_movement(Some(direction)),
            Command::Stop => self.input_manager.set_movement(None),
            Command::Use { item } => match self.game_state.resolve_item(&item) {
                Some(item) => self.send_request(ClientRequest::UseItem { item }).await?,
                None => println!("No item '{}' in your inventory", item),
            },
            Command::Drop { item, quantity } => match self.game_state.resolve_item(&item) {
                Some(item) => {
                    self.send_request(ClientRequest::DropItem { item, quantity })
                        .await?
                }
                None => println!("No item '{}' in your inventory", item),
            },
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Prints interaction and inventory changes since the last call
    fn report_changes(&mut self) {
        let focus = self
            .game_state
            .character()
            .and_then(|character| character.viewed.map(|id| (id, character.interacting)));
        if focus != self.last_focus {
            match self.game_state.interaction_status() {
                Some(line) => println!("{}", line),
                None if self.last_focus.is_some() => println!("Nothing in reach"),
                None => {}
            }
            self.last_focus = focus;
        }

        let inventory: Vec<(ItemId, u32)> = self
            .game_state
            .inventory()
            .map(|inventory| {
                inventory
                    .items()
                    .iter()
                    .map(|item| (item.id(), item.quantity()))
                    .collect()
            })
            .unwrap_or_default();
        if inventory != self.last_inventory {
            println!("{}", self.game_state.describe_inventory());
            self.last_inventory = inventory;
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;
        println!("Type 'help' for commands");

        let mut input_interval = interval(Duration::from_millis(33));
        let mut report_interval = interval(Duration::from_millis(250));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        let mut buffer = vec![0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                self.handle_packet(packet);
                            } else {
                                warn!("Failed to deserialize packet");
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                line = lines.next_line() => {
                    match line? {
                        Some(line) if line.trim().is_empty() => {}
                        Some(line) => match Command::parse(&line) {
                            Ok(command) => {
                                if !self.handle_command(command).await? {
                                    break;
                                }
                            }
                            Err(e) => println!("{}", e),
                        },
                        // stdin closed
                        None => break,
                    }
                },

                _ = input_interval.tick() => {
                    if !self.connected {
                        let retry = self
                            .last_connect_attempt
                            .map_or(true, |at| at.elapsed() >= CONNECT_RETRY);
                        if retry {
                            self.connect().await?;
                        }
                        continue;
                    }

                    if let Some(input) = self.input_manager.update() {
                        if let Err(e) = self.send_input(input).await {
                            error!("Error sending input: {}", e);
                        }
                    }
                },

                _ = report_interval.tick() => {
                    if self.connected {
                        self.report_changes();
                    }
                },
            }
        }

        if self.connected {
            info!("Disconnecting");
            self.send_packet(&Packet::Disconnect).await?;
        }
        Ok(())
    }
}
