//! Connected clients and their queued inputs.
//!
//! Clients are identified by their UDP address. Every packet refreshes the
//! client's activity timestamp; clients that stay silent longer than the
//! timeout are dropped by the server's timeout task.

use log::{debug, info};
use shared::InputState;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Inputs buffered beyond this are dropped oldest first
const MAX_PENDING_INPUTS: usize = 128;

/// A connected client and the inputs it has sent but the world has not
/// applied yet
#[derive(Debug)]
pub struct Client {
    /// Assigned by the server, doubles as the player character id
    pub id: u32,
    /// Where replication packets for this client go
    pub addr: SocketAddr,
    /// Last time any packet arrived from this client
    pub last_seen: Instant,
    /// Highest input sequence applied to the world
    pub last_processed_input: u32,
    /// Sorted by sequence, never holds a sequence twice
    pub pending_inputs: Vec<InputState>,
}

impl Client {
    /// Creates a client that counts as active from now on, with nothing
    /// processed and an empty input queue
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_processed_input: 0,
            pending_inputs: Vec::new(),
        }
    }

    /// Queues an input in sequence order
    ///
    /// Refreshes the activity timestamp either way. Inputs at or below the
    /// last processed sequence and duplicates are ignored. Returns whether
    /// the input was queued.
    pub fn add_input(&mut self, input: InputState) -> bool {
        self.last_seen = Instant::now();

        if input.sequence <= self.last_processed_input {
            return false;
        }
        match self
            .pending_inputs
            .binary_search_by_key(&input.sequence, |i| i.sequence)
        {
            Ok(_) => false,
            Err(pos) => {
                self.pending_inputs.insert(pos, input);
                if self.pending_inputs.len() > MAX_PENDING_INPUTS {
                    debug!("Client {} input queue full, dropping oldest", self.id);
                    self.pending_inputs.remove(0);
                }
                true
            }
        }
    }

    /// True when nothing arrived from this client within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Client roster with a fixed capacity
///
/// Hands out client ids, finds clients by address and merges the input
/// queues of all clients into one order the world can apply.
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    /// Creates an empty roster accepting up to `max_clients` clients
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    /// Overrides the silence limit used by `check_timeouts`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Registers a client, `None` when the server is full
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            info!("Rejecting {}: server full ({} clients)", addr, self.max_clients);
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));
        Some(client_id)
    }

    /// Drops the client and its queued inputs, false if it was not connected
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        match self.clients.remove(client_id) {
            Some(client) => {
                info!("Client {} disconnected", client.id);
                true
            }
            None => false,
        }
    }

    /// Looks up the client id that belongs to a UDP source address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.id)
    }

    /// Marks the client as alive without queuing anything
    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    /// Queues an input for a client, false for unknown clients or
    /// inputs the client already had
    pub fn add_input(&mut self, client_id: u32, input: InputState) -> bool {
        self.clients
            .get_mut(&client_id)
            .map(|client| client.add_input(input))
            .unwrap_or(false)
    }

    /// Unprocessed inputs of every client, ordered by client timestamp
    ///
    /// Ties are broken by client id and then by sequence.
    pub fn get_chronological_inputs(&self) -> Vec<(u32, InputState)> {
        let mut all_inputs: Vec<(u32, InputState)> = self
            .clients
            .values()
            .flat_map(|client| {
                client
                    .pending_inputs
                    .iter()
                    .filter(move |input| input.sequence > client.last_processed_input)
                    .map(move |input| (client.id, input.clone()))
            })
            .collect();

        all_inputs.sort_by_key(|(client_id, input)| (input.timestamp, *client_id, input.sequence));
        all_inputs
    }

    /// Records that the world applied `sequence`; never moves backwards
    pub fn mark_input_processed(&mut self, client_id: u32, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_input = client.last_processed_input.max(sequence);
        }
    }

    /// Drops queued inputs the world has already applied
    pub fn cleanup_processed_inputs(&mut self) {
        for client in self.clients.values_mut() {
            let last = client.last_processed_input;
            client.pending_inputs.retain(|input| input.sequence > last);
        }
    }

    /// Last applied sequence per client, echoed back in replication packets
    pub fn get_last_processed_inputs(&self) -> HashMap<u32, u32> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.last_processed_input))
            .collect()
    }

    /// Removes and returns every client silent for longer than the timeout
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timeout = self.timeout;
        let timed_out: Vec<u32> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }
        timed_out
    }

    /// Every client id with the address to send to
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn input(sequence: u32, timestamp: u64) -> InputState {
        InputState {
            sequence,
            timestamp,
            left: false,
            right: true,
            up: false,
            down: false,
            interact: false,
        }
    }

    #[test]
    fn test_inputs_kept_in_sequence_order() {
        let mut client = Client::new(1, addr(8080));

        assert!(client.add_input(input(2, 100)));
        assert!(client.add_input(input(1, 50)));
        assert!(!client.add_input(input(2, 100)));

        let sequences: Vec<u32> = client.pending_inputs.iter().map(|i| i.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn test_stale_input_ignored() {
        let mut manager = ClientManager::new(2);
        let id = manager.add_client(addr(8080)).unwrap();
        manager.add_input(id, input(3, 10));
        manager.mark_input_processed(id, 3);
        manager.cleanup_processed_inputs();

        assert!(!manager.add_input(id, input(2, 5)));
        assert!(manager.get_chronological_inputs().is_empty());
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, addr(8080));
        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);

        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_check_timeouts_removes_silent_clients() {
        let mut manager = ClientManager::new(2).with_timeout(Duration::from_millis(500));
        let quiet = manager.add_client(addr(8080)).unwrap();
        let chatty = manager.add_client(addr(8081)).unwrap();
        if let Some(client) = manager.clients.get_mut(&quiet) {
            client.last_seen = Instant::now() - Duration::from_secs(1);
        }

        assert_eq!(manager.check_timeouts(), vec![quiet]);
        assert_eq!(manager.find_client_by_addr(addr(8081)), Some(chatty));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_touch_refreshes_activity() {
        let mut manager = ClientManager::new(1).with_timeout(Duration::from_millis(500));
        let id = manager.add_client(addr(8080)).unwrap();
        if let Some(client) = manager.clients.get_mut(&id) {
            client.last_seen = Instant::now() - Duration::from_secs(1);
        }

        manager.touch(id);

        assert!(manager.check_timeouts().is_empty());
    }

    #[test]
    fn test_capacity_and_ids() {
        let mut manager = ClientManager::new(1);

        assert_eq!(manager.add_client(addr(8080)), Some(1));
        assert_eq!(manager.add_client(addr(8081)), None);

        assert!(manager.remove_client(&1));
        assert!(!manager.remove_client(&1));
        assert_eq!(manager.add_client(addr(8081)), Some(2));
    }

    #[test]
    fn test_add_input_to_unknown_client() {
        let mut manager = ClientManager::new(2);

        assert!(!manager.add_input(999, input(1, 100)));
    }

    #[test]
    fn test_chronological_inputs_across_clients() {
        let mut manager = ClientManager::new(3);
        let a = manager.add_client(addr(8080)).unwrap();
        let b = manager.add_client(addr(8081)).unwrap();

        manager.add_input(a, input(1, 100));
        manager.add_input(b, input(1, 50));
        manager.add_input(a, input(2, 200));

        let order: Vec<(u32, u64)> = manager
            .get_chronological_inputs()
            .into_iter()
            .map(|(id, input)| (id, input.timestamp))
            .collect();
        assert_eq!(order, vec![(b, 50), (a, 100), (a, 200)]);
    }

    #[test]
    fn test_timestamp_ties_ordered_by_client_then_sequence() {
        let mut manager = ClientManager::new(3);
        let a = manager.add_client(addr(8080)).unwrap();
        let b = manager.add_client(addr(8081)).unwrap();

        manager.add_input(b, input(1, 70));
        manager.add_input(a, input(2, 70));
        manager.add_input(a, input(1, 70));

        let order: Vec<(u32, u32)> = manager
            .get_chronological_inputs()
            .into_iter()
            .map(|(id, input)| (id, input.sequence))
            .collect();
        assert_eq!(order, vec![(a, 1), (a, 2), (b, 1)]);
    }

    #[test]
    fn test_last_processed_inputs() {
        let mut manager = ClientManager::new(2);
        let id = manager.add_client(addr(8080)).unwrap();
        manager.add_input(id, input(1, 0));
        manager.add_input(id, input(2, 0));

        manager.mark_input_processed(id, 2);
        manager.mark_input_processed(id, 1);
        manager.cleanup_processed_inputs();

        assert_eq!(manager.get_last_processed_inputs().get(&id), Some(&2));
        assert!(manager.clients[&id].pending_inputs.is_empty());
    }
}
