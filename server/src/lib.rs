//! # Inventory Server Library
//!
//! The authoritative side of the inventory and pickup game. Every inventory,
//! item and pickup lives here with the [`shared::NetRole::Authority`] role;
//! clients only ever hold replicas.
//!
//! ## Tick
//!
//! Each server tick runs in a fixed order:
//!
//! 1. queued inputs are applied in client timestamp order (movement and the
//!    interact button)
//! 2. queued requests (use item, drop item) are applied
//! 3. interaction timers advance and finished interactions take pickups
//! 4. the [`replication::ReplicationGate`] diffs the world per client and the
//!    resulting updates are sent as one or more `Replication` packets
//!
//! ## Modules
//!
//! - [`character`]: a connected player, their inventory and interaction state
//! - [`client_manager`]: connected clients and their queued inputs
//! - [`config`]: command line arguments and the TOML world file
//! - [`game`]: the authoritative world
//! - [`network`]: UDP tasks and the main loop
//! - [`replication`]: per-client key diffing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game::GameState;
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(33),
//!         16,
//!         GameState::default(),
//!     )
//!     .await?
//!     .with_resync_interval(150);
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod character;
pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
pub mod replication;
