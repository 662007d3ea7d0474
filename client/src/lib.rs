//! # Inventory Client Library
//!
//! A headless, console driven client for the inventory server. The client
//! never owns game state: every inventory, pickup and character it knows
//! about is a replica built from the server's `Replication` packets.
//!
//! ## Modules
//!
//! ### Game Module (`game`)
//! [`game::ClientGameState`] applies replication updates to replica
//! inventories and pickups and formats them for the console, including the
//! JSON dump used by `inv --json`.
//!
//! ### Input Module (`input`)
//! Parses console commands and turns the held movement/interact state into
//! sequenced [`shared::InputState`]s.
//!
//! ### Network Module (`network`)
//! Owns the UDP socket and the main loop multiplexing server packets, stdin
//! lines and the input interval.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:8080", "player".to_string()).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! Taking a pickup is "hold to interact": `take` presses the interact button,
//! the server counts down the pickup's interaction time and moves the items
//! once it fires. `release` before that cancels the countdown.

pub mod game;
pub mod input;
pub mod network;
