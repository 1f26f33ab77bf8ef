//! # Dungeon Server Library
//!
//! Authoritative server for a multiplayer dungeon crawler. The server owns every
//! floor, player and NPC; clients send intents and proposed positions and receive
//! corrections and per-floor world state.
//!
//! ## Architecture
//!
//! ### Simulation
//! - [`level_gen`] builds dungeon floors (rooms joined by corridors) and the village.
//! - [`floor`] holds one live floor: collision, stairs, NPC chase, treasure.
//! - [`world`] owns all floors, generates them lazily and moves players between them.
//! - [`entity`], [`items`], [`movement`] and [`physics`] are the actor records and
//!   the rules they follow.
//!
//! ### Networking
//! - [`client_manager`] tracks sessions and buffers their inputs.
//! - [`network`] runs the UDP tasks and the single-threaded tick loop. All world
//!   mutation happens on that loop, which serialises packet handling with ticks.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::WorldConfig;
//! use server::network::Server;
//! use server::world::WorldManager;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let world = WorldManager::new(WorldConfig::default(), None)?;
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         world,
//!         Duration::from_millis(16),
//!         32,
//!     )
//!     .await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod entity;
pub mod error;
pub mod floor;
pub mod grid;
pub mod items;
pub mod level_gen;
pub mod movement;
pub mod network;
pub mod physics;
pub mod world;
