//! # onlypoly - Authoritative Server for a Property-Trading Board Game
//!
//! onlypoly runs one room of a Monopoly-style game for up to eight players connected over
//! WebSockets. The server holds the only authoritative copy of the game; clients send
//! actions and render the state broadcasts they receive.
//!
//! ## Features
//!
//! - **Game Engine**: lobby, dice, movement with salary on wrap, rent with group bonuses,
//!   taxes, a cyclic chance deck, jail, building and selling, liquidation and bankruptcy.
//! - **Auctions**: one timed auction at a time with fixed bid steps and idempotent resolution.
//! - **Trades**: pairwise offers of cash and deeds, re-validated at acceptance.
//! - **Persistence**: sled-backed snapshots written through a coalescing write-behind queue.
//! - **Async Design**: a single tokio task owns the game, so every action is atomic.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use onlypoly::config::Config;
//! use onlypoly::game::GameSession;
//! use onlypoly::server::{self, ServerSettings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let session = GameSession::new(config.game.load_board()?, config.game.rules());
//!     let handle = server::start_server(session, ServerSettings::default(), None);
//!     server::ws::serve(&config.server.bind, handle, std::future::pending()).await
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`game`] - board, rent, chance deck, session state machine, auctions and trades
//! - [`server`] - single-writer action loop, wire protocol and WebSocket transport
//! - [`storage`] - snapshot store and write-behind queue
//! - [`config`] - configuration loading and defaults
//! - [`validation`] - display name and color validation
//! - [`logutil`] - single-line escaping of user strings for logs
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  WebSocket (ws) │ ← one reader + one writer task per connection
//! └─────────────────┘
//!          │ command queue
//! ┌─────────────────┐
//! │   GameServer    │ ← owns the session, auction house and trade desk
//! └─────────────────┘
//!          │ snapshots
//! ┌─────────────────┐
//! │ SnapshotWriter  │ ← coalescing writes into sled
//! └─────────────────┘
//! ```

pub mod config;
pub mod game;
pub mod logutil;
pub mod server;
pub mod storage;
pub mod validation;
