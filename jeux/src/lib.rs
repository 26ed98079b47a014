//! Jeux: a concurrent, multi-client, turn-based tic-tac-toe game server.

pub mod client;
pub mod client_registry;
pub mod config;
pub mod error;
pub mod game;
pub mod invitation;
pub mod player;
pub mod player_registry;
pub mod service;
pub mod state;
