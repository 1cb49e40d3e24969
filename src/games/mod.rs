//! Trivia game lobby
//!
//! The listing schema and the handler that serves it.

mod model;
mod server;

pub use model::{GameState, GameSummary};
pub use server::GameServer;
