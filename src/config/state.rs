// Application state module
// Shared state handed to every connection

use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::Config;
use crate::games::GameServer;

/// Application state
pub struct AppState {
    pub config: Config,
    pub game_server: GameServer,

    /// Number of connections currently being served
    pub active_connections: AtomicUsize,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            game_server: GameServer::new(),
            active_connections: AtomicUsize::new(0),
        }
    }

    pub const fn access_log_enabled(&self) -> bool {
        self.config.logging.access_log
    }

    pub fn connection_count(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }
}
