//! Game listing handler

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};

use super::model::{GameState, GameSummary};
use crate::error::ResponseError;
use crate::http;

/// Serves the game lobby endpoints
///
/// Holds no state: the listing is built fresh for every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct GameServer;

impl GameServer {
    pub const fn new() -> Self {
        Self
    }

    /// Games currently known to the lobby
    #[allow(clippy::unused_self)]
    pub fn games(&self) -> Vec<GameSummary> {
        // TODO: source games from live lobby state once game sessions exist
        vec![
            GameSummary::new("Game 1", 5, GameState::Countdown),
            GameSummary::new("John's Game", 3, GameState::Waiting),
            GameSummary::new("Unnamed Game", 6, GameState::Ended),
        ]
    }

    /// `GET /games`: JSON array of every game summary
    pub fn list_games(&self) -> Result<Response<Full<Bytes>>, ResponseError> {
        http::json_response(StatusCode::OK, &self.games())
    }
}
