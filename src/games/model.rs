//! Game listing response schema
//!
//! These types are the wire contract of `GET /games`. Field names are pinned
//! with explicit serde renames so a Rust-side rename cannot silently change
//! the JSON the frontend receives.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    /// Lobby is open and players can join
    Waiting,
    /// Game has started, countdown before the first question
    Countdown,
    /// A question is being asked
    Question,
    /// Game is over
    Ended,
}

impl GameState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Countdown => "countdown",
            Self::Question => "question",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the game listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSummary {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "QuestionCount")]
    pub question_count: u32,
    #[serde(rename = "State")]
    pub state: GameState,
}

impl GameSummary {
    pub fn new(name: impl Into<String>, question_count: u32, state: GameState) -> Self {
        Self {
            name: name.into(),
            question_count,
            state,
        }
    }
}
