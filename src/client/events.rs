use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Movement keys the bot can hold down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Forward,
    Back,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Forward,
        Direction::Back,
        Direction::Left,
        Direction::Right,
    ];

    /// Pick one of the four directions uniformly at random
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        *Self::ALL.choose(rng).unwrap_or(&Direction::Forward)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}, {:.2}, {:.2}", self.x, self.y, self.z)
    }
}

/// Lifecycle events emitted by the game client library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Authenticated with the server
    Login { username: String },
    /// Entered the world and ready to act
    Spawn {
        position: Position,
        #[serde(default)]
        server_brand: Option<String>,
    },
    /// A chat line from some player (possibly ourselves)
    Chat { username: String, message: String },
    /// Vitals changed
    Health { health: f32, food: f32 },
    /// Server removed us on purpose
    Kicked { reason: String },
    /// Transient error reported by the library
    Error { message: String },
    /// Connection is gone
    End {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Commands sent to the game client library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    /// Send a chat line or slash command
    Chat { message: String },
    /// Press or release a movement key
    Control { direction: Direction, state: bool },
    /// Leave the server
    Quit,
}
