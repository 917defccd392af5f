use chrono::{DateTime, Local};

use crate::client::Direction;
use crate::timer::TimerId;

/// What a scheduled session timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTimer {
    /// Recurring: maybe start a movement
    Movement,
    /// Recurring: send the next chat command
    Chat,
    /// One-shot: let go of a held movement key
    MovementRelease(Direction),
    /// One-shot: open a new connection
    Reconnect,
}

/// Mutable per-process session bookkeeping.
///
/// Timers, the movement flag and the connection are reset on every
/// disconnect. `chat_index` is not: it only ever returns to 0 by wrapping.
#[derive(Debug, Default)]
pub struct SessionState {
    pub movement_timer: Option<TimerId>,
    pub chat_timer: Option<TimerId>,
    /// Pending release of the key held by the in-flight movement
    pub movement_release: Option<(TimerId, Direction)>,
    pub reconnect_timer: Option<TimerId>,
    pub is_moving: bool,
    pub chat_index: usize,
    /// Disconnects seen since the last successful login
    pub reconnect_attempts: u32,
    pub connected_at: Option<DateTime<Local>>,
    pub kicked: bool,
}

impl SessionState {
    pub fn timers_running(&self) -> bool {
        self.movement_timer.is_some() || self.chat_timer.is_some()
    }
}

/// Render a session length like `1h 02m 03s`
pub fn format_uptime(total_secs: i64) -> String {
    let total_secs = total_secs.max(0);
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
