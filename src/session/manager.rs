use std::time::Duration;

use chrono::Local;
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::client::{ClientEvent, ConnectError, Connection, Connector, Direction, Position};
use crate::config::BotConfig;
use crate::session::state::{format_uptime, SessionState, SessionTimer};
use crate::timer::{Scheduler, TimerId};

/// Health at or below this is worth a warning
pub const LOW_HEALTH_THRESHOLD: f32 = 5.0;
pub const MAX_HEALTH: f32 = 20.0;

pub fn is_low_health(health: f32) -> bool {
    health <= LOW_HEALTH_THRESHOLD
}

/// How long shutdown waits for the connection to flush its quit
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to create connection for {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: ConnectError,
    },
}

/// Owns the connection, the session timers and the scripted behaviour.
///
/// Every handler takes the current instant as an argument; only the run loop
/// reads the clock.
pub struct SessionManager<C> {
    config: BotConfig,
    connector: C,
    pub(crate) connection: Option<Connection>,
    pub(crate) scheduler: Scheduler<SessionTimer>,
    state: SessionState,
    rng: StdRng,
}

impl<C> SessionManager<C> {
    pub fn new(config: BotConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            connection: None,
            scheduler: Scheduler::new(),
            state: SessionState::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the random source used to pick movement directions
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Number of live timers of any kind
    pub fn pending_timers(&self) -> usize {
        self.scheduler.active_count()
    }

    /// React to one event from the client library
    pub fn handle_event(&mut self, event: ClientEvent, now: Instant) {
        match event {
            ClientEvent::Login { username } => self.on_login(username),
            ClientEvent::Spawn {
                position,
                server_brand,
            } => self.on_spawn(position, server_brand, now),
            ClientEvent::Chat { username, message } => self.on_chat(&username, &message),
            ClientEvent::Health { health, food } => self.on_health(health, food),
            ClientEvent::Kicked { reason } => self.on_kicked(&reason),
            ClientEvent::Error { message } => self.on_error(&message),
            ClientEvent::End { reason } => self.on_disconnected(reason.as_deref(), now),
        }
    }

    fn on_login(&mut self, username: String) {
        info!(target: "session", "Successfully logged in to the server as {}", username);
        self.state.connected_at = Some(Local::now());
        self.state.reconnect_attempts = 0;
        if let Some(connection) = self.connection.as_mut() {
            connection.set_username(username);
        }
    }

    fn on_spawn(&mut self, position: Position, server_brand: Option<String>, now: Instant) {
        info!(target: "session", "Bot spawned");
        info!(
            target: "session",
            "Connected to server: {}",
            server_brand.as_deref().unwrap_or("Unknown")
        );
        info!(target: "session", "Position: {}", position);

        self.start_timers(now);
    }

    /// True when `username` is the name the current connection logged in as
    pub fn is_self(&self, username: &str) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| connection.username() == username)
    }

    fn on_chat(&self, username: &str, message: &str) {
        if !self.is_self(username) {
            info!(target: "chat", "[{}]: {}", username, message);
        }
    }

    fn on_health(&self, health: f32, food: f32) {
        if is_low_health(health) {
            warn!(target: "session", "Low health: {}/{}", health, MAX_HEALTH);
        } else {
            debug!(target: "session", "Health {}/{}, food {}", health, MAX_HEALTH, food);
        }
    }

    fn on_error(&mut self, message: &str) {
        error!(target: "session", "Bot error: {}", message);
        self.cleanup();
    }

    fn on_kicked(&mut self, reason: &str) {
        warn!(target: "session", "Bot was kicked from server: {}", reason);
        self.cleanup();
        self.drop_connection();
        self.state.kicked = true;
        info!(target: "session", "Not reconnecting after a kick; waiting for a shutdown signal");
    }

    fn on_disconnected(&mut self, reason: Option<&str>, now: Instant) {
        match reason {
            Some(reason) => info!(target: "session", "Bot disconnected from server: {}", reason),
            None => info!(target: "session", "Bot disconnected from server"),
        }
        self.cleanup();
        self.drop_connection();

        if self.state.kicked {
            debug!(target: "session", "Kicked earlier, not reconnecting");
            return;
        }
        if self.state.reconnect_timer.is_some() {
            debug!(target: "session", "Reconnect already scheduled");
            return;
        }

        let delay = self.config.reconnect.delay();
        self.state.reconnect_attempts += 1;
        info!(
            target: "session",
            "Attempting to reconnect in {} seconds (attempt {})",
            delay.as_secs(),
            self.state.reconnect_attempts
        );
        let id = self
            .scheduler
            .schedule_once(now, delay, SessionTimer::Reconnect);
        self.state.reconnect_timer = Some(id);
    }

    fn drop_connection(&mut self) {
        if self.connection.take().is_some() {
            if let Some(started) = self.state.connected_at.take() {
                let lasted = (Local::now() - started).num_seconds();
                info!(target: "session", "Session lasted {}", format_uptime(lasted));
            }
        }
    }

    /// Start (or restart) the movement and chat timers
    pub fn start_timers(&mut self, now: Instant) {
        if self.state.timers_running() {
            debug!(target: "session", "Timers already running, restarting them");
            self.cancel_repeating_timers();
        }

        let movement = self.config.movement.interval();
        let chat = self.config.chat.interval();

        info!(target: "session", "Starting automated movement every {}s", movement.as_secs());
        self.state.movement_timer =
            Some(self.scheduler.schedule_recurring(now, movement, SessionTimer::Movement));

        info!(target: "session", "Starting automated chat every {}s", chat.as_secs());
        self.state.chat_timer = Some(self.scheduler.schedule_recurring(now, chat, SessionTimer::Chat));
    }

    /// Movement timer tick: skipped while a movement is in flight or offline
    pub fn on_movement_tick(&mut self, now: Instant) {
        if self.state.is_moving {
            debug!(target: "session", "Previous movement still in progress, skipping");
            return;
        }
        if self.connection.is_none() {
            debug!(target: "session", "No connection, skipping movement");
            return;
        }
        self.perform_movement(now);
    }

    /// Hold a random direction for the configured duration
    pub fn perform_movement(&mut self, now: Instant) {
        let Some(connection) = self.connection.as_ref() else {
            return;
        };

        let direction = Direction::random(&mut self.rng);
        info!(target: "session", "Performing random movement: {}", direction);

        if let Err(e) = connection.set_control_state(direction, true) {
            warn!(target: "session", "Failed to start movement {}: {}", direction, e);
            return;
        }

        self.state.is_moving = true;
        let id = self.scheduler.schedule_once(
            now,
            self.config.movement.duration(),
            SessionTimer::MovementRelease(direction),
        );
        self.state.movement_release = Some((id, direction));
    }

    fn finish_movement(&mut self, direction: Direction) {
        self.release_key(direction);
        self.state.is_moving = false;
        info!(target: "session", "Stopped movement: {}", direction);
    }

    fn release_key(&self, direction: Direction) {
        if let Some(connection) = self.connection.as_ref() {
            if let Err(e) = connection.set_control_state(direction, false) {
                warn!(target: "session", "Failed to stop movement {}: {}", direction, e);
            }
        }
    }

    /// Send the command at the current index, then advance it with wraparound.
    ///
    /// Failures are logged and leave the index where it was.
    pub fn send_next_chat_command(&mut self) {
        let commands = &self.config.chat.commands;
        if commands.is_empty() {
            return;
        }
        let index = self.state.chat_index % commands.len();
        let command = &commands[index];

        let Some(connection) = self.connection.as_ref() else {
            warn!(target: "session", "No connection, skipping chat command: {}", command);
            return;
        };

        info!(target: "session", "Sending chat command: {}", command);
        match connection.chat(command) {
            Ok(()) => {
                self.state.chat_index = (index + 1) % commands.len();
                if self.state.chat_index == 0 {
                    info!(target: "session", "Chat command list completed, starting over");
                }
            }
            Err(e) => {
                error!(target: "session", "Failed to send chat command {}: {}", command, e);
            }
        }
    }

    fn cancel_repeating_timers(&mut self) {
        if let Some(id) = self.state.movement_timer.take() {
            self.scheduler.cancel(id);
            info!(target: "session", "Cleaned up movement timer");
        }
        if let Some(id) = self.state.chat_timer.take() {
            self.scheduler.cancel(id);
            info!(target: "session", "Cleaned up chat timer");
        }
    }

    /// Stop both timers and any pending key release. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        self.cancel_repeating_timers();

        if let Some((id, direction)) = self.state.movement_release.take() {
            self.scheduler.cancel(id);
            self.release_key(direction);
        }
        self.state.is_moving = false;
    }

    /// Clean up, cancel any pending reconnect and quit the server gracefully
    pub async fn shutdown(&mut self) {
        info!(target: "session", "Shutting down bot...");
        self.cleanup();

        if let Some(id) = self.state.reconnect_timer.take() {
            self.scheduler.cancel(id);
        }

        if let Some(connection) = self.connection.take() {
            connection.close(CLOSE_TIMEOUT).await;
        }
        self.state.connected_at = None;
    }

    fn is_current(&self, slot: Option<TimerId>, id: TimerId) -> bool {
        slot == Some(id)
    }
}

impl<C: Connector> SessionManager<C> {
    /// Open a new connection. Failing to even build one is fatal.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        let options = self.config.connect_options();
        info!(
            target: "session",
            "Attempting to connect to {}:{} as {}",
            options.host,
            options.port,
            options.username
        );

        let connection = self
            .connector
            .connect(&options)
            .map_err(|source| SessionError::Connect {
                target: options.to_string(),
                source,
            })?;

        self.connection = Some(connection);
        self.state.kicked = false;
        Ok(())
    }

    /// Run every timer due at `now`
    pub fn fire_due_timers(&mut self, now: Instant) -> Result<(), SessionError> {
        for (id, timer) in self.scheduler.tick(now) {
            match timer {
                SessionTimer::Movement => {
                    if self.is_current(self.state.movement_timer, id) {
                        self.on_movement_tick(now);
                    }
                }
                SessionTimer::Chat => {
                    if self.is_current(self.state.chat_timer, id) {
                        self.send_next_chat_command();
                    }
                }
                SessionTimer::MovementRelease(direction) => {
                    if self.state.movement_release.map(|(release, _)| release) == Some(id) {
                        self.state.movement_release = None;
                        self.finish_movement(direction);
                    }
                }
                SessionTimer::Reconnect => {
                    if self.is_current(self.state.reconnect_timer, id) {
                        self.state.reconnect_timer = None;
                        self.connect()?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<C> Drop for SessionManager<C> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
