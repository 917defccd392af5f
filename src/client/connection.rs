use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::events::{ClientAction, ClientEvent, Direction};

/// Longest name the game accepts for a player
pub const MAX_USERNAME_LEN: usize = 16;

/// Everything the client library needs to open a session
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Protocol version, or `None` to let the library detect it
    pub version: Option<String>,
}

impl ConnectOptions {
    /// Reject options no client library could build a session from
    pub fn validate(&self) -> Result<(), ConnectError> {
        if self.host.trim().is_empty() {
            return Err(ConnectError::InvalidOptions("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConnectError::InvalidOptions("port is 0".to_string()));
        }
        if self.username.is_empty() || self.username.len() > MAX_USERNAME_LEN {
            return Err(ConnectError::InvalidOptions(format!(
                "username must be 1-{} characters, got {:?}",
                MAX_USERNAME_LEN, self.username
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid connection options: {0}")]
    InvalidOptions(String),
    #[error("no async runtime to drive the client on")]
    NoRuntime,
}

#[derive(Debug, Error, PartialEq)]
pub enum SendError {
    #[error("connection is closed")]
    Closed,
}

/// Opens sessions on the game client library.
///
/// `connect` only builds the session object. Transport failures that happen
/// afterwards are reported through the connection's event stream as
/// [`ClientEvent::Error`] followed by [`ClientEvent::End`].
pub trait Connector {
    fn connect(&self, options: &ConnectOptions) -> Result<Connection, ConnectError>;
}

/// Session-side handle to one live client library session
pub struct Connection {
    username: String,
    action_tx: mpsc::UnboundedSender<ClientAction>,
    event_rx: mpsc::Receiver<ClientEvent>,
    task: Option<JoinHandle<()>>,
}

/// Library-side ends of a [`Connection`]
pub struct ConnectionChannels {
    pub action_rx: mpsc::UnboundedReceiver<ClientAction>,
    pub event_tx: mpsc::Sender<ClientEvent>,
}

impl Connection {
    /// Create a connection plus the channels a library implementation drives
    pub fn channel(username: impl Into<String>) -> (Self, ConnectionChannels) {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(256);

        let connection = Self {
            username: username.into(),
            action_tx,
            event_rx,
            task: None,
        };

        (connection, ConnectionChannels { action_rx, event_tx })
    }

    /// Attach the I/O task backing this connection so `close` can wait on it
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Name the server knows us by
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn set_username(&mut self, username: String) {
        self.username = username;
    }

    pub fn chat(&self, message: &str) -> Result<(), SendError> {
        self.send(ClientAction::Chat {
            message: message.to_string(),
        })
    }

    pub fn set_control_state(&self, direction: Direction, state: bool) -> Result<(), SendError> {
        self.send(ClientAction::Control { direction, state })
    }

    pub fn quit(&self) -> Result<(), SendError> {
        self.send(ClientAction::Quit)
    }

    fn send(&self, action: ClientAction) -> Result<(), SendError> {
        self.action_tx.send(action).map_err(|_| SendError::Closed)
    }

    /// Next event from the library; `None` once the library side is gone
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.event_rx.recv().await
    }

    /// Send quit and give the I/O task a moment to flush it
    pub async fn close(mut self, timeout: Duration) {
        if self.quit().is_err() {
            debug!(target: "net", "Connection already closed before quit");
        }

        if let Some(task) = self.task.take() {
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(())) => {
                    debug!(target: "net", "Connection task finished gracefully");
                }
                Ok(Err(e)) => {
                    warn!(target: "net", "Connection task failed: {}", e);
                }
                Err(_) => {
                    warn!(target: "net", "Connection task did not finish within {:?}", timeout);
                }
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
