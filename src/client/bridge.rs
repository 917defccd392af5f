//! Connector that reaches the game client library through a sidecar process.
//!
//! The sidecar owns the game protocol. We talk to it over TCP with one JSON
//! object per line: a `connect` request first, then [`ClientAction`]s out and
//! [`ClientEvent`]s back.

use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::{ConnectError, ConnectOptions, Connection, ConnectionChannels, Connector};
use super::events::{ClientAction, ClientEvent};

pub const DEFAULT_BRIDGE_ADDRESS: &str = "127.0.0.1:25580";

/// How long to wait for the sidecar to accept a connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeRequest<'a> {
    Connect {
        host: &'a str,
        port: u16,
        username: &'a str,
        version: Option<&'a str>,
    },
}

/// [`Connector`] backed by a line-delimited JSON bridge
#[derive(Clone, Debug)]
pub struct BridgeConnector {
    address: String,
    connect_timeout: Duration,
}

impl BridgeConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Default for BridgeConnector {
    fn default() -> Self {
        Self::new(DEFAULT_BRIDGE_ADDRESS)
    }
}

impl Connector for BridgeConnector {
    fn connect(&self, options: &ConnectOptions) -> Result<Connection, ConnectError> {
        options.validate()?;

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ConnectError::NoRuntime)?;

        let (connection, channels) = Connection::channel(options.username.clone());
        let task = runtime.spawn(run_bridge(
            self.address.clone(),
            self.connect_timeout,
            options.clone(),
            channels,
        ));

        Ok(connection.with_task(task))
    }
}

/// Drive one bridge session until either side goes away
async fn run_bridge(
    address: String,
    connect_timeout: Duration,
    options: ConnectOptions,
    channels: ConnectionChannels,
) {
    let ConnectionChannels {
        mut action_rx,
        event_tx,
    } = channels;

    info!(target: "net", "Connecting to client bridge at {} for {}", address, options);

    let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            fail(
                &event_tx,
                format!("failed to reach client bridge at {}: {}", address, e),
            )
            .await;
            return;
        }
        Err(_) => {
            fail(
                &event_tx,
                format!(
                    "timed out after {:?} connecting to client bridge at {}",
                    connect_timeout, address
                ),
            )
            .await;
            return;
        }
    };

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let request = BridgeRequest::Connect {
        host: &options.host,
        port: options.port,
        username: &options.username,
        version: options.version.as_deref(),
    };
    if let Err(e) = write_line(&mut writer, &request).await {
        fail(&event_tx, format!("failed to send connect request: {}", e)).await;
        return;
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let event = match serde_json::from_str::<ClientEvent>(&line) {
                            Ok(event) => event,
                            Err(e) => {
                                warn!(target: "net", "Skipping unparsable bridge line ({}): {}", e, line);
                                continue;
                            }
                        };
                        let is_end = matches!(event, ClientEvent::End { .. });
                        if event_tx.send(event).await.is_err() || is_end {
                            break;
                        }
                    }
                    Ok(None) => {
                        let _ = event_tx
                            .send(ClientEvent::End {
                                reason: Some("bridge closed the connection".to_string()),
                            })
                            .await;
                        break;
                    }
                    Err(e) => {
                        fail(&event_tx, format!("bridge read failed: {}", e)).await;
                        break;
                    }
                }
            }
            action = action_rx.recv() => {
                let Some(action) = action else {
                    debug!(target: "net", "Session dropped the connection, closing bridge");
                    break;
                };
                let is_quit = matches!(action, ClientAction::Quit);
                if let Err(e) = write_line(&mut writer, &action).await {
                    fail(&event_tx, format!("bridge write failed: {}", e)).await;
                    break;
                }
                if is_quit {
                    debug!(target: "net", "Quit sent to bridge");
                    break;
                }
            }
        }
    }

    let _ = writer.shutdown().await;
}

async fn write_line<T: Serialize>(writer: &mut OwnedWriteHalf, value: &T) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

/// Report a transport failure the way the library would: error, then end
async fn fail(event_tx: &mpsc::Sender<ClientEvent>, message: String) {
    let _ = event_tx
        .send(ClientEvent::Error {
            message: message.clone(),
        })
        .await;
    let _ = event_tx
        .send(ClientEvent::End {
            reason: Some(message),
        })
        .await;
}
