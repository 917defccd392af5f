use std::future::Future;

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::client::{ClientEvent, Connection, Connector};
use crate::session::manager::{SessionError, SessionManager};

impl<C: Connector> SessionManager<C> {
    /// Connect, then drive events and timers until `shutdown` resolves.
    ///
    /// Everything runs on this one task, so handlers never overlap. Returns
    /// `Ok` after a graceful shutdown and `Err` when a connection could not
    /// even be created.
    pub async fn run<S>(&mut self, shutdown: S) -> Result<(), SessionError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        self.connect()?;
        info!(target: "session", "Session loop started");

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                event = next_event(&mut self.connection) => {
                    let now = Instant::now();
                    match event {
                        Some(event) => self.handle_event(event, now),
                        None => {
                            warn!(target: "net", "Event stream closed without a disconnect notice");
                            self.handle_event(
                                ClientEvent::End {
                                    reason: Some("event stream closed".to_string()),
                                },
                                now,
                            );
                        }
                    }
                }
                _ = sleep_until(deadline) => {
                    if let Err(e) = self.fire_due_timers(Instant::now()) {
                        self.cleanup();
                        return Err(e);
                    }
                }
                _ = &mut shutdown => {
                    self.shutdown().await;
                    info!(target: "session", "Session loop stopped");
                    return Ok(());
                }
            }
        }
    }
}

async fn next_event(connection: &mut Option<Connection>) -> Option<ClientEvent> {
    match connection {
        Some(connection) => connection.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = terminate.recv() => {
                        info!("Received SIGTERM signal");
                    }
                }
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT signal"),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
