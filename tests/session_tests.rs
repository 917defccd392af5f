// Session loop tests, run against tokio's paused clock so timer behaviour
// is exact and instant.


use std::time::Duration;

use loiter::client::{ClientAction, ClientEvent, Direction};
use loiter::session::{SessionError, SessionManager};
use tokio::sync::oneshot;
use tokio::time::{timeout, timeout_at, Instant};

use test_helpers::{chat_messages, login_event, spawn_event, test_config, FakeConnector};

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[tokio::test(start_paused = true)]
async fn test_movement_and_chat_schedule() {
    let (connector, mut opened) = FakeConnector::new();
    let mut session = SessionManager::new(test_config(&["A", "B", "C"]), connector);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async move {
        let mut conn = opened.recv().await.expect("session should connect");
        let start = Instant::now();
        conn.event_tx.send(login_event("LoiterBot")).await.unwrap();
        conn.event_tx.send(spawn_event()).await.unwrap();

        let mut log = Vec::new();
        while let Ok(Some(action)) = timeout_at(start + secs(185), conn.action_rx.recv()).await {
            log.push((start.elapsed(), action));
        }

        stop_tx.send(()).unwrap();
        (conn, log)
    };

    let (result, (_conn, log)) = tokio::join!(
        session.run(async {
            let _ = stop_rx.await;
        }),
        driver
    );
    assert!(result.is_ok());

    let actions: Vec<ClientAction> = log.iter().map(|(_, a)| a.clone()).collect();
    assert_eq!(chat_messages(&actions), vec!["A", "B", "C"]);

    let chat_times: Vec<Duration> = log
        .iter()
        .filter(|(_, a)| matches!(a, ClientAction::Chat { .. }))
        .map(|(t, _)| *t)
        .collect();
    assert_eq!(chat_times, vec![secs(60), secs(120), secs(180)]);

    let controls: Vec<(Duration, Direction, bool)> = log
        .iter()
        .filter_map(|(t, a)| match a {
            ClientAction::Control { direction, state } => Some((*t, *direction, *state)),
            _ => None,
        })
        .collect();
    assert_eq!(controls.len(), 12);
    for (i, pair) in controls.chunks(2).enumerate() {
        let (pressed_at, direction, pressed) = pair[0];
        let (released_at, released_direction, still_pressed) = pair[1];
        assert!(pressed);
        assert!(!still_pressed);
        assert_eq!(direction, released_direction);
        assert_eq!(pressed_at, secs(30 * (i as u64 + 1)));
        assert_eq!(released_at, pressed_at + Duration::from_millis(1000));
    }

    // Three sends through a three-command list wraps back to the start
    assert_eq!(session.state().chat_index, 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_reconnects_once_after_delay() {
    let (connector, mut opened) = FakeConnector::new();
    let mut session = SessionManager::new(test_config(&["A"]), connector);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async move {
        let first = opened.recv().await.unwrap();
        first.event_tx.send(spawn_event()).await.unwrap();
        let dropped_at = Instant::now();
        first
            .event_tx
            .send(ClientEvent::End {
                reason: Some("socket closed".to_string()),
            })
            .await
            .unwrap();

        let second = opened.recv().await.expect("should reconnect");
        let waited = dropped_at.elapsed();

        // Nothing else tries to connect while the new session is healthy
        let third = timeout(secs(120), opened.recv()).await;

        stop_tx.send(()).unwrap();
        (first, second, waited, third.is_err())
    };

    let (result, (_first, _second, waited, no_third)) = tokio::join!(
        session.run(async {
            let _ = stop_rx.await;
        }),
        driver
    );

    assert!(result.is_ok());
    assert_eq!(waited, secs(5));
    assert!(no_third);
    assert_eq!(session.connector().attempts(), 2);
    assert_eq!(session.state().reconnect_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_is_retried_forever_at_fixed_delay() {
    let (connector, mut opened) = FakeConnector::new();
    let mut session = SessionManager::new(test_config(&["A"]), connector);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async move {
        let mut gaps = Vec::new();
        let mut conn = opened.recv().await.unwrap();
        for _ in 0..4 {
            let dropped_at = Instant::now();
            conn.event_tx
                .send(ClientEvent::End { reason: None })
                .await
                .unwrap();
            conn = opened.recv().await.unwrap();
            gaps.push(dropped_at.elapsed());
        }
        stop_tx.send(()).unwrap();
        (conn, gaps)
    };

    let (result, (_conn, gaps)) = tokio::join!(
        session.run(async {
            let _ = stop_rx.await;
        }),
        driver
    );

    assert!(result.is_ok());
    assert_eq!(gaps, vec![secs(5); 4]);
    assert_eq!(session.connector().attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_kick_stays_offline() {
    let (connector, mut opened) = FakeConnector::new();
    let mut session = SessionManager::new(test_config(&["A"]), connector);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async move {
        let conn = opened.recv().await.unwrap();
        conn.event_tx.send(spawn_event()).await.unwrap();
        conn.event_tx
            .send(ClientEvent::Kicked {
                reason: "You have been idle for too long".to_string(),
            })
            .await
            .unwrap();
        // The library follows a kick with an end notice; it must not matter
        let _ = conn.event_tx.send(ClientEvent::End { reason: None }).await;

        let reconnect = timeout(secs(600), opened.recv()).await;
        stop_tx.send(()).unwrap();
        (conn, reconnect.is_err())
    };

    let (result, (_conn, no_reconnect)) = tokio::join!(
        session.run(async {
            let _ = stop_rx.await;
        }),
        driver
    );

    assert!(result.is_ok());
    assert!(no_reconnect);
    assert!(session.state().kicked);
    assert!(!session.is_connected());
    assert_eq!(session.connector().attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_closed_event_stream_counts_as_disconnect() {
    let (connector, mut opened) = FakeConnector::new();
    let mut session = SessionManager::new(test_config(&["A"]), connector);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async move {
        let first = opened.recv().await.unwrap();
        let dropped_at = Instant::now();
        drop(first);
        let second = opened.recv().await.unwrap();
        let waited = dropped_at.elapsed();
        stop_tx.send(()).unwrap();
        (second, waited)
    };

    let (result, (_second, waited)) = tokio::join!(
        session.run(async {
            let _ = stop_rx.await;
        }),
        driver
    );

    assert!(result.is_ok());
    assert_eq!(waited, secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_error_alone_does_not_reconnect() {
    let (connector, mut opened) = FakeConnector::new();
    let mut session = SessionManager::new(test_config(&["A"]), connector);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async move {
        let mut conn = opened.recv().await.unwrap();
        conn.event_tx.send(spawn_event()).await.unwrap();
        conn.event_tx
            .send(ClientEvent::Error {
                message: "ECONNRESET".to_string(),
            })
            .await
            .unwrap();

        // Timers are gone, so nothing is sent and nobody reconnects
        let action = timeout(secs(300), conn.action_rx.recv()).await;
        let reconnect = timeout(secs(1), opened.recv()).await;
        stop_tx.send(()).unwrap();
        (conn, action.is_err(), reconnect.is_err())
    };

    let (result, (_conn, no_action, no_reconnect)) = tokio::join!(
        session.run(async {
            let _ = stop_rx.await;
        }),
        driver
    );

    assert!(result.is_ok());
    assert!(no_action);
    assert!(no_reconnect);
    assert!(session.is_connected());
    assert!(!session.state().timers_running());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_quits_and_cancels_pending_reconnect() {
    let (connector, mut opened) = FakeConnector::new();
    let mut session = SessionManager::new(test_config(&["A"]), connector);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async move {
        let first = opened.recv().await.unwrap();
        first
            .event_tx
            .send(ClientEvent::End { reason: None })
            .await
            .unwrap();
        tokio::time::sleep(secs(2)).await;
        stop_tx.send(()).unwrap();
        first
    };

    let (result, _first) = tokio::join!(
        session.run(async {
            let _ = stop_rx.await;
        }),
        driver
    );

    assert!(result.is_ok());
    assert_eq!(session.pending_timers(), 0);
    assert_eq!(session.connector().attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_sends_quit_to_live_connection() {
    let (connector, mut opened) = FakeConnector::new();
    let mut session = SessionManager::new(test_config(&["A"]), connector);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async move {
        let conn = opened.recv().await.unwrap();
        conn.event_tx.send(spawn_event()).await.unwrap();
        tokio::time::sleep(secs(1)).await;
        stop_tx.send(()).unwrap();
        conn
    };

    let (result, mut conn) = tokio::join!(
        session.run(async {
            let _ = stop_rx.await;
        }),
        driver
    );

    assert!(result.is_ok());
    assert!(!session.is_connected());
    assert!(!session.state().timers_running());
    assert_eq!(conn.action_rx.try_recv().ok(), Some(ClientAction::Quit));
}

#[tokio::test]
async fn test_construction_failure_is_fatal() {
    let mut session = SessionManager::new(test_config(&["A"]), FakeConnector::failing());

    let result = session.run(std::future::pending()).await;

    assert!(matches!(result, Err(SessionError::Connect { .. })));
    assert_eq!(session.connector().attempts(), 1);
}
