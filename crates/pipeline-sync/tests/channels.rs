mod support;

use pipeline_sync::{
    HandshakeClient, HandshakeEvent, HandshakeSettings, RealtimeChannel, RealtimeEvent,
    SnapshotPoller, SyncEvent,
};
use std::sync::Arc;
use std::time::Duration;
use support::{
    config, snapshot_with, test_settings, wait_until, FakeConnector, FakeControlApi,
    HandshakeReply, SnapshotReply, REALTIME_BASE_PORT, WAIT,
};
use tokio::sync::mpsc;

async fn recv(events: &mut mpsc::Receiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("event in time")
        .expect("channel open")
}

fn handshake_settings() -> HandshakeSettings {
    let settings = test_settings();
    HandshakeSettings {
        request_timeout: settings.request_timeout,
        interval: settings.handshake_interval,
        retry: settings.retry,
    }
}

#[tokio::test]
async fn realtime_close_is_idempotent_and_invalidates_epoch() {
    let (tx, mut rx) = mpsc::channel(16);
    let connector = FakeConnector::new();
    let mut channel = RealtimeChannel::new(connector.clone(), Arc::new(test_settings()), tx);

    assert!(!channel.close());
    channel.connect(0);
    let epoch = match recv(&mut rx).await {
        SyncEvent::Realtime {
            epoch,
            event: RealtimeEvent::Opened,
        } => epoch,
        other => panic!("unexpected event {other:?}"),
    };
    assert!(channel.is_current(epoch));
    assert_eq!(channel.last_offset(), Some(0));

    assert!(channel.close());
    assert!(!channel.close());
    assert!(!channel.is_active());
    assert!(!channel.is_current(epoch));
    wait_until("connection dropped", || connector.is_closed(0)).await;
}

#[tokio::test]
async fn realtime_connect_replaces_previous_connection() {
    let (tx, mut rx) = mpsc::channel(16);
    let connector = FakeConnector::new();
    let mut channel = RealtimeChannel::new(connector.clone(), Arc::new(test_settings()), tx);

    channel.connect(0);
    let first = match recv(&mut rx).await {
        SyncEvent::Realtime { epoch, .. } => epoch,
        other => panic!("unexpected event {other:?}"),
    };
    channel.connect(2);
    let second = match recv(&mut rx).await {
        SyncEvent::Realtime {
            epoch,
            event: RealtimeEvent::Opened,
        } => epoch,
        other => panic!("unexpected event {other:?}"),
    };

    assert_ne!(first, second);
    assert!(!channel.is_current(first));
    assert!(channel.is_current(second));
    assert_eq!(connector.ports(), vec![REALTIME_BASE_PORT, REALTIME_BASE_PORT + 2]);
    wait_until("first connection dropped", || connector.is_closed(0)).await;
    assert!(!connector.is_closed(1));
}

#[tokio::test]
async fn realtime_frames_are_sequenced_per_connection() {
    let (tx, mut rx) = mpsc::channel(16);
    let connector = FakeConnector::new();
    let mut channel = RealtimeChannel::new(connector.clone(), Arc::new(test_settings()), tx);

    channel.connect(0);
    recv(&mut rx).await;
    connector.push(0, r#"{"type":"a"}"#);
    connector.push(0, r#"{"type":"b"}"#);

    for expected in [1u64, 2] {
        match recv(&mut rx).await {
            SyncEvent::Realtime {
                event: RealtimeEvent::Push(push),
                ..
            } => assert_eq!(push.sequence, expected),
            other => panic!("unexpected event {other:?}"),
        }
    }

    connector.end(0);
    match recv(&mut rx).await {
        SyncEvent::Realtime {
            event: RealtimeEvent::Closed(reason),
            ..
        } => assert!(reason.is_unexpected()),
        other => panic!("unexpected event {other:?}"),
    }

    // Reconnects on its own and numbering restarts.
    match recv(&mut rx).await {
        SyncEvent::Realtime {
            event: RealtimeEvent::Opened,
            ..
        } => {}
        other => panic!("unexpected event {other:?}"),
    }
    connector.push(1, r#"{"type":"c"}"#);
    match recv(&mut rx).await {
        SyncEvent::Realtime {
            event: RealtimeEvent::Push(push),
            ..
        } => assert_eq!(push.sequence, 1),
        other => panic!("unexpected event {other:?}"),
    }
    channel.close();
}

#[tokio::test]
async fn realtime_retries_refused_connections() {
    let (tx, mut rx) = mpsc::channel(16);
    let connector = FakeConnector::new();
    connector.set_refusing(true);
    let mut channel = RealtimeChannel::new(connector.clone(), Arc::new(test_settings()), tx);

    channel.connect(0);
    wait_until("several attempts", || connector.attempts() >= 3).await;
    assert!(rx.try_recv().is_err());

    connector.set_refusing(false);
    match recv(&mut rx).await {
        SyncEvent::Realtime {
            event: RealtimeEvent::Opened,
            ..
        } => {}
        other => panic!("unexpected event {other:?}"),
    }
    channel.close();
}

#[tokio::test]
async fn realtime_offset_outside_port_range_never_connects() {
    let (tx, mut rx) = mpsc::channel(16);
    let connector = FakeConnector::new();
    let mut settings = test_settings();
    settings.realtime_base_port = u16::MAX;
    let mut channel = RealtimeChannel::new(connector.clone(), Arc::new(settings), tx);

    channel.connect(1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connector.attempts(), 0);
    assert!(rx.try_recv().is_err());
    channel.close();
}

#[tokio::test]
async fn handshake_reports_disconnect_once_per_loss() {
    let (tx, mut rx) = mpsc::channel(64);
    let api = FakeControlApi::new(
        HandshakeReply::Config(config(1, 0)),
        SnapshotReply::Snapshot(snapshot_with(0)),
    );
    let mut client = HandshakeClient::new(api.clone(), handshake_settings(), tx);
    client.start();

    match recv(&mut rx).await {
        SyncEvent::Handshake {
            event: HandshakeEvent::Connected(config),
            ..
        } => assert_eq!(config.build_version, 1),
        other => panic!("unexpected event {other:?}"),
    }

    api.set_handshake(HandshakeReply::Refuse);
    loop {
        match recv(&mut rx).await {
            SyncEvent::Handshake {
                event: HandshakeEvent::Disconnected,
                ..
            } => break,
            SyncEvent::Handshake {
                event: HandshakeEvent::Connected(_),
                ..
            } => continue,
            other => panic!("unexpected event {other:?}"),
        }
    }

    let failures = api.handshake_calls();
    wait_until("more failed attempts", || api.handshake_calls() >= failures + 2).await;
    assert!(rx.try_recv().is_err());

    api.set_handshake(HandshakeReply::Config(config(1, 0)));
    match recv(&mut rx).await {
        SyncEvent::Handshake {
            event: HandshakeEvent::Connected(_),
            ..
        } => {}
        other => panic!("unexpected event {other:?}"),
    }
    assert!(client.kill());
}

#[tokio::test]
async fn handshake_timeout_counts_as_failure() {
    let (tx, mut rx) = mpsc::channel(16);
    let api = FakeControlApi::new(
        HandshakeReply::Hang,
        SnapshotReply::Snapshot(snapshot_with(0)),
    );
    let mut client = HandshakeClient::new(api.clone(), handshake_settings(), tx);
    client.start();

    wait_until("retry after timeout", || api.handshake_calls() >= 2).await;
    assert!(rx.try_recv().is_err());
    assert!(client.is_running());
    client.kill();
}

#[tokio::test]
async fn handshake_kill_stops_attempts() {
    let (tx, _rx) = mpsc::channel(64);
    let api = FakeControlApi::new(
        HandshakeReply::Refuse,
        SnapshotReply::Snapshot(snapshot_with(0)),
    );
    let mut client = HandshakeClient::new(api.clone(), handshake_settings(), tx);

    assert!(!client.kill());
    client.start();
    wait_until("first attempt", || api.handshake_calls() >= 1).await;
    assert!(client.kill());
    assert!(!client.is_running());

    let calls = api.handshake_calls();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(api.handshake_calls(), calls);
}

#[tokio::test]
async fn poller_polls_immediately_and_on_request() {
    let (tx, mut rx) = mpsc::channel(16);
    let api = FakeControlApi::new(
        HandshakeReply::Config(config(1, 0)),
        SnapshotReply::Snapshot(snapshot_with(4)),
    );
    let mut poller = SnapshotPoller::new(api.clone(), Duration::from_millis(100), tx);

    poller.request_refresh();
    poller.start(Duration::from_secs(60));
    let epoch = match recv(&mut rx).await {
        SyncEvent::Snapshot { epoch, snapshot } => {
            assert_eq!(snapshot.projects.len(), 4);
            epoch
        }
        other => panic!("unexpected event {other:?}"),
    };
    assert!(poller.is_current(epoch));

    poller.request_refresh();
    recv(&mut rx).await;
    assert_eq!(api.snapshot_calls(), 2);

    assert!(poller.stop());
    assert!(!poller.is_current(epoch));
    assert!(!poller.stop());
}

#[tokio::test]
async fn poller_failures_emit_nothing_and_keep_ticking() {
    let (tx, mut rx) = mpsc::channel(16);
    let api = FakeControlApi::new(
        HandshakeReply::Config(config(1, 0)),
        SnapshotReply::Fail,
    );
    let mut poller = SnapshotPoller::new(api.clone(), Duration::from_millis(100), tx);

    poller.start(Duration::from_millis(20));
    wait_until("several polls", || api.snapshot_calls() >= 3).await;
    assert!(rx.try_recv().is_err());

    api.set_snapshot(SnapshotReply::Snapshot(snapshot_with(1)));
    match recv(&mut rx).await {
        SyncEvent::Snapshot { snapshot, .. } => assert_eq!(snapshot.projects.len(), 1),
        other => panic!("unexpected event {other:?}"),
    }
    poller.stop();
}
