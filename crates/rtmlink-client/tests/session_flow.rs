//! End-to-end session behavior over the in-memory transport.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]


use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde_json::json;

use mock_transport::{next_disconnect, next_frame_event, test_config, within, MockConnector};
use rtmlink_client::config::ReconnectSection;
use rtmlink_client::dispatch::SessionEvent;
use rtmlink_client::{ConnectionState, Session};
use rtmlink_core::error::DecodeError;
use rtmlink_core::{OutgoingMessage, RtmError, RtmEvent};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn ack_resolves_the_matching_send() {
    let (conn, mut accepted) = MockConnector::new();
    let session = Session::new(test_config(), conn).unwrap();
    let mut sub = session.subscribe();
    session.start().unwrap();
    let mut server = within(accepted.recv()).await.unwrap();
    session.wait_for_state(ConnectionState::Connected, WAIT).await.unwrap();

    let wait = session
        .send_deferred(OutgoingMessage::message("C1", "hello there"))
        .await
        .unwrap();
    let id = wait.id();
    assert_eq!(id, 1);

    let sent = server.next_sent().await;
    assert_eq!(sent["type"], "message");
    assert_eq!(sent["channel"], "C1");
    assert_eq!(sent["id"], id);

    let ack = json!({"ok": true, "reply_to": id, "ts": "1355517523.000005", "text": "hello there"});
    server.push(ack.to_string());
    let delivered = wait.wait(WAIT).await.unwrap();
    assert_eq!(delivered.reply_to, id);
    assert_eq!(delivered.ts, "1355517523.000005");
    assert_eq!(delivered.text, "hello there");
    assert_eq!(session.pending_len(), 0);

    // A second ack for the same id is dropped; later frames still flow.
    server.push(ack.to_string());
    server.push(r#"{"type":"hello"}"#);
    let ev = next_frame_event(&mut sub).await;
    assert!(matches!(ev.as_event(), Some(RtmEvent::Hello)));
    assert_eq!(session.pending_len(), 0);

    session.close().await;
}

#[tokio::test]
async fn failed_ack_rejects_the_send() {
    let (conn, mut accepted) = MockConnector::new();
    let session = Session::new(test_config(), conn).unwrap();
    session.start().unwrap();
    let mut server = within(accepted.recv()).await.unwrap();
    session.wait_for_state(ConnectionState::Connected, WAIT).await.unwrap();

    let send = {
        let session = session.clone();
        tokio::spawn(async move { session.send(OutgoingMessage::message("C1", "")).await })
    };
    let sent = server.next_sent().await;
    let id = sent["id"].as_u64().unwrap();
    server.push(
        json!({"ok": false, "reply_to": id, "error": {"code": 2, "msg": "message text is missing"}})
            .to_string(),
    );

    let err = within(send).await.unwrap().unwrap_err();
    let RtmError::Rejected(e) = &err else { panic!("expected rejection, got {err:?}") };
    assert_eq!(e.code, 2);
    assert_eq!(e.msg, "message text is missing");

    session.close().await;
}

#[tokio::test]
async fn send_requires_a_live_connection() {
    let (conn, _accepted) = MockConnector::new();
    let session = Session::new(test_config(), conn).unwrap();

    assert_eq!(session.state(), ConnectionState::Disconnected);
    let err = session.send(OutgoingMessage::typing("C1")).await.unwrap_err();
    assert!(matches!(err, RtmError::NotConnected));
    assert_eq!(session.pending_len(), 0);
}

#[tokio::test]
async fn transport_failure_resolves_every_pending_send() {
    let (conn, mut accepted) = MockConnector::new();
    let session = Session::new(test_config(), conn).unwrap();
    let mut sub = session.subscribe();
    session.start().unwrap();
    let mut server = within(accepted.recv()).await.unwrap();
    session.wait_for_state(ConnectionState::Connected, WAIT).await.unwrap();
    assert_eq!(session.generation(), 1);

    let mut waits = Vec::new();
    for n in 0..3 {
        let w = session
            .send_deferred(OutgoingMessage::message("C1", format!("m{n}")))
            .await
            .unwrap();
        waits.push(w);
    }
    for _ in 0..3 {
        server.next_sent().await;
    }
    assert_eq!(session.pending_len(), 3);

    server.fail("connection reset");
    for w in waits {
        let err = w.wait(WAIT).await.unwrap_err();
        assert!(matches!(err, RtmError::ConnectionLost), "got {err:?}");
    }
    assert_eq!(session.pending_len(), 0);

    let (generation, reason) = next_disconnect(&mut sub).await;
    assert_eq!(generation, 1);
    assert!(reason.contains("connection reset"), "reason: {reason}");

    // Backoff, then a fresh generation; ids keep counting.
    let mut server = within(accepted.recv()).await.unwrap();
    session.wait_for_state(ConnectionState::Connected, WAIT).await.unwrap();
    assert_eq!(session.generation(), 2);

    let w = session.send_deferred(OutgoingMessage::typing("C1")).await.unwrap();
    assert_eq!(w.id(), 4);
    assert_eq!(server.next_sent().await["id"], 4);

    session.close().await;
}

#[tokio::test]
async fn session_resume_redirects_the_next_connect() {
    let (conn, mut accepted) = MockConnector::new();
    let session = Session::new(test_config(), conn.clone()).unwrap();
    let mut sub = session.subscribe();
    session.start().unwrap();
    let server = within(accepted.recv()).await.unwrap();
    assert_eq!(server.url, "wss://rtm.example/ws");

    server.push(r#"{"type":"session_resume","url":"wss://resume.example/abc"}"#);
    let ev = next_frame_event(&mut sub).await;
    let Some(RtmEvent::ReconnectUrl(r)) = ev.as_event() else { panic!("got {ev:?}") };
    assert_eq!(r.url, "wss://resume.example/abc");
    assert_eq!(session.current_url(), "wss://resume.example/abc");

    // Peer hangs up; the reconnect dials the new address.
    drop(server);
    let server = within(accepted.recv()).await.unwrap();
    assert_eq!(server.url, "wss://resume.example/abc");
    assert_eq!(
        conn.dialed(),
        vec!["wss://rtm.example/ws".to_string(), "wss://resume.example/abc".to_string()]
    );

    session.close().await;
}

#[tokio::test]
async fn concurrent_sends_get_distinct_ids() {
    let (conn, mut accepted) = MockConnector::new();
    let session = Session::new(test_config(), conn).unwrap();
    session.start().unwrap();
    let mut server = within(accepted.recv()).await.unwrap();
    session.wait_for_state(ConnectionState::Connected, WAIT).await.unwrap();

    let mut tasks = Vec::new();
    for n in 0..20 {
        let session = session.clone();
        tasks.push(tokio::spawn(async move {
            session
                .send_deferred(OutgoingMessage::message("C1", format!("m{n}")))
                .await
                .unwrap()
        }));
    }

    let mut waits = Vec::new();
    for t in tasks {
        waits.push(within(t).await.unwrap());
    }
    let ids: HashSet<u64> = waits.iter().map(|w| w.id()).collect();
    assert_eq!(ids.len(), 20);
    assert_eq!(session.pending_len(), 20);

    let mut wire_ids = HashSet::new();
    for _ in 0..20 {
        wire_ids.insert(server.next_sent().await["id"].as_u64().unwrap());
    }
    assert_eq!(wire_ids, ids);

    drop(waits);
    assert_eq!(session.pending_len(), 0);

    session.close().await;
}

#[tokio::test]
async fn events_keep_arrival_order_around_bad_frames() {
    let (conn, mut accepted) = MockConnector::new();
    let session = Session::new(test_config(), conn).unwrap();
    let mut sub = session.subscribe();
    session.start().unwrap();
    let server = within(accepted.recv()).await.unwrap();

    server.push(r#"{"type":"hello"}"#);
    server.push(r#"{"type":"user_typing","channel":"C1","user":"U1"}"#);
    server.push(r#"{"type":"presence_change","user":"U2""#);
    server.push(r#"{"type":"brand_new_thing","x":1}"#);
    server.push(r#"{"type":"presence_change","user":"U2","presence":"away"}"#);

    let ev = next_frame_event(&mut sub).await;
    assert!(matches!(ev.as_event(), Some(RtmEvent::Hello)));

    let ev = next_frame_event(&mut sub).await;
    let Some(RtmEvent::UserTyping(t)) = ev.as_event() else { panic!("got {ev:?}") };
    assert_eq!((t.user.as_str(), t.channel.as_str()), ("U1", "C1"));

    let ev = next_frame_event(&mut sub).await;
    assert!(matches!(ev.as_ref(), SessionEvent::DecodeError(DecodeError::Malformed(_))));

    let ev = next_frame_event(&mut sub).await;
    let Some(RtmEvent::Unknown { event_type, .. }) = ev.as_event() else { panic!("got {ev:?}") };
    assert_eq!(event_type.as_deref(), Some("brand_new_thing"));

    let ev = next_frame_event(&mut sub).await;
    let Some(RtmEvent::PresenceChange(p)) = ev.as_event() else { panic!("got {ev:?}") };
    assert_eq!(p.presence, "away");

    assert_eq!(session.state(), ConnectionState::Connected);
    session.close().await;
}

#[tokio::test]
async fn close_is_terminal() {
    let (conn, mut accepted) = MockConnector::new();
    let session = Session::new(test_config(), conn.clone()).unwrap();
    let mut sub = session.subscribe();
    session.start().unwrap();
    let _server = within(accepted.recv()).await.unwrap();
    session.wait_for_state(ConnectionState::Connected, WAIT).await.unwrap();

    let wait = session.send_deferred(OutgoingMessage::typing("C1")).await.unwrap();
    session.close().await;

    assert!(matches!(wait.wait(WAIT).await, Err(RtmError::Closed)));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    let (generation, reason) = next_disconnect(&mut sub).await;
    assert_eq!(generation, 1);
    assert_eq!(reason, "closed");

    let err = session.send(OutgoingMessage::typing("C1")).await.unwrap_err();
    assert!(matches!(err, RtmError::NotConnected));
    assert!(matches!(session.start(), Err(RtmError::BadRequest(_))));
    assert!(matches!(session.reconnect(), Err(RtmError::Closed)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(conn.dialed().len(), 1);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let (conn, _accepted) = MockConnector::new();
    conn.fail_next(100);
    let cfg = test_config().with_reconnect(ReconnectSection {
        enabled: true,
        initial_delay_ms: 10,
        max_delay_ms: 50,
        max_attempts: 3,
    });
    let session = Session::new(cfg, conn.clone()).unwrap();
    let mut sub = session.subscribe();
    session.start().unwrap();

    let mut delays = Vec::new();
    let reason = loop {
        let ev = within(sub.recv()).await.unwrap();
        match ev.as_ref() {
            SessionEvent::ReconnectScheduled { delay, .. } => delays.push(*delay),
            SessionEvent::Disconnected { reason, .. } => break reason.clone(),
            _ => {}
        }
    };

    assert!(reason.contains("giving up after 3"), "reason: {reason}");
    assert_eq!(delays, vec![Duration::from_millis(10), Duration::from_millis(20)]);
    assert_eq!(conn.dialed().len(), 3);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(matches!(
        session.send(OutgoingMessage::typing("C1")).await,
        Err(RtmError::NotConnected)
    ));
}

#[tokio::test]
async fn manual_reconnect_starts_a_new_generation() {
    let (conn, mut accepted) = MockConnector::new();
    let session = Session::new(test_config(), conn).unwrap();
    let mut sub = session.subscribe();
    session.start().unwrap();
    let _first = within(accepted.recv()).await.unwrap();
    session.wait_for_state(ConnectionState::Connected, WAIT).await.unwrap();

    session.reconnect().unwrap();
    let (generation, reason) = next_disconnect(&mut sub).await;
    assert_eq!(generation, 1);
    assert_eq!(reason, "reconnect requested");

    let _second = within(accepted.recv()).await.unwrap();
    session.wait_for_state(ConnectionState::Connected, WAIT).await.unwrap();
    assert_eq!(session.generation(), 2);

    session.close().await;
}

#[tokio::test]
async fn unanswered_ping_forces_reconnect() {
    let (conn, mut accepted) = MockConnector::new();
    let cfg = test_config().with_ping_interval_ms(1_000).with_ack_timeout_ms(200);
    let session = Session::new(cfg, conn).unwrap();
    let mut sub = session.subscribe();
    session.start().unwrap();
    let mut server = within(accepted.recv()).await.unwrap();

    let ping = server.next_sent().await;
    assert_eq!(ping["type"], "ping");

    let (generation, reason) = next_disconnect(&mut sub).await;
    assert_eq!(generation, 1);
    assert_eq!(reason, "ping timeout");

    let _second = within(accepted.recv()).await.unwrap();
    session.close().await;
}

#[tokio::test]
async fn answered_ping_keeps_the_connection() {
    let (conn, mut accepted) = MockConnector::new();
    let cfg = test_config().with_ping_interval_ms(1_000).with_ack_timeout_ms(500);
    let session = Session::new(cfg, conn).unwrap();
    session.start().unwrap();
    let mut server = within(accepted.recv()).await.unwrap();

    let ping = server.next_sent().await;
    let id = ping["id"].as_u64().unwrap();
    server.push(json!({"type": "pong", "reply_to": id}).to_string());

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(session.generation(), 1);
    assert_eq!(session.pending_len(), 0);

    session.close().await;
}

#[tokio::test]
async fn send_timeout_covers_a_full_outbound_queue() {
    let (conn, mut accepted) = MockConnector::new();
    conn.stall_writes();
    let mut cfg = test_config().with_ack_timeout_ms(10_000);
    cfg.outbound_buffer = 1;
    let session = Session::new(cfg, conn).unwrap();
    session.start().unwrap();
    let _server = within(accepted.recv()).await.unwrap();
    session.wait_for_state(ConnectionState::Connected, WAIT).await.unwrap();

    // The writer holds the first frame, the queue holds the second, and the
    // third can only wait for room.
    for n in 0..3 {
        let started = Instant::now();
        let res = within(session.send_with_timeout(
            OutgoingMessage::message("C1", format!("m{n}")),
            Duration::from_millis(100),
        ))
        .await;
        assert!(matches!(res, Err(RtmError::Timeout)), "send {n}: {res:?}");
        assert!(started.elapsed() < Duration::from_secs(1), "send {n} took {:?}", started.elapsed());
    }
    assert_eq!(session.pending_len(), 0);
    assert_eq!(session.state(), ConnectionState::Connected);

    session.close().await;
}

#[tokio::test]
async fn wedged_writer_ends_the_generation() {
    let (conn, mut accepted) = MockConnector::new();
    conn.stall_writes();
    let cfg = test_config().with_ack_timeout_ms(200);
    let session = Session::new(cfg, conn).unwrap();
    let mut sub = session.subscribe();
    session.start().unwrap();
    let _server = within(accepted.recv()).await.unwrap();
    session.wait_for_state(ConnectionState::Connected, WAIT).await.unwrap();

    let wait = session.send_deferred(OutgoingMessage::typing("C1")).await.unwrap();
    let err = wait.wait(WAIT).await.unwrap_err();
    assert!(matches!(err, RtmError::ConnectionLost), "got {err:?}");

    let (generation, reason) = next_disconnect(&mut sub).await;
    assert_eq!(generation, 1);
    assert!(reason.contains("write timed out"), "reason: {reason}");

    let _second = within(accepted.recv()).await.unwrap();
    session.close().await;
}

#[tokio::test]
async fn dropping_the_last_handle_closes_the_session() {
    let (conn, mut accepted) = MockConnector::new();
    let session = Session::new(test_config(), conn.clone()).unwrap();
    let mut sub = session.subscribe();
    session.start().unwrap();
    let mut server = within(accepted.recv()).await.unwrap();
    session.wait_for_state(ConnectionState::Connected, WAIT).await.unwrap();

    let clone = session.clone();
    drop(session);
    assert_eq!(clone.state(), ConnectionState::Connected);
    drop(clone);

    let (generation, reason) = next_disconnect(&mut sub).await;
    assert_eq!(generation, 1);
    assert_eq!(reason, "closed");
    // Writer flushed and released the connection.
    assert!(within(server.outbound.recv()).await.is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(conn.dialed().len(), 1);
}
