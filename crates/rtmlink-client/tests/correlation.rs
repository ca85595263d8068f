#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use rtmlink_client::correlation::{AckWait, CorrelationTable, PendingSend};
use rtmlink_core::{Delivered, RtmError};

fn delivered(id: u64) -> Delivered {
    Delivered {
        reply_to: id,
        ts: "1.0".into(),
        text: String::new(),
    }
}

#[test]
fn duplicate_id_is_rejected() {
    let table = CorrelationTable::new();
    let (a, _rx_a) = PendingSend::new("a");
    let (b, _rx_b) = PendingSend::new("b");

    table.register(7, a).unwrap();
    let err = table.register(7, b).unwrap_err();
    assert!(matches!(err, RtmError::DuplicateId(7)));
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn resolve_fulfils_once() {
    let table = CorrelationTable::new();
    let (p, rx) = PendingSend::new(r#"{"type":"message","id":42}"#);
    table.register(42, p).unwrap();

    assert!(table.resolve(42, Ok(delivered(42))));
    assert!(!table.resolve(42, Err(RtmError::ConnectionLost)));
    assert!(table.is_empty());

    let outcome = rx.await.unwrap().unwrap();
    assert_eq!(outcome.reply_to, 42);
}

#[tokio::test]
async fn drain_resolves_everything_in_id_order() {
    let table = CorrelationTable::new();
    let mut receivers = Vec::new();
    for id in [3_u64, 1, 2] {
        let (p, rx) = PendingSend::new(format!("frame-{id}"));
        table.register(id, p).unwrap();
        receivers.push(rx);
    }

    let drained = table.drain_generation(RtmError::ConnectionLost);
    let ids: Vec<u64> = drained.iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(drained[0].payload, "frame-1");
    assert!(table.is_empty());

    for rx in receivers {
        assert!(matches!(rx.await.unwrap(), Err(RtmError::ConnectionLost)));
    }
    assert!(table.drain_generation(RtmError::Closed).is_empty());

    // A late ack for a drained id changes nothing.
    assert!(!table.resolve(1, Ok(delivered(1))));
    assert!(table.is_empty());
}

#[test]
fn abandon_removes_without_resolving() {
    let table = CorrelationTable::new();
    let (p, mut rx) = PendingSend::new("x");
    table.register(1, p).unwrap();

    assert!(table.abandon(1));
    assert!(!table.abandon(1));
    assert!(!table.contains(1));
    // Sender dropped without a value.
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn wait_timeout_clears_the_entry() {
    let table = CorrelationTable::new();
    let (p, rx) = PendingSend::new("x");
    table.register(5, p).unwrap();

    let wait = AckWait::new(5, table.clone(), rx);
    let err = wait.wait(Duration::from_millis(20)).await.unwrap_err();
    assert!(matches!(err, RtmError::Timeout));
    assert!(!table.contains(5));
    // A late ack finds nothing.
    assert!(!table.resolve(5, Ok(delivered(5))));
}

#[tokio::test]
async fn wait_returns_resolved_outcome() {
    let table = CorrelationTable::new();
    let (p, rx) = PendingSend::new("x");
    table.register(9, p).unwrap();
    let wait = AckWait::new(9, table.clone(), rx);

    table.resolve(9, Ok(delivered(9)));
    let outcome = wait.wait(Duration::from_secs(1)).await.unwrap();
    assert_eq!(outcome, delivered(9));
}

#[test]
fn dropping_the_waiter_clears_the_entry() {
    let table = CorrelationTable::new();
    let (p, rx) = PendingSend::new("x");
    table.register(11, p).unwrap();

    let wait = AckWait::new(11, table.clone(), rx);
    assert_eq!(wait.id(), 11);
    drop(wait);
    assert!(table.is_empty());

    let (p, rx) = PendingSend::new("y");
    table.register(12, p).unwrap();
    let wait = AckWait::new(12, table.clone(), rx);
    assert!(wait.cancel());
    assert!(table.is_empty());
}
