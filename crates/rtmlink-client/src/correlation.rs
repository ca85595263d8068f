//! Correlation table: outbound messages awaiting acknowledgment.
//!
//! One mutex guards the whole table. Resolution only completes a oneshot
//! while the lock is held; caller logic runs on the caller's own task.
//! Every entry is resolved at most once: `resolve`, `abandon` and
//! `drain_generation` all remove the entry they touch, so whichever comes
//! second finds nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use rtmlink_core::error::{Result, RtmError};
use rtmlink_core::protocol::ack::Delivered;

/// What a waiting sender eventually receives.
pub type AckOutcome = Result<Delivered>;

/// One outbound message awaiting its acknowledgment.
#[derive(Debug)]
pub struct PendingSend {
    payload: String,
    slot: oneshot::Sender<AckOutcome>,
}

impl PendingSend {
    /// New pending send and the receiver its outcome will arrive on.
    pub fn new(payload: impl Into<String>) -> (Self, oneshot::Receiver<AckOutcome>) {
        let (slot, rx) = oneshot::channel();
        (
            Self {
                payload: payload.into(),
                slot,
            },
            rx,
        )
    }

    /// The encoded frame as it was written to the transport.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    fn fulfil(self, outcome: AckOutcome) {
        // The waiter may already have given up; nothing to do then.
        let _ = self.slot.send(outcome);
    }
}

/// A pending send that was still unresolved when its generation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Undelivered {
    pub id: u64,
    pub payload: String,
}

/// Shared table of pending sends keyed by correlation id.
#[derive(Debug, Clone, Default)]
pub struct CorrelationTable {
    inner: Arc<Mutex<HashMap<u64, PendingSend>>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, PendingSend>> {
        // A poisoned table still holds valid entries; keep serving them.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a pending send. Ids come from the session's counter, so a
    /// collision is a programming error.
    pub fn register(&self, id: u64, pending: PendingSend) -> Result<()> {
        let mut map = self.lock();
        if map.contains_key(&id) {
            return Err(RtmError::DuplicateId(id));
        }
        map.insert(id, pending);
        Ok(())
    }

    /// Fulfil and remove the entry for `id`. Returns `false` when nothing was
    /// pending under that id (late or duplicate ack).
    pub fn resolve(&self, id: u64, outcome: AckOutcome) -> bool {
        let mut map = self.lock();
        match map.remove(&id) {
            Some(pending) => {
                pending.fulfil(outcome);
                true
            }
            None => false,
        }
    }

    /// Remove the entry without resolving it. Returns `false` if it was
    /// already resolved.
    pub fn abandon(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Resolve every pending entry with `err` and empty the table.
    pub fn drain_generation(&self, err: RtmError) -> Vec<Undelivered> {
        let mut map = self.lock();
        let mut drained: Vec<Undelivered> = map
            .drain()
            .map(|(id, pending)| {
                let payload = pending.payload.clone();
                pending.fulfil(Err(err.clone()));
                Undelivered { id, payload }
            })
            .collect();
        drained.sort_by_key(|u| u.id);
        drained
    }

    pub fn contains(&self, id: u64) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Caller side of a pending send.
///
/// Dropping it before the outcome arrives removes the table entry.
#[derive(Debug)]
pub struct AckWait {
    id: u64,
    table: CorrelationTable,
    rx: oneshot::Receiver<AckOutcome>,
    settled: bool,
}

impl AckWait {
    pub fn new(id: u64, table: CorrelationTable, rx: oneshot::Receiver<AckOutcome>) -> Self {
        Self {
            id,
            table,
            rx,
            settled: false,
        }
    }

    /// Correlation id attached to the outbound message.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the acknowledgment, giving up after `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> AckOutcome {
        let res = tokio::time::timeout(timeout, &mut self.rx).await;
        self.settled = true;
        match res {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RtmError::ConnectionLost),
            Err(_) => self.expire(),
        }
    }

    /// Deadline passed: drop the entry unless a resolution got there first,
    /// in which case that outcome wins.
    fn expire(&mut self) -> AckOutcome {
        self.settled = true;
        if self.table.abandon(self.id) {
            return Err(RtmError::Timeout);
        }
        self.rx.try_recv().unwrap_or(Err(RtmError::Timeout))
    }

    /// Stop waiting and drop the table entry. Returns `false` if the send
    /// had already been resolved.
    pub fn cancel(mut self) -> bool {
        self.settled = true;
        self.table.abandon(self.id)
    }
}

impl Drop for AckWait {
    fn drop(&mut self) {
        if !self.settled {
            self.table.abandon(self.id);
        }
    }
}
