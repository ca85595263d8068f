use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout_at, Instant, Interval, MissedTickBehavior};
use tracing::Instrument;

use rtmlink_core::classify::{Classifier, Inbound};
use rtmlink_core::error::{Result, RtmError};
use rtmlink_core::protocol::ack::Delivered;
use rtmlink_core::protocol::event::RtmEvent;
use rtmlink_core::protocol::outbound::OutgoingMessage;

use crate::config::SessionConfig;
use crate::correlation::{AckWait, CorrelationTable, PendingSend};
use crate::dispatch::{EventConsumer, EventDispatcher, SessionEvent, Subscription, SubscriptionId};
use crate::transport::{Connection, Connector, FrameSink, FrameSource};

use super::backoff::Backoff;
use super::state::{ConnectionState, SessionState};

/// How long a closing writer gets to flush before it is aborted.
const WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

enum Control {
    /// `generation: None` targets whatever connection is live.
    Reconnect {
        generation: Option<u64>,
        reason: String,
    },
    Close,
}

enum ConnectionEnd {
    Closed,
    Lost(String),
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One logical real-time client.
///
/// Cheap to clone; every clone drives the same connection. The supervisor
/// task spawned by `start` is the only reader of the transport and the only
/// writer of connection state. It stops on `close`, or once the last clone
/// is dropped.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
    _close_on_drop: Arc<CloseOnDrop>,
}

/// Owned by the handles only, never by the supervisor.
struct CloseOnDrop(mpsc::UnboundedSender<Control>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        let _ = self.0.send(Control::Close);
    }
}

struct Inner {
    cfg: SessionConfig,
    connector: Arc<dyn Connector>,
    classifier: Classifier,
    state: Mutex<SessionState>,
    state_tx: watch::Sender<ConnectionState>,
    pending: CorrelationTable,
    dispatcher: EventDispatcher,
    control_tx: mpsc::UnboundedSender<Control>,
    control_rx: Mutex<Option<mpsc::UnboundedReceiver<Control>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(cfg: SessionConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        Self::with_classifier(cfg, connector, Classifier::default())
    }

    /// Like `new`, with a custom event registry behind the classifier.
    pub fn with_classifier(
        cfg: SessionConfig,
        connector: Arc<dyn Connector>,
        classifier: Classifier,
    ) -> Result<Self> {
        cfg.validate()?;

        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::new(cfg.event_buffer);
        let state = Mutex::new(SessionState::new(cfg.url.clone()));

        Ok(Self {
            _close_on_drop: Arc::new(CloseOnDrop(control_tx.clone())),
            inner: Arc::new(Inner {
                cfg,
                connector,
                classifier,
                state,
                state_tx,
                pending: CorrelationTable::new(),
                dispatcher,
                control_tx,
                control_rx: Mutex::new(Some(control_rx)),
                task: Mutex::new(None),
            }),
        })
    }

    /// Spawn the supervisor. Fails if already started or closed.
    pub fn start(&self) -> Result<()> {
        let Some(control_rx) = lock(&self.inner.control_rx).take() else {
            return Err(RtmError::BadRequest("session already started or closed".into()));
        };

        let span = tracing::info_span!("rtm_session", url = %self.inner.cfg.url);
        let handle = tokio::spawn(Arc::clone(&self.inner).run(control_rx).instrument(span));
        *lock(&self.inner.task) = Some(handle);
        Ok(())
    }

    /// Close the connection and stop reconnecting. Pending sends resolve
    /// with `RtmError::Closed`. Idempotent.
    pub async fn close(&self) {
        if lock(&self.inner.control_rx).take().is_some() {
            // Never started; nothing to tear down.
            return;
        }

        let _ = self.inner.control_tx.send(Control::Close);
        let handle = lock(&self.inner.task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "session task ended abnormally");
            }
        }
    }

    /// Drop the live connection and reconnect through the usual backoff path.
    pub fn reconnect(&self) -> Result<()> {
        self.inner
            .control_tx
            .send(Control::Reconnect {
                generation: None,
                reason: "reconnect requested".into(),
            })
            .map_err(|_| RtmError::Closed)
    }

    /// Send and wait for the acknowledgment using the configured timeout.
    pub async fn send(&self, msg: OutgoingMessage) -> Result<Delivered> {
        self.send_with_timeout(msg, self.inner.cfg.ack_timeout()).await
    }

    /// One deadline covers both queueing the frame and the acknowledgment.
    pub async fn send_with_timeout(&self, msg: OutgoingMessage, timeout: Duration) -> Result<Delivered> {
        let deadline = Instant::now() + timeout;
        let wait = self.enqueue(msg, Some(deadline)).await?;
        wait.wait(deadline.saturating_duration_since(Instant::now())).await
    }

    /// Send and return the waiter without awaiting the acknowledgment.
    ///
    /// Rejected with `NotConnected` unless the session is `Connected`. Waits
    /// for room in the outbound queue; drop the future to give up.
    pub async fn send_deferred(&self, msg: OutgoingMessage) -> Result<AckWait> {
        self.enqueue(msg, None).await
    }

    async fn enqueue(&self, msg: OutgoingMessage, deadline: Option<Instant>) -> Result<AckWait> {
        let (wait, frame, writer) = self.inner.issue(&msg)?;
        tracing::trace!(id = wait.id(), msg_type = ?msg.msg_type(), "outbound message queued");

        // On any error `wait` is dropped here, which clears the table entry.
        let queued = match deadline {
            Some(deadline) => timeout_at(deadline, writer.send(frame))
                .await
                .map_err(|_| RtmError::Timeout)?,
            None => writer.send(frame).await,
        };
        if queued.is_err() {
            // Writer is gone with its generation.
            return Err(RtmError::ConnectionLost);
        }
        Ok(wait)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Number of the live connection, or of the next one while disconnected.
    pub fn generation(&self) -> u64 {
        lock(&self.inner.state).generation
    }

    /// Address the next (re)connect will dial.
    pub fn current_url(&self) -> String {
        lock(&self.inner.state).url.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.len()
    }

    /// Wait until the session reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> Result<()> {
        let mut rx = self.inner.state_tx.subscribe();
        let reached = tokio::time::timeout(timeout, rx.wait_for(|s| *s == target))
            .await
            .map(|r| r.map(|_| ()));
        match reached {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RtmError::Closed),
            Err(_) => Err(RtmError::Timeout),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.dispatcher.subscribe()
    }

    pub fn subscribe_consumer(&self, consumer: Arc<dyn EventConsumer>) -> SubscriptionId {
        self.inner.dispatcher.subscribe_consumer(consumer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.dispatcher.unsubscribe(id)
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.cfg
    }
}

impl Inner {
    /// Mutate state under the lock and publish the resulting connection state.
    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut st = lock(&self.state);
        let r = f(&mut st);
        let conn = st.conn;
        self.state_tx.send_if_modified(|cur| {
            if *cur == conn {
                return false;
            }
            *cur = conn;
            true
        });
        r
    }

    /// Assign an id and register the pending send in one critical section.
    fn issue(&self, msg: &OutgoingMessage) -> Result<(AckWait, String, mpsc::Sender<String>)> {
        let mut st = lock(&self.state);
        if st.conn != ConnectionState::Connected {
            return Err(RtmError::NotConnected);
        }
        let writer = st.writer.clone().ok_or(RtmError::NotConnected)?;

        let id = st.next_correlation_id();
        let frame = msg.encode(id)?;
        let (pending, rx) = PendingSend::new(frame.clone());
        self.pending.register(id, pending)?;

        Ok((AckWait::new(id, self.pending.clone(), rx), frame, writer))
    }

    async fn run(self: Arc<Self>, mut control: mpsc::UnboundedReceiver<Control>) {
        let backoff = Backoff::from(&self.cfg.reconnect);
        let mut failures: u32 = 0;

        loop {
            let url = self.update(SessionState::begin_connect);
            tracing::debug!(attempt = failures, %url, "connecting");
            self.dispatcher.publish(SessionEvent::Connecting {
                attempt: failures,
                url: url.clone(),
            });

            let Some(connected) = self.connect(&url, &mut control).await else {
                self.finish_closed("closed while connecting");
                return;
            };

            match connected {
                Ok((sink, source)) => {
                    failures = 0;
                    match self.serve(sink, source, &mut control).await {
                        ConnectionEnd::Closed => return,
                        ConnectionEnd::Lost(_) if !self.cfg.reconnect.enabled => {
                            tracing::info!("reconnect disabled, session stopped");
                            return;
                        }
                        ConnectionEnd::Lost(_) => {}
                    }
                }
                Err(e) => {
                    self.update(SessionState::connect_failed);
                    failures = failures.saturating_add(1);
                    tracing::warn!(attempt = failures, error = %e, %url, "connect failed");

                    let rc = &self.cfg.reconnect;
                    if !rc.enabled || (rc.max_attempts > 0 && failures >= rc.max_attempts) {
                        let reason = format!("giving up after {failures} failed connect attempts: {e}");
                        tracing::error!(%reason, "session stopped");
                        self.finish(reason);
                        return;
                    }
                }
            }

            // A loss and the first failed connect both wait the initial delay.
            let delay = backoff.delay_for_attempt(failures.saturating_sub(1));
            tracing::debug!(attempt = failures, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
            self.dispatcher.publish(SessionEvent::ReconnectScheduled {
                attempt: failures,
                delay,
            });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                ctl = control.recv() => match ctl {
                    // Skip the rest of the delay.
                    Some(Control::Reconnect { .. }) => {}
                    Some(Control::Close) | None => {
                        self.finish_closed("closed during backoff");
                        return;
                    }
                }
            }
        }
    }

    /// `None` when a close request arrived first.
    async fn connect(
        &self,
        url: &str,
        control: &mut mpsc::UnboundedReceiver<Control>,
    ) -> Option<Result<Connection>> {
        let attempt = tokio::time::timeout(self.cfg.connect_timeout(), self.connector.connect(url));
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                res = &mut attempt => {
                    return Some(match res {
                        Ok(r) => r,
                        Err(_) => Err(RtmError::Transport("connect timed out".into())),
                    });
                }
                ctl = control.recv() => match ctl {
                    // Already dialing a fresh connection.
                    Some(Control::Reconnect { .. }) => {}
                    Some(Control::Close) | None => return None,
                }
            }
        }
    }

    /// Drive one connection generation until it ends.
    async fn serve(
        &self,
        sink: Box<dyn FrameSink>,
        mut source: Box<dyn FrameSource>,
        control: &mut mpsc::UnboundedReceiver<Control>,
    ) -> ConnectionEnd {
        let (out_tx, out_rx) = mpsc::channel::<String>(self.cfg.outbound_buffer);
        let (generation, url) = self.update(|st| (st.connected(out_tx), st.url.clone()));
        tracing::info!(generation, %url, "connected");
        self.dispatcher.publish(SessionEvent::Connected { generation, url });

        let mut writer = tokio::spawn(write_loop(sink, out_rx, self.cfg.ack_timeout()));
        let mut writer_done = false;
        let mut ping = self.cfg.ping_interval().map(|period| {
            let mut iv = interval_at(Instant::now() + period, period);
            iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
            iv
        });

        let end = loop {
            tokio::select! {
                frame = source.recv() => match frame {
                    Ok(Some(text)) => self.handle_frame(&text),
                    Ok(None) => break ConnectionEnd::Lost("closed by peer".into()),
                    Err(e) => break ConnectionEnd::Lost(e.to_string()),
                },
                res = &mut writer => {
                    writer_done = true;
                    let reason = match res {
                        Ok(Ok(())) => "writer stopped".to_string(),
                        Ok(Err(e)) => e.to_string(),
                        Err(e) => format!("writer task failed: {e}"),
                    };
                    break ConnectionEnd::Lost(reason);
                }
                ctl = control.recv() => match ctl {
                    Some(Control::Close) | None => break ConnectionEnd::Closed,
                    Some(Control::Reconnect { generation: target, reason }) => {
                        if target.map_or(true, |g| g == generation) {
                            break ConnectionEnd::Lost(reason);
                        }
                        tracing::debug!(stale = ?target, generation, "ignoring reconnect for an older generation");
                    }
                },
                _ = next_tick(&mut ping) => self.send_ping(generation),
            }
        };

        let (next, err) = match &end {
            ConnectionEnd::Closed => (ConnectionState::Disconnected, RtmError::Closed),
            ConnectionEnd::Lost(_) if !self.cfg.reconnect.enabled => {
                (ConnectionState::Disconnected, RtmError::ConnectionLost)
            }
            ConnectionEnd::Lost(_) => (ConnectionState::Reconnecting, RtmError::ConnectionLost),
        };
        // Same critical section as the state flip: no send can register into
        // the ended generation after this.
        let (ended, drained) = self.update(|st| {
            let ended = st.end_generation(next);
            (ended, self.pending.drain_generation(err))
        });
        if !drained.is_empty() {
            let ids: Vec<u64> = drained.iter().map(|u| u.id).collect();
            tracing::info!(generation = ended, count = drained.len(), ?ids, "pending sends resolved as undelivered");
        }

        if !writer_done {
            match end {
                // The writer's queue closed with the state's sender; let it
                // flush and close the sink.
                ConnectionEnd::Closed => {
                    if tokio::time::timeout(WRITER_SHUTDOWN_TIMEOUT, &mut writer).await.is_err() {
                        writer.abort();
                    }
                }
                ConnectionEnd::Lost(_) => writer.abort(),
            }
        }

        let reason = match &end {
            ConnectionEnd::Closed => "closed".to_string(),
            ConnectionEnd::Lost(reason) => reason.clone(),
        };
        match end {
            ConnectionEnd::Closed => tracing::info!(generation = ended, "session closed"),
            ConnectionEnd::Lost(_) => tracing::warn!(generation = ended, %reason, "connection lost"),
        }
        self.dispatcher.publish(SessionEvent::Disconnected {
            generation: ended,
            reason,
        });

        end
    }

    fn handle_frame(&self, text: &str) {
        match self.classifier.classify(text) {
            Ok(Inbound::Ack(ack)) => {
                let id = ack.reply_to;
                if !self.pending.resolve(id, ack.into_outcome()) {
                    tracing::debug!(reply_to = id, "discarding ack with no pending send");
                }
            }
            Ok(Inbound::Event(ev)) => {
                if let RtmEvent::ReconnectUrl(r) = &ev {
                    self.update(|st| st.url = r.url.clone());
                    tracing::info!(url = %r.url, "reconnect url updated");
                }
                tracing::trace!(event_type = ?ev.event_type(), "event");
                self.dispatcher.publish(SessionEvent::Event(ev));
            }
            Err(e) => {
                tracing::warn!(error = %e, "frame decode failed");
                self.dispatcher.publish(SessionEvent::DecodeError(e));
            }
        }
    }

    /// Keepalive. An unanswered ping forces a reconnect of its generation.
    fn send_ping(&self, generation: u64) {
        let (wait, frame, writer) = match self.issue(&OutgoingMessage::ping()) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "ping skipped");
                return;
            }
        };
        // Never block the read loop on a full outbound queue. A wedged sink
        // is caught by the writer's own deadline.
        if writer.try_send(frame).is_err() {
            tracing::warn!(generation, "outbound queue full, ping skipped");
            return;
        }

        let control = self.control_tx.clone();
        let timeout = self.cfg.ack_timeout();
        tokio::spawn(async move {
            let id = wait.id();
            if let Err(RtmError::Timeout) = wait.wait(timeout).await {
                tracing::warn!(generation, reply_to = id, "ping timed out");
                let _ = control.send(Control::Reconnect {
                    generation: Some(generation),
                    reason: "ping timeout".into(),
                });
            }
        });
    }

    /// Terminal stop outside of a live connection.
    fn finish(&self, reason: String) {
        let generation = self.update(|st| {
            st.conn = ConnectionState::Disconnected;
            st.generation
        });
        self.pending.drain_generation(RtmError::Closed);
        self.dispatcher.publish(SessionEvent::Disconnected { generation, reason });
    }

    fn finish_closed(&self, reason: &str) {
        tracing::info!(reason, "session closed");
        self.finish(reason.to_string());
    }
}

/// A frame that cannot be written within `write_timeout` ends the generation.
async fn write_loop(
    mut sink: Box<dyn FrameSink>,
    mut rx: mpsc::Receiver<String>,
    write_timeout: Duration,
) -> Result<()> {
    while let Some(frame) = rx.recv().await {
        tokio::time::timeout(write_timeout, sink.send(frame))
            .await
            .map_err(|_| RtmError::Transport("write timed out".into()))??;
    }
    sink.close().await
}

async fn next_tick(ping: &mut Option<Interval>) {
    match ping {
        Some(iv) => {
            iv.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
