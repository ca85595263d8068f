use tokio::sync::mpsc;

/// Connection state machine.
///
/// `Disconnected -> Connecting -> Connected -> Reconnecting -> Connected ...`;
/// `Disconnected` is terminal after an explicit close or exhausted retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

/// Mutable session state. Only the supervisor task changes `conn`,
/// `generation` and `writer`; senders only take correlation ids.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) conn: ConnectionState,
    pub(crate) generation: u64,
    pub(crate) url: String,
    next_id: u64,
    pub(crate) writer: Option<mpsc::Sender<String>>,
}

impl SessionState {
    pub(crate) fn new(url: String) -> Self {
        Self {
            conn: ConnectionState::Disconnected,
            generation: 1,
            url,
            next_id: 1,
            writer: None,
        }
    }

    /// Start a connection attempt and return the address to dial.
    pub(crate) fn begin_connect(&mut self) -> String {
        if self.conn == ConnectionState::Disconnected {
            self.conn = ConnectionState::Connecting;
        }
        self.url.clone()
    }

    pub(crate) fn connect_failed(&mut self) {
        if self.conn == ConnectionState::Connecting {
            self.conn = ConnectionState::Disconnected;
        }
    }

    pub(crate) fn connected(&mut self, writer: mpsc::Sender<String>) -> u64 {
        self.conn = ConnectionState::Connected;
        self.writer = Some(writer);
        self.generation
    }

    /// Close out the live generation and return its number.
    pub(crate) fn end_generation(&mut self, next: ConnectionState) -> u64 {
        let ended = self.generation;
        self.writer = None;
        self.generation += 1;
        self.conn = next;
        ended
    }

    /// Ids keep increasing across reconnects and are never handed out twice.
    pub(crate) fn next_correlation_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
