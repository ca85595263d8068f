//! Websocket transport over `tokio-tungstenite`.
//!
//! - Text frames are surfaced as-is.
//! - Binary frames are not part of the protocol and are skipped.
//! - Ping/Pong are answered by the library while reading.
//! - A Close frame or end of stream reads as `Ok(None)`.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use rtmlink_core::error::{Result, RtmError};

use super::{Connection, Connector, FrameSink, FrameSource};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Connection> {
        let (ws, resp) = connect_async(url)
            .await
            .map_err(|e| RtmError::Transport(format!("websocket connect: {e}")))?;
        tracing::debug!(status = %resp.status(), "websocket handshake complete");

        let (tx, rx) = ws.split();
        Ok((Box::new(WsSink { tx }), Box::new(WsSource { rx })))
    }
}

struct WsSink {
    tx: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.tx
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| RtmError::Transport(format!("websocket write: {e}")))
    }

    async fn close(&mut self) -> Result<()> {
        self.tx
            .close()
            .await
            .map_err(|e| RtmError::Transport(format!("websocket close: {e}")))
    }
}

struct WsSource {
    rx: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Result<Option<String>> {
        loop {
            let Some(msg) = self.rx.next().await else {
                return Ok(None);
            };
            let msg = msg.map_err(|e| RtmError::Transport(format!("websocket read: {e}")))?;
            match msg {
                Message::Text(s) => return Ok(Some(s.as_str().to_owned())),
                Message::Binary(b) => {
                    tracing::debug!(len = b.len(), "ignoring binary frame");
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                Message::Close(frame) => {
                    tracing::debug!(?frame, "peer sent close");
                    return Ok(None);
                }
            }
        }
    }
}
