//! rtmlink client
//!
//! Loads a session config, connects and logs every event until Ctrl-C.
//! Usage: `rtmlink-client [config.yaml]` (default `rtmlink.yaml`).

use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use rtmlink_client::config;
use rtmlink_client::dispatch::SessionEvent;
use rtmlink_client::transport::WsConnector;
use rtmlink_client::Session;

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "rtmlink.yaml".to_string());
    let cfg = match config::load_from_file(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(%path, error = %e, "config load failed");
            std::process::exit(2);
        }
    };

    let session = match Session::new(cfg.session, Arc::new(WsConnector::new())) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "session setup failed");
            std::process::exit(2);
        }
    };
    let mut events = session.subscribe();

    tracing::info!(url = %session.current_url(), "rtmlink-client starting");
    if let Err(e) = session.start() {
        tracing::error!(error = %e, "session start failed");
        std::process::exit(1);
    }

    loop {
        tokio::select! {
            ev = events.recv() => {
                let Some(ev) = ev else { break };
                match ev.as_ref() {
                    SessionEvent::Event(e) => {
                        tracing::info!(event_type = e.event_type().unwrap_or("<none>"), "event")
                    }
                    SessionEvent::DecodeError(e) => tracing::warn!(error = %e, "undecodable frame"),
                    SessionEvent::Disconnected { generation, reason } => {
                        tracing::info!(generation, %reason, "disconnected");
                        if session.state() == rtmlink_client::ConnectionState::Disconnected {
                            break;
                        }
                    }
                    other => tracing::debug!(?other, "lifecycle"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, closing");
                break;
            }
        }
    }

    session.close().await;
}
