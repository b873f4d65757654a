use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite;

use crate::error::BoardError;
use crate::session::Session;

/// Client for the optional reconfiguration channel.
pub struct ControlWsClient {
    url: String,
    reconnect_delay: Duration,
}

impl ControlWsClient {
    pub fn new(url: &str, reconnect_delay: Duration) -> Self {
        Self {
            url: url.to_string(),
            reconnect_delay,
        }
    }

    pub async fn connect_and_run(
        &self,
        session: Arc<Session>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.connect_once(&session, &mut shutdown).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(error = %format!("{:#}", e), "Control channel disconnected");
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => continue,
                _ = shutdown.changed() => break,
            }
        }
        Ok(())
    }

    async fn connect_once(
        &self,
        session: &Session,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        tracing::info!("Connecting to control channel");
        let (ws_stream, _resp) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(|e| BoardError::Transport(e.to_string()))
            .context("control websocket connect failed")?;
        tracing::info!("Control channel connected");

        let (_write, mut read) = ws_stream.split();
        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            match session.apply_control_message(&text).await {
                                Ok(_) => {}
                                Err(BoardError::ConfigInvalid(reason)) => {
                                    tracing::warn!(reason = %reason, "Ignored control message");
                                }
                                Err(e) => {
                                    tracing::debug!(error = %e, "Dropped control message");
                                }
                            }
                        }
                        Some(Ok(tungstenite::Message::Close(frame))) => {
                            return Err(BoardError::Transport(format!("control channel closed: {:?}", frame)).into());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(BoardError::Transport(format!("control read error: {}", e)).into());
                        }
                        None => {
                            return Err(anyhow::anyhow!("control stream ended"));
                        }
                    }
                }
                _ = shutdown.changed() => {
                    return Ok(());
                }
            }
        }
    }
}
