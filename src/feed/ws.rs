use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite;

use super::types::SubscribeRequest;
use crate::config::FeedConfig;
use crate::error::BoardError;
use crate::session::{FeedOutcome, Session, SessionEvent};

const WATCHDOG_CHECK_PERIOD: Duration = Duration::from_secs(1);

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Why a connection ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionExit {
    Shutdown,
    Resubscribe,
    Watchdog,
    Closed,
}

pub struct FeedWsClient {
    url: String,
    reconnect_delay: Duration,
    watchdog_timeout_secs: u64,
}

impl FeedWsClient {
    pub fn new(url: &str, reconnect_delay: Duration, watchdog_timeout_secs: u64) -> Self {
        Self {
            url: url.to_string(),
            reconnect_delay,
            watchdog_timeout_secs,
        }
    }

    pub fn from_config(cfg: &FeedConfig) -> Self {
        Self::new(
            &cfg.feed_url(),
            Duration::from_secs(cfg.reconnect_delay_secs),
            cfg.reconnect_trigger_secs,
        )
    }

    /// Keep the feed connected until shutdown, reconnecting after a
    /// fixed delay on close, error, watchdog expiry or symbol changes.
    pub async fn connect_and_run(
        &self,
        session: Arc<Session>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut resubscribe = session.resubscribe_signal();
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Nothing to subscribe yet: wait for the control channel.
            if session.tracked_api_names().await.is_empty() {
                tokio::select! {
                    changed = resubscribe.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    _ = shutdown.changed() => break,
                }
            }

            attempt += 1;
            session.transition(SessionEvent::Connect).await;
            resubscribe.mark_unchanged();

            let exit = self
                .connect_once(&session, &mut resubscribe, &mut shutdown)
                .await;
            match exit {
                Ok(ConnectionExit::Shutdown) => break,
                Ok(ConnectionExit::Resubscribe) => {
                    attempt = 0;
                    tracing::info!("Tracked symbols changed, resubscribing");
                    session.transition(SessionEvent::SymbolsChanged).await;
                }
                Ok(ConnectionExit::Watchdog) => {
                    tracing::warn!(
                        silence_secs = session.silence_secs(now_ms()),
                        "No feed activity, forcing reconnect"
                    );
                    session.transition(SessionEvent::WatchdogFired).await;
                }
                Ok(ConnectionExit::Closed) => {
                    session.transition(SessionEvent::TransportClosed).await;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %format!("{:#}", e), "Feed connection failed");
                    session.transition(SessionEvent::TransportError).await;
                }
            }

            {
                let mut core = session.lock().await;
                core.clear_in_flight();
                core.transition(SessionEvent::TornDown);
            }

            tracing::info!(
                attempt,
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Reconnecting feed"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => continue,
                _ = shutdown.changed() => {
                    tracing::info!("Shutdown during reconnect");
                    break;
                }
            }
        }

        session.transition(SessionEvent::Shutdown).await;
        Ok(())
    }

    async fn connect_once(
        &self,
        session: &Session,
        resubscribe: &mut watch::Receiver<u64>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<ConnectionExit> {
        tracing::info!("Connecting to feed");
        let (ws_stream, _resp) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(|e| BoardError::Transport(e.to_string()))
            .context("feed websocket connect failed")?;
        session.transition(SessionEvent::Connected).await;
        session.touch(now_ms());

        let (mut write, mut read) = ws_stream.split();

        for symbol in session.tracked_api_names().await {
            let text = SubscribeRequest::new(&symbol).to_text()?;
            write
                .send(tungstenite::Message::Text(text))
                .await
                .with_context(|| format!("failed to subscribe to {}", symbol))?;
            tracing::info!(symbol = %symbol, "Subscribed");
        }

        let mut watchdog = tokio::time::interval(WATCHDOG_CHECK_PERIOD);
        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            match session.handle_feed_message(&text, now_ms()).await {
                                Ok(FeedOutcome::Trades(summary)) => {
                                    tracing::debug!(
                                        accepted = summary.accepted,
                                        duplicates = summary.duplicates,
                                        zero_price = summary.zero_price,
                                        untracked = summary.untracked,
                                        "Processed trade batch"
                                    );
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    tracing::debug!(error = %e, "Dropped feed message");
                                }
                            }
                        }
                        Some(Ok(tungstenite::Message::Ping(_))) => {
                            // tokio-tungstenite answers pings itself
                        }
                        Some(Ok(tungstenite::Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Feed closed by peer");
                            return Ok(ConnectionExit::Closed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(BoardError::Transport(format!("feed read error: {}", e)).into());
                        }
                        None => {
                            return Ok(ConnectionExit::Closed);
                        }
                    }
                }
                _ = watchdog.tick() => {
                    if session.silence_secs(now_ms()) > self.watchdog_timeout_secs {
                        let _ = write.close().await;
                        return Ok(ConnectionExit::Watchdog);
                    }
                }
                changed = resubscribe.changed() => {
                    let _ = write.close().await;
                    if changed.is_err() {
                        return Ok(ConnectionExit::Shutdown);
                    }
                    return Ok(ConnectionExit::Resubscribe);
                }
                _ = shutdown.changed() => {
                    let _ = write.close().await;
                    return Ok(ConnectionExit::Shutdown);
                }
            }
        }
    }
}
