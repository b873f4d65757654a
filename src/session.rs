use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::{watch, Mutex, MutexGuard};

use crate::error::BoardError;
use crate::feed::types::{parse_inbound, ControlUpdate, InboundMessage};
use crate::ingest::{ingest_trades, IngestSummary, LatestPrices};
use crate::model::SymbolEntry;
use crate::sync::SyncClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
    Reconnecting,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Initial start or reconnect delay elapsed.
    Connect,
    Connected,
    MessageProcessed,
    TransportClosed,
    TransportError,
    WatchdogFired,
    SymbolsChanged,
    TornDown,
    Shutdown,
}

impl ConnectionState {
    pub fn on_event(self, event: SessionEvent) -> Self {
        match (self, event) {
            (Self::Shutdown, _) | (_, SessionEvent::Shutdown) => Self::Shutdown,
            (Self::Disconnected, SessionEvent::Connect) => Self::Connecting,
            (Self::Connecting, SessionEvent::Connected) => Self::Subscribed,
            (Self::Subscribed, SessionEvent::MessageProcessed) => Self::Streaming,
            (
                _,
                SessionEvent::TransportClosed
                | SessionEvent::TransportError
                | SessionEvent::WatchdogFired,
            ) => Self::Reconnecting,
            (Self::Subscribed | Self::Streaming, SessionEvent::SymbolsChanged) => {
                Self::Reconnecting
            }
            (Self::Reconnecting, SessionEvent::TornDown) => Self::Disconnected,
            (state, _) => state,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Subscribed => "SUBSCRIBED",
            Self::Streaming => "STREAMING",
            Self::Reconnecting => "RECONNECTING",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconfigOutcome {
    pub symbols_changed: bool,
    pub session_reset: bool,
    pub switch_time_changed: bool,
}

/// State guarded by the session lock.
#[derive(Debug)]
pub struct SessionCore {
    pub state: ConnectionState,
    pub symbols: Vec<SymbolEntry>,
    pub latest: LatestPrices,
    pub clock: SyncClock,
    pub control_id: Option<i64>,
    pub visible_index: usize,
    pub switch_time_secs: u64,
    /// Bumped whenever cached chart windows become invalid.
    pub chart_epoch: u64,
    rotation_reset: bool,
}

impl SessionCore {
    pub fn new(symbols: Vec<SymbolEntry>, switch_time_secs: u64) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            latest: LatestPrices::for_symbols(&symbols),
            symbols,
            clock: SyncClock::default(),
            control_id: None,
            visible_index: 0,
            switch_time_secs: switch_time_secs.max(1),
            chart_epoch: 0,
            rotation_reset: false,
        }
    }

    pub fn transition(&mut self, event: SessionEvent) -> ConnectionState {
        let next = self.state.on_event(event);
        if next != self.state {
            tracing::info!(
                from = self.state.label(),
                to = next.label(),
                ?event,
                "Session state changed"
            );
            self.state = next;
        }
        next
    }

    pub fn primary(&self) -> Option<&SymbolEntry> {
        self.symbols.get(self.visible_index)
    }

    pub fn rotate(&mut self) -> Option<&SymbolEntry> {
        if self.symbols.is_empty() {
            return None;
        }
        self.visible_index = (self.visible_index + 1) % self.symbols.len();
        self.symbols.get(self.visible_index)
    }

    /// Consume a pending request to restart the rotation timer.
    pub fn take_rotation_reset(&mut self) -> bool {
        std::mem::take(&mut self.rotation_reset)
    }

    /// Drop in-flight state before the feed reconnects.
    pub fn clear_in_flight(&mut self) {
        self.latest.clear_all();
        self.clock.suppress_backfill();
    }

    pub fn reconfigure(&mut self, update: ControlUpdate) -> ReconfigOutcome {
        let mut outcome = ReconfigOutcome::default();

        let old_names: Vec<&str> = self.symbols.iter().map(|e| e.api_name.as_str()).collect();
        let new_names: Vec<&str> = update.symbols.iter().map(|e| e.api_name.as_str()).collect();
        if old_names != new_names {
            outcome.symbols_changed = true;
            self.latest.reset_for(&update.symbols);
            self.chart_epoch += 1;
            self.transition(SessionEvent::SymbolsChanged);
        } else if self.symbols != update.symbols {
            // Same feed symbols, new labels or logos.
            self.chart_epoch += 1;
        }
        self.symbols = update.symbols;

        if self.control_id != Some(update.id) {
            outcome.session_reset = true;
            self.control_id = Some(update.id);
            self.visible_index = 0;
            self.rotation_reset = true;
        } else if self.visible_index >= self.symbols.len() {
            self.visible_index = 0;
        }

        if let Some(secs) = update.switch_time_secs {
            if secs != self.switch_time_secs {
                outcome.switch_time_changed = true;
                self.switch_time_secs = secs;
            }
        }
        outcome
    }
}

/// Outcome of handling one feed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    Trades(IngestSummary),
    Ping,
    Ignored,
}

/// Shared session handle used by the feed, control and scheduler tasks.
pub struct Session {
    core: Mutex<SessionCore>,
    last_activity_ms: AtomicI64,
    resubscribe_tx: watch::Sender<u64>,
}

impl Session {
    pub fn new(symbols: Vec<SymbolEntry>, switch_time_secs: u64, now_ms: i64) -> Self {
        let (resubscribe_tx, _) = watch::channel(0);
        Self {
            core: Mutex::new(SessionCore::new(symbols, switch_time_secs)),
            last_activity_ms: AtomicI64::new(now_ms),
            resubscribe_tx,
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().await
    }

    /// Non-blocking acquisition for the scheduler loop. A busy lock means
    /// the caller skips its cycle instead of waiting.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, SessionCore>> {
        self.core.try_lock().ok()
    }

    /// Fires whenever the tracked symbol set changes.
    pub fn resubscribe_signal(&self) -> watch::Receiver<u64> {
        self.resubscribe_tx.subscribe()
    }

    pub fn touch(&self, now_ms: i64) {
        self.last_activity_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn silence_secs(&self, now_ms: i64) -> u64 {
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        (now_ms.saturating_sub(last).max(0) / 1_000) as u64
    }

    pub async fn transition(&self, event: SessionEvent) -> ConnectionState {
        self.core.lock().await.transition(event)
    }

    pub async fn state(&self) -> ConnectionState {
        self.core.lock().await.state
    }

    pub async fn tracked_api_names(&self) -> Vec<String> {
        self.core
            .lock()
            .await
            .symbols
            .iter()
            .map(|e| e.api_name.clone())
            .collect()
    }

    pub async fn handle_feed_message(
        &self,
        text: &str,
        now_ms: i64,
    ) -> Result<FeedOutcome, BoardError> {
        let outcome = match parse_inbound(text)? {
            InboundMessage::Trade { data } => {
                let mut core = self.core.lock().await;
                let summary = ingest_trades(&mut core.latest, &data);
                self.touch(now_ms);
                core.transition(SessionEvent::MessageProcessed);
                FeedOutcome::Trades(summary)
            }
            InboundMessage::Ping => {
                self.transition(SessionEvent::MessageProcessed).await;
                FeedOutcome::Ping
            }
            InboundMessage::Error { msg } => {
                tracing::warn!(msg = %msg, "Feed reported an error");
                FeedOutcome::Ignored
            }
            InboundMessage::Config(_) | InboundMessage::Unknown => FeedOutcome::Ignored,
        };
        Ok(outcome)
    }

    pub async fn apply_control_message(&self, text: &str) -> Result<ReconfigOutcome, BoardError> {
        let update = match parse_inbound(text)? {
            InboundMessage::Config(msg) => msg.into_update()?,
            InboundMessage::Ping => return Ok(ReconfigOutcome::default()),
            _ => {
                return Err(BoardError::ConfigInvalid(
                    "control message is not a config push".to_string(),
                ))
            }
        };

        let outcome = {
            let mut core = self.core.lock().await;
            core.reconfigure(update)
        };
        if outcome.symbols_changed {
            self.resubscribe_tx.send_modify(|generation| *generation += 1);
        }
        tracing::info!(
            symbols_changed = outcome.symbols_changed,
            session_reset = outcome.session_reset,
            switch_time_changed = outcome.switch_time_changed,
            "Applied control configuration"
        );
        Ok(outcome)
    }
}
