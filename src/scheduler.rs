use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::feed::ws::now_ms;
use crate::render::surface::FrameBuffer;
use crate::render::{BoardLayout, Renderer};
use crate::session::{ConnectionState, Session};
use crate::store::PriceStore;
use crate::sync::{synchronize, SyncParams};

/// What the presentation layer gets after every cycle that ran.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub frame: FrameBuffer,
    pub state: ConnectionState,
    pub primary: Option<String>,
    pub skipped_cycles: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The session lock was busy.
    Skipped,
    /// No symbols tracked yet.
    Idle,
    Ran { confirmed: bool, rotated: bool },
}

pub struct Scheduler {
    session: Arc<Session>,
    store: Arc<dyn PriceStore>,
    renderer: Renderer,
    frame: FrameBuffer,
    params: SyncParams,
    tick: Duration,
    seen_epoch: u64,
    next_switch_ms: Option<i64>,
    shown: Option<String>,
    skipped_cycles: u64,
    snapshots: Option<watch::Sender<BoardSnapshot>>,
}

impl Scheduler {
    pub fn new(
        session: Arc<Session>,
        store: Arc<dyn PriceStore>,
        layout: BoardLayout,
        params: SyncParams,
        tick: Duration,
    ) -> Self {
        Self {
            session,
            store,
            renderer: Renderer::new(layout),
            frame: FrameBuffer::new(layout.width, layout.height),
            params,
            tick,
            seen_epoch: 0,
            next_switch_ms: None,
            shown: None,
            skipped_cycles: 0,
            snapshots: None,
        }
    }

    pub fn with_snapshots(mut self, tx: watch::Sender<BoardSnapshot>) -> Self {
        self.snapshots = Some(tx);
        self
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn skipped_cycles(&self) -> u64 {
        self.skipped_cycles
    }

    /// One scheduler tick. Never waits for the session lock: when the I/O
    /// side holds it the cycle is skipped, and the next cycle recomputes
    /// elapsed time from the last confirmation so nothing is lost.
    pub fn run_cycle(&mut self, now_ms: i64) -> CycleOutcome {
        let Some(mut guard) = self.session.try_lock() else {
            self.skipped_cycles += 1;
            tracing::debug!(skipped = self.skipped_cycles, "Session busy, skipping cycle");
            return CycleOutcome::Skipped;
        };
        let core = &mut *guard;
        let store = self.store.as_ref();

        let mut full = false;
        if core.chart_epoch != self.seen_epoch {
            self.renderer.clear_charts();
            self.seen_epoch = core.chart_epoch;
            full = true;
        }
        if core.take_rotation_reset() {
            self.next_switch_ms = None;
            full = true;
        }
        if core.symbols.is_empty() {
            return CycleOutcome::Idle;
        }

        let switch_ms = core.switch_time_secs as i64 * 1_000;
        let next_switch = *self.next_switch_ms.get_or_insert(now_ms + switch_ms);
        let rotated = now_ms >= next_switch;
        if rotated {
            if let Some(entry) = core.rotate() {
                tracing::debug!(symbol = %entry.api_name, "Rotated primary symbol");
            }
            self.next_switch_ms = Some(now_ms + switch_ms);
        }

        let cycle = match synchronize(
            &mut core.clock,
            &mut core.latest,
            &core.symbols,
            store,
            self.params,
            now_ms,
        ) {
            Ok(cycle) => Some(cycle),
            Err(e) => {
                tracing::warn!(error = %e, "Synchronization skipped");
                None
            }
        };

        if let Some(cycle) = &cycle {
            for update in &cycle.updates {
                self.renderer
                    .update_chart(&update.symbol, update.backfill, update.point, store, now_ms);
            }
        }

        if let Some(entry) = core.primary().cloned() {
            if self.shown.as_deref() != Some(entry.api_name.as_str()) {
                full = true;
            }
            let (price, transient) = match &cycle {
                Some(cycle) => {
                    let point = cycle.update_for(&entry.api_name).and_then(|u| u.point);
                    (
                        point.and_then(|p| p.value()),
                        point.filter(|p| p.is_transient()).and_then(|p| p.value()),
                    )
                }
                // Keep the view moving on whatever is in flight.
                None => {
                    let in_flight = core.latest.get(&entry.api_name);
                    (in_flight, in_flight)
                }
            };
            self.renderer.render_primary(
                &mut self.frame,
                &entry,
                price,
                transient,
                full,
                store,
                now_ms,
            );
            self.shown = Some(entry.api_name);
        }

        let state = core.state;
        drop(guard);
        self.publish(state);

        CycleOutcome::Ran {
            confirmed: cycle.is_some_and(|c| c.confirmed),
            rotated,
        }
    }

    fn publish(&self, state: ConnectionState) {
        if let Some(tx) = &self.snapshots {
            tx.send_replace(BoardSnapshot {
                frame: self.frame.clone(),
                state,
                primary: self.shown.clone(),
                skipped_cycles: self.skipped_cycles,
            });
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            self.run_cycle(now_ms());
        }
        tracing::info!(skipped = self.skipped_cycles, "Scheduler stopped");
    }
}
