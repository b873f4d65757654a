use crate::config::SyncConfig;
use crate::error::BoardError;
use crate::ingest::LatestPrices;
use crate::model::{PricePoint, Sample, SymbolEntry};
use crate::store::PriceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncParams {
    pub interval_secs: u64,
    pub tolerance_secs: u64,
}

impl SyncParams {
    pub fn new(interval_secs: u64, tolerance_secs: u64) -> Self {
        Self {
            interval_secs: interval_secs.max(1),
            tolerance_secs,
        }
    }
}

impl From<&SyncConfig> for SyncParams {
    fn from(cfg: &SyncConfig) -> Self {
        Self::new(cfg.interval_secs, cfg.tolerance_secs)
    }
}

/// A cycle is a confirmation cycle when it lands within `tolerance` after
/// an interval boundary, measured from the previous confirmation.
pub fn is_confirmed(elapsed_secs: u64, params: SyncParams) -> bool {
    elapsed_secs >= params.interval_secs
        && elapsed_secs % params.interval_secs < params.tolerance_secs
}

/// Whole intervals that closed without a confirmation cycle.
pub fn missed_buckets(elapsed_secs: u64, params: SyncParams) -> u64 {
    (elapsed_secs / params.interval_secs).saturating_sub(1)
}

/// Confirmation bookkeeping owned by the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncClock {
    last_confirmed_at_ms: Option<i64>,
    confirmed_once: bool,
}

impl SyncClock {
    /// Called when the feed reconnects. Elapsed time keeps counting from
    /// the last confirmation; only the next confirmation's backfill is
    /// suppressed.
    pub fn suppress_backfill(&mut self) {
        self.confirmed_once = false;
    }

    pub fn last_confirmed_at_ms(&self) -> Option<i64> {
        self.last_confirmed_at_ms
    }

    pub fn confirmed_once(&self) -> bool {
        self.confirmed_once
    }

    fn mark_confirmed(&mut self, now_ms: i64) {
        self.last_confirmed_at_ms = Some(now_ms);
        self.confirmed_once = true;
    }
}

/// Chart feed for one symbol produced by a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartUpdate {
    pub symbol: String,
    /// Gap buckets to push before `point`.
    pub backfill: u64,
    /// `None` on a transient cycle with nothing in flight.
    pub point: Option<PricePoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncCycle {
    pub elapsed_secs: u64,
    pub confirmed: bool,
    pub written: Vec<Sample>,
    pub updates: Vec<ChartUpdate>,
}

impl SyncCycle {
    pub fn update_for(&self, symbol: &str) -> Option<&ChartUpdate> {
        self.updates.iter().find(|u| u.symbol == symbol)
    }
}

fn elapsed_secs(
    clock: &SyncClock,
    store: &dyn PriceStore,
    params: SyncParams,
    now_ms: i64,
) -> Result<u64, BoardError> {
    if let Some(last) = clock.last_confirmed_at_ms {
        return Ok((now_ms.saturating_sub(last).max(0) / 1_000) as u64);
    }
    // Never written: the first observation is immediately confirmable.
    Ok(store
        .seconds_since_last_write(now_ms)?
        .unwrap_or(params.interval_secs))
}

/// Run one synchronization cycle over the tracked symbols.
///
/// Fails only when the elapsed time cannot be determined; individual
/// write failures keep the in-flight price so the next confirmation
/// cycle retries it.
pub fn synchronize(
    clock: &mut SyncClock,
    latest: &mut LatestPrices,
    symbols: &[SymbolEntry],
    store: &dyn PriceStore,
    params: SyncParams,
    now_ms: i64,
) -> Result<SyncCycle, BoardError> {
    let elapsed = elapsed_secs(clock, store, params, now_ms)?;
    let confirmed = is_confirmed(elapsed, params);
    let backfill = if confirmed && clock.confirmed_once {
        missed_buckets(elapsed, params)
    } else {
        0
    };

    let mut written = Vec::new();
    let mut updates = Vec::with_capacity(symbols.len());

    for entry in symbols {
        let symbol = entry.api_name.as_str();
        let price = latest.get(symbol);

        let point = if confirmed {
            match price {
                Some(p) => match store.write(symbol, p, now_ms) {
                    Ok(()) => {
                        tracing::info!(symbol, price = p, elapsed, "Confirmed price");
                        latest.clear(symbol);
                        written.push(Sample {
                            symbol: symbol.to_string(),
                            ts_ms: now_ms,
                            price: p,
                        });
                        Some(PricePoint::Confirmed(p))
                    }
                    Err(e) => {
                        // Not durable: preview only, retried next confirmation.
                        tracing::warn!(symbol, price = p, error = %e, "Failed to persist price");
                        Some(PricePoint::Transient(p))
                    }
                },
                None => Some(PricePoint::Gap),
            }
        } else {
            price.map(PricePoint::Transient)
        };

        updates.push(ChartUpdate {
            symbol: symbol.to_string(),
            backfill,
            point,
        });
    }

    if confirmed {
        if backfill > 0 {
            tracing::debug!(elapsed, backfill, "Backfilling missed buckets");
        }
        clock.mark_confirmed(now_ms);
    }

    Ok(SyncCycle {
        elapsed_secs: elapsed,
        confirmed,
        written,
        updates,
    })
}
