use std::collections::{HashMap, HashSet};

use crate::feed::types::TradeEvent;
use crate::model::{Bucket, SymbolEntry, Tick};

/// Last observed in-flight price per tracked symbol.
///
/// Only tracked symbols have an entry; `None` means nothing was observed
/// since the last confirmation cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestPrices {
    prices: HashMap<String, Bucket>,
}

impl LatestPrices {
    pub fn for_symbols(symbols: &[SymbolEntry]) -> Self {
        let mut out = Self::default();
        out.reset_for(symbols);
        out
    }

    /// Replace the tracked set; every symbol starts out missing.
    pub fn reset_for(&mut self, symbols: &[SymbolEntry]) {
        self.prices = symbols
            .iter()
            .map(|e| (e.api_name.clone(), None))
            .collect();
    }

    pub fn clear_all(&mut self) {
        for price in self.prices.values_mut() {
            *price = None;
        }
    }

    pub fn get(&self, symbol: &str) -> Bucket {
        self.prices.get(symbol).copied().flatten()
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.prices.contains_key(symbol)
    }

    /// Returns `false` for untracked symbols.
    pub fn set(&mut self, symbol: &str, price: f64) -> bool {
        match self.prices.get_mut(symbol) {
            Some(slot) => {
                *slot = Some(price);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self, symbol: &str) {
        if let Some(slot) = self.prices.get_mut(symbol) {
            *slot = None;
        }
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub accepted: usize,
    pub duplicates: usize,
    pub zero_price: usize,
    pub untracked: usize,
}

/// Reduce one trade batch to at most one tick per symbol.
/// The first occurrence of a symbol wins; zero prices are dropped before
/// they can claim a symbol.
pub fn dedupe_batch(trades: &[TradeEvent]) -> (Vec<Tick>, IngestSummary) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut ticks = Vec::with_capacity(trades.len());
    let mut summary = IngestSummary::default();

    for trade in trades {
        let tick = Tick::new(&trade.symbol, trade.price);
        if !tick.has_valid_price() {
            summary.zero_price += 1;
            continue;
        }
        if !seen.insert(trade.symbol.as_str()) {
            summary.duplicates += 1;
            continue;
        }
        ticks.push(tick);
    }
    (ticks, summary)
}

/// Apply a decoded trade batch to the latest-price map.
pub fn ingest_trades(latest: &mut LatestPrices, trades: &[TradeEvent]) -> IngestSummary {
    let (ticks, mut summary) = dedupe_batch(trades);
    for tick in ticks {
        if latest.set(&tick.symbol, tick.price) {
            summary.accepted += 1;
        } else {
            summary.untracked += 1;
        }
    }
    summary
}
