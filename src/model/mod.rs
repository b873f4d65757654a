pub mod sample;
pub mod tick;

pub use sample::{Bucket, PricePoint, Sample};
pub use tick::Tick;

/// A tracked symbol as the feed knows it and as the board displays it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    /// Feed subscription name, e.g. `BINANCE:BTCUSDT`.
    pub api_name: String,
    pub label: String,
    pub logo: Option<String>,
}

impl SymbolEntry {
    pub fn plain(api_name: &str) -> Self {
        Self {
            api_name: api_name.to_string(),
            label: api_name.to_string(),
            logo: None,
        }
    }
}
