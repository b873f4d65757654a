/// One inbound trade observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
}

impl Tick {
    pub fn new(symbol: &str, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            price,
        }
    }

    /// Zero (and non-finite) prices never describe a real trade.
    pub fn has_valid_price(&self) -> bool {
        self.price.is_finite() && self.price != 0.0
    }
}
