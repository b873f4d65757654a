/// One chart bucket. `None` marks a bucket with no confirmed trade.
pub type Bucket = Option<f64>;

/// A confirmed, durable price for one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub symbol: String,
    pub ts_ms: i64,
    pub price: f64,
}

/// A value fed to the chart for one synchronization cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PricePoint {
    /// Written to the store; retained in the live window.
    Confirmed(f64),
    /// In-flight price; drawn once and discarded.
    Transient(f64),
    /// Bucket closed without a trade.
    Gap,
}

impl PricePoint {
    pub fn value(&self) -> Bucket {
        match self {
            Self::Confirmed(p) | Self::Transient(p) => Some(*p),
            Self::Gap => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
