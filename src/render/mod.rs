pub mod sparkline;
pub mod surface;

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::DisplayConfig;
use crate::model::{Bucket, PricePoint, SymbolEntry};
use crate::store::PriceStore;
use sparkline::{draw_sparkline, ChartArea, SparklineStyle};
use surface::{Rgb, Surface};

const LOGO_CHART_GAP: usize = 1;
const SYMBOL_LEFT_SPACING: usize = 2;
const SYMBOL_TOP_SPACING: usize = 1;
const SYMBOL_FONT_HEIGHT: usize = 7;
const PRICE_FONT_WIDTH: usize = 4;
const PRICE_FONT_HEIGHT: usize = 6;
const PERCENTAGE_FONT_WIDTH: usize = 4;
const PERCENTAGE_PRECISION: usize = 2;

const GAIN_UP: Rgb = Rgb::new(0, 255, 0);
const GAIN_DOWN: Rgb = Rgb::new(255, 0, 0);

/// Pixel layout of the primary symbol view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardLayout {
    pub width: usize,
    pub height: usize,
    pub chart_height: usize,
    pub logo_size: usize,
    pub render_logos: bool,
}

impl From<&DisplayConfig> for BoardLayout {
    fn from(cfg: &DisplayConfig) -> Self {
        Self {
            width: cfg.width,
            height: cfg.height,
            chart_height: cfg.chart_height,
            logo_size: cfg.logo_size,
            render_logos: cfg.render_logos,
        }
    }
}

impl BoardLayout {
    pub fn chart_area(&self) -> ChartArea {
        ChartArea {
            x: 0,
            y: self.height.saturating_sub(self.chart_height + 1),
            width: self.width,
            height: self.chart_height,
        }
    }

    fn text_x(&self, with_logo: bool) -> usize {
        if with_logo {
            self.logo_size + LOGO_CHART_GAP
        } else {
            SYMBOL_LEFT_SPACING
        }
    }

    fn price_y(&self) -> usize {
        SYMBOL_TOP_SPACING + SYMBOL_FONT_HEIGHT
    }
}

pub fn format_price(price: f64) -> String {
    format!("{:.2}", price)
}

pub fn gain_pct(price: f64, reference: f64) -> Option<f64> {
    if reference == 0.0 || !reference.is_finite() || !price.is_finite() {
        return None;
    }
    Some((price - reference) / reference * 100.0)
}

pub fn format_gain(pct: f64) -> String {
    format!("{:+.*}%", PERCENTAGE_PRECISION, pct)
}

/// Per-symbol chart windows plus the primary symbol view.
///
/// Windows are fetched from the store the first time a symbol is seen
/// and then advanced one bucket per confirmation cycle.
pub struct Renderer {
    layout: BoardLayout,
    style: SparklineStyle,
    windows: HashMap<String, VecDeque<Bucket>>,
    /// Windows that could not be fetched; refetched on next use.
    stale: HashSet<String>,
    reference_prices: HashMap<String, Option<f64>>,
}

impl Renderer {
    pub fn new(layout: BoardLayout) -> Self {
        Self {
            layout,
            style: SparklineStyle::default(),
            windows: HashMap::new(),
            stale: HashSet::new(),
            reference_prices: HashMap::new(),
        }
    }

    pub fn layout(&self) -> BoardLayout {
        self.layout
    }

    /// Drop every cached window and reference price.
    pub fn clear_charts(&mut self) {
        self.windows.clear();
        self.stale.clear();
        self.reference_prices.clear();
    }

    pub fn window(&self, symbol: &str) -> Option<&VecDeque<Bucket>> {
        self.windows.get(symbol)
    }

    /// Returns `true` when the window was (re)loaded from the store.
    fn ensure_window(&mut self, symbol: &str, store: &dyn PriceStore, now_ms: i64) -> bool {
        if self.windows.contains_key(symbol) && !self.stale.contains(symbol) {
            return false;
        }
        let width = self.layout.width;
        let window = match store.read_window(symbol, width, now_ms) {
            Ok(w) => {
                self.stale.remove(symbol);
                w
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Chart history unavailable");
                self.stale.insert(symbol.to_string());
                vec![None; width]
            }
        };
        self.windows
            .insert(symbol.to_string(), window.into_iter().collect());
        true
    }

    fn push_bucket(&mut self, symbol: &str, bucket: Bucket) {
        let width = self.layout.width;
        if let Some(window) = self.windows.get_mut(symbol) {
            window.push_back(bucket);
            while window.len() > width {
                window.pop_front();
            }
        }
    }

    /// Advance `symbol`'s window by one cycle: `backfill` gaps then the
    /// durable point. Transient points are never retained.
    pub fn update_chart(
        &mut self,
        symbol: &str,
        backfill: u64,
        point: Option<PricePoint>,
        store: &dyn PriceStore,
        now_ms: i64,
    ) {
        // A fresh load already reflects everything durable up to now.
        if self.ensure_window(symbol, store, now_ms) {
            return;
        }
        for _ in 0..backfill {
            self.push_bucket(symbol, None);
        }
        match point {
            Some(PricePoint::Confirmed(p)) => self.push_bucket(symbol, Some(p)),
            Some(PricePoint::Gap) => self.push_bucket(symbol, None),
            Some(PricePoint::Transient(_)) | None => {}
        }
    }

    /// Draw the chart of `symbol`, previewing `transient` as a trailing
    /// bucket for this frame only.
    pub fn draw_chart<S: Surface + ?Sized>(
        &mut self,
        surface: &mut S,
        symbol: &str,
        transient: Option<f64>,
    ) -> usize {
        let area = self.layout.chart_area();
        surface.clear_region(area.x, area.y, area.width, area.height + 1);
        let style = self.style;
        let Some(window) = self.windows.get_mut(symbol) else {
            return 0;
        };

        if let Some(p) = transient {
            window.push_back(Some(p));
        }
        let drawn = draw_sparkline(surface, area, window.make_contiguous(), style);
        if transient.is_some() {
            window.pop_back();
        }
        drawn
    }

    fn reference_price(&mut self, symbol: &str, store: &dyn PriceStore, now_ms: i64) -> Option<f64> {
        if let Some(cached) = self.reference_prices.get(symbol) {
            return *cached;
        }
        match store.reference_price(symbol, now_ms) {
            Ok(reference) => {
                self.reference_prices.insert(symbol.to_string(), reference);
                reference
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Reference price unavailable");
                None
            }
        }
    }

    /// Render the primary symbol view. `full` redraws the static parts
    /// (logo and label) as after a rotation.
    #[allow(clippy::too_many_arguments)]
    pub fn render_primary<S: Surface + ?Sized>(
        &mut self,
        surface: &mut S,
        entry: &SymbolEntry,
        price: Option<f64>,
        transient: Option<f64>,
        full: bool,
        store: &dyn PriceStore,
        now_ms: i64,
    ) {
        let symbol = entry.api_name.as_str();
        let logo = entry.logo.as_deref().filter(|_| self.layout.render_logos);
        let text_x = self.layout.text_x(logo.is_some());

        if full {
            surface.clear();
            if let Some(logo) = logo {
                surface.draw_image(0, 0, logo, self.layout.logo_size);
            }
            surface.draw_text(text_x, SYMBOL_TOP_SPACING, &entry.label, Rgb::WHITE);
        }

        let price = price.or_else(|| match store.last_price(symbol) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Last price unavailable");
                None
            }
        });

        let price_y = self.layout.price_y();
        surface.clear_region(0, price_y, self.layout.width, PRICE_FONT_HEIGHT);
        if let Some(p) = price {
            let text = format_price(p);
            surface.draw_text(text_x, price_y, &text, Rgb::WHITE);

            let gain = self
                .reference_price(symbol, store, now_ms)
                .and_then(|reference| gain_pct(p, reference));
            if let Some(pct) = gain {
                let gain_text = format_gain(pct);
                let gain_x = self
                    .layout
                    .width
                    .saturating_sub(gain_text.len() * PERCENTAGE_FONT_WIDTH)
                    .max(text_x + text.len() * PRICE_FONT_WIDTH);
                let color = if pct >= 0.0 { GAIN_UP } else { GAIN_DOWN };
                surface.draw_text(gain_x, price_y, &gain_text, color);
            }
        }

        self.ensure_window(symbol, store, now_ms);
        self.draw_chart(surface, symbol, transient);
    }
}
