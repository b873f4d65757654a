use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::model::SymbolEntry;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const ICON_MAPPING_DELIMITER: &str = " -> ";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub ws_base_url: String,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub icon_mappings: Vec<String>,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_reconnect_trigger_secs")]
    pub reconnect_trigger_secs: u64,
    #[serde(skip)]
    pub api_token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlConfig {
    pub url: Option<String>,
    #[serde(skip)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_tolerance_secs")]
    pub tolerance_secs: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default = "default_height")]
    pub height: usize,
    #[serde(default = "default_chart_height")]
    pub chart_height: usize,
    #[serde(default = "default_logo_size")]
    pub logo_size: usize,
    #[serde(default = "default_render_logos")]
    pub render_logos: bool,
    #[serde(default = "default_switch_time_secs")]
    pub switch_time_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_reconnect_delay_secs() -> u64 {
    2
}
fn default_reconnect_trigger_secs() -> u64 {
    30
}
fn default_interval_secs() -> u64 {
    60
}
fn default_tolerance_secs() -> u64 {
    5
}
fn default_tick_ms() -> u64 {
    1_000
}
fn default_width() -> usize {
    64
}
fn default_height() -> usize {
    32
}
fn default_chart_height() -> usize {
    17
}
fn default_logo_size() -> usize {
    20
}
fn default_render_logos() -> bool {
    true
}
fn default_switch_time_secs() -> u64 {
    10
}
fn default_storage_path() -> PathBuf {
    PathBuf::from("data/ticker_history.sqlite")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            tolerance_secs: default_tolerance_secs(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            chart_height: default_chart_height(),
            logo_size: default_logo_size(),
            render_logos: default_render_logos(),
            switch_time_secs: default_switch_time_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn validate_ws_url(field: &str, raw: &str) -> Result<()> {
    let url = url::Url::parse(raw).with_context(|| format!("{} is not a valid URL", field))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        bail!("{} must use ws:// or wss://, got {}://", field, url.scheme());
    }
    Ok(())
}

/// Split an `"AAPL -> apple"` mapping into `(symbol, logo)`.
pub fn parse_icon_mapping(mapping: &str) -> Option<(String, String)> {
    let (symbol, logo) = mapping.split_once(ICON_MAPPING_DELIMITER)?;
    let symbol = symbol.trim();
    let logo = logo.trim();
    if symbol.is_empty() || logo.is_empty() {
        return None;
    }
    Some((symbol.to_string(), logo.to_string()))
}

impl FeedConfig {
    /// Logo key for a symbol; falls back to the symbol itself.
    pub fn symbol_to_logo(&self, symbol: &str) -> String {
        self.icon_mappings
            .iter()
            .filter_map(|m| parse_icon_mapping(m))
            .filter(|(s, _)| s == symbol)
            .map(|(_, logo)| logo)
            .last()
            .unwrap_or_else(|| symbol.to_string())
    }

    pub fn symbol_entries(&self) -> Vec<SymbolEntry> {
        let mut out: Vec<SymbolEntry> = Vec::new();
        for sym in &self.symbols {
            let s = sym.trim();
            if s.is_empty() || out.iter().any(|e| e.api_name == s) {
                continue;
            }
            out.push(SymbolEntry {
                api_name: s.to_string(),
                label: s.to_string(),
                logo: Some(self.symbol_to_logo(s)),
            });
        }
        out
    }

    pub fn feed_url(&self) -> String {
        format!("{}/?token={}", self.ws_base_url.trim_end_matches('/'), self.api_token)
    }
}

impl ControlConfig {
    /// Control channel URL when both endpoint and token are configured.
    pub fn endpoint(&self) -> Option<String> {
        match (&self.url, &self.token) {
            (Some(url), Some(token)) if !url.is_empty() && !token.is_empty() => {
                Some(format!("{}?token={}", url, token))
            }
            _ => None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var("TICKER_BOARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Self::from_path(&config_path)?;

        config.feed.api_token = std::env::var("FINNHUB_API_TOKEN")
            .context("FINNHUB_API_TOKEN not set in .env or environment")?;
        config.control.token = std::env::var("TICKER_BOARD_CONTROL_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.interval_secs == 0 {
            bail!("sync.interval_secs must be > 0");
        }
        if self.sync.tolerance_secs >= self.sync.interval_secs {
            bail!(
                "sync.tolerance_secs ({}) must be smaller than sync.interval_secs ({})",
                self.sync.tolerance_secs,
                self.sync.interval_secs
            );
        }
        if self.sync.tick_ms == 0 {
            bail!("sync.tick_ms must be > 0");
        }
        if self.display.width == 0 || self.display.chart_height >= self.display.height {
            bail!(
                "display.chart_height ({}) must fit inside display.height ({})",
                self.display.chart_height,
                self.display.height
            );
        }
        validate_ws_url("feed.ws_base_url", &self.feed.ws_base_url)?;
        if let Some(url) = self.control.url.as_deref().filter(|u| !u.is_empty()) {
            validate_ws_url("control.url", url)?;
        }
        // A control channel may supply the symbol list later.
        if self.feed.symbol_entries().is_empty() && self.control.url.is_none() {
            bail!("feed.symbols must list at least one symbol");
        }
        Ok(())
    }
}
