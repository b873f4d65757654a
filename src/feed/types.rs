use serde::{Deserialize, Serialize};

use crate::error::BoardError;
use crate::model::SymbolEntry;

/// Feed prices usually arrive as JSON numbers, occasionally as strings.
pub fn string_or_number_to_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::Null => Ok(0.0),
        serde_json::Value::String(s) => s.parse::<f64>().map_err(serde::de::Error::custom),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("invalid number")),
        _ => Err(serde::de::Error::custom("invalid numeric value")),
    }
}

/// One entry of a `trade` push.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p", deserialize_with = "string_or_number_to_f64")]
    pub price: f64,
    #[serde(rename = "t", default)]
    pub timestamp_ms: Option<u64>,
}

/// Inbound messages on either the feed or the control channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    Trade {
        #[serde(default)]
        data: Vec<TradeEvent>,
    },
    Ping,
    Config(ControlConfigMessage),
    Error {
        #[serde(default)]
        msg: String,
    },
    #[serde(other)]
    Unknown,
}

/// Control channel reconfiguration push.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfigMessage {
    pub id: Option<i64>,
    #[serde(default)]
    pub subs: Vec<String>,
    pub api_names: Option<Vec<String>>,
    #[serde(default)]
    pub logo_names: Vec<String>,
    pub switch_time: Option<u64>,
}

/// Validated form of [`ControlConfigMessage`].
#[derive(Debug, Clone, PartialEq)]
pub struct ControlUpdate {
    pub id: i64,
    pub symbols: Vec<SymbolEntry>,
    pub switch_time_secs: Option<u64>,
}

impl ControlConfigMessage {
    pub fn into_update(self) -> Result<ControlUpdate, BoardError> {
        let id = self
            .id
            .ok_or_else(|| BoardError::ConfigInvalid("config message without id".to_string()))?;
        let api_names = self.api_names.ok_or_else(|| {
            BoardError::ConfigInvalid("config message without api_names".to_string())
        })?;
        if self.switch_time == Some(0) {
            return Err(BoardError::ConfigInvalid(
                "switch_time must be > 0".to_string(),
            ));
        }

        let mut symbols: Vec<SymbolEntry> = Vec::with_capacity(api_names.len());
        for (i, api_name) in api_names.iter().enumerate() {
            let api_name = api_name.trim();
            if api_name.is_empty() || symbols.iter().any(|e| e.api_name == api_name) {
                continue;
            }
            let label = self
                .subs
                .get(i)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or(api_name);
            let logo = self
                .logo_names
                .get(i)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            symbols.push(SymbolEntry {
                api_name: api_name.to_string(),
                label: label.to_string(),
                logo,
            });
        }

        Ok(ControlUpdate {
            id,
            symbols,
            switch_time_secs: self.switch_time,
        })
    }
}

/// Outbound `{"type":"subscribe","symbol":...}` request.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub symbol: &'a str,
}

impl<'a> SubscribeRequest<'a> {
    pub fn new(symbol: &'a str) -> Self {
        Self {
            kind: "subscribe",
            symbol,
        }
    }

    pub fn to_text(&self) -> Result<String, BoardError> {
        Ok(serde_json::to_string(self)?)
    }
}

pub fn parse_inbound(text: &str) -> Result<InboundMessage, BoardError> {
    serde_json::from_str(text).map_err(|e| BoardError::Parse(e.to_string()))
}
