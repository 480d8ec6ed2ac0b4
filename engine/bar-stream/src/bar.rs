//! Market bar records delivered by the stream

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One aggregated bar for a symbol, as pushed by the feed
///
/// Field names follow the feed's compact wire keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(rename = "S")]
    pub symbol: String,

    #[serde(rename = "o")]
    pub open: f64,

    #[serde(rename = "h")]
    pub high: f64,

    #[serde(rename = "l")]
    pub low: f64,

    #[serde(rename = "c")]
    pub close: f64,

    #[serde(rename = "v")]
    pub volume: f64,

    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub trade_count: Option<u64>,

    #[serde(rename = "vw", default, skip_serializing_if = "Option::is_none")]
    pub vwap: Option<f64>,
}

impl Bar {
    /// Flat bar at a single price, used by synthetic feeds
    pub fn flat(symbol: impl Into<String>, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
            timestamp,
            trade_count: None,
            vwap: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_wire_bar() {
        let raw = r#"{"S":"SPY","o":388.985,"h":389.13,"l":388.975,"c":389.12,"v":49378,"t":"2021-02-22T19:15:00Z","n":461,"vw":389.062639}"#;
        let bar: Bar = serde_json::from_str(raw).unwrap();

        assert_eq!(bar.symbol, "SPY");
        assert_eq!(bar.close, 389.12);
        assert_eq!(bar.volume, 49378.0);
        assert_eq!(bar.trade_count, Some(461));
        assert_eq!(bar.timestamp.to_rfc3339(), "2021-02-22T19:15:00+00:00");
    }

    #[test]
    fn test_optional_fields_may_be_absent() {
        let raw = r#"{"S":"AAPL","o":1.0,"h":1.0,"l":1.0,"c":1.0,"v":0,"t":"2024-01-02T14:30:00Z"}"#;
        let bar: Bar = serde_json::from_str(raw).unwrap();

        assert_eq!(bar.trade_count, None);
        assert_eq!(bar.vwap, None);
    }
}
