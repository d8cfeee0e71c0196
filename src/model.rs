use std::fmt;

use error_stack::{Report, bail};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// One OHLCV sample. `time` is the interval open in seconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Bar interval supported by the gateway.
///
/// String representations match the request format (e.g. `"1m"`, `"1h"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Min1,
    Min5,
    Min15,
    Hour1,
    Hour4,
    Day1,
}

impl Interval {
    /// Parse a request-format string into an `Interval`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::Min1),
            "5m" => Some(Self::Min5),
            "15m" => Some(Self::Min15),
            "1h" => Some(Self::Hour1),
            "4h" => Some(Self::Hour4),
            "1d" => Some(Self::Day1),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1d",
        }
    }

    /// Binance kline interval; identical to the request vocabulary.
    pub fn binance_interval(self) -> &'static str {
        self.as_str()
    }

    /// Yahoo chart granularity. Yahoo has no 4h bucket, so 4h falls back to 60m bars.
    pub fn yahoo_interval(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Hour1 | Self::Hour4 => "60m",
            Self::Day1 => "1d",
        }
    }

    /// Yahoo chart lookback range requested for this interval.
    pub fn yahoo_range(self) -> &'static str {
        match self {
            Self::Min1 => "1d",
            Self::Min5 => "5d",
            Self::Min15 => "1mo",
            Self::Hour1 => "3mo",
            Self::Hour4 => "6mo",
            Self::Day1 => "2y",
        }
    }

    /// Polygon aggregate `(multiplier, timespan)`.
    pub fn polygon_span(self) -> (u32, &'static str) {
        match self {
            Self::Min1 => (1, "minute"),
            Self::Min5 => (5, "minute"),
            Self::Min15 => (15, "minute"),
            Self::Hour1 => (1, "hour"),
            Self::Hour4 => (4, "hour"),
            Self::Day1 => (1, "day"),
        }
    }

    pub fn twelvedata_interval(self) -> &'static str {
        match self {
            Self::Min1 => "1min",
            Self::Min5 => "5min",
            Self::Min15 => "15min",
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1day",
        }
    }

    /// Number of bars shown when a chart is first loaded without a previous range.
    pub fn default_window(self) -> usize {
        match self {
            Self::Min1 | Self::Min5 | Self::Min15 => 300,
            Self::Hour1 | Self::Hour4 => 400,
            Self::Day1 => 220,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Market data origin, or `Auto` for the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceId {
    Auto,
    Binance,
    BinanceUs,
    Yahoo,
    Polygon,
    TwelveData,
}

impl SourceId {
    /// Case-insensitive parse of a request source identifier.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "binance" => Some(Self::Binance),
            "binanceus" => Some(Self::BinanceUs),
            "yahoo" => Some(Self::Yahoo),
            "polygon" => Some(Self::Polygon),
            "twelvedata" => Some(Self::TwelveData),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Binance => "binance",
            Self::BinanceUs => "binanceus",
            Self::Yahoo => "yahoo",
            Self::Polygon => "polygon",
            Self::TwelveData => "twelvedata",
        }
    }

    /// Only the primary venue publishes a live kline stream.
    pub fn has_live_feed(self) -> bool {
        matches!(self, Self::Binance)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// "Give me `limit` bars of `symbol` at `interval` from `source`."
#[derive(Debug, Clone, PartialEq)]
pub struct BarRequest {
    pub source: SourceId,
    pub symbol: String,
    pub interval: Interval,
    pub limit: usize,
}

impl BarRequest {
    pub const DEFAULT_SOURCE: &'static str = "binance";
    pub const DEFAULT_SYMBOL: &'static str = "BTCUSDT";
    pub const DEFAULT_INTERVAL: &'static str = "1d";
    pub const DEFAULT_LIMIT: usize = 800;

    pub fn parse(
        source: &str,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Self, Report<FetchError>> {
        let Some(source) = SourceId::from_str(source) else {
            bail!(FetchError::UnknownSource {
                name: source.to_owned(),
            });
        };
        let Some(interval) = Interval::from_str(interval) else {
            bail!(FetchError::InvalidRequest {
                reason: format!("unsupported interval \"{interval}\""),
            });
        };
        let symbol = symbol.trim();
        if symbol.is_empty() {
            bail!(FetchError::InvalidRequest {
                reason: "symbol must not be empty".into(),
            });
        }
        if limit == 0 {
            bail!(FetchError::InvalidRequest {
                reason: "limit must be > 0".into(),
            });
        }
        Ok(Self {
            source,
            symbol: symbol.to_owned(),
            interval,
            limit,
        })
    }

    /// Composite cache key: source, symbol, interval and limit.
    pub fn cache_key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.source, self.symbol, self.interval, self.limit
        )
    }
}

/// One derived value aligned to a bar time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorPoint {
    pub time: i64,
    pub value: f64,
}

/// Identifies a line/histogram series on the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesId {
    Close,
    Volume,
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    MacdLine,
    MacdSignal,
    MacdHistogram,
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Close => write!(f, "close"),
            Self::Volume => write!(f, "volume"),
            Self::Sma(p) => write!(f, "sma{p}"),
            Self::Ema(p) => write!(f, "ema{p}"),
            Self::Rsi(p) => write!(f, "rsi{p}"),
            Self::MacdLine => write!(f, "macd"),
            Self::MacdSignal => write!(f, "macd_signal"),
            Self::MacdHistogram => write!(f, "macd_hist"),
        }
    }
}

/// A full indicator series, aligned to a suffix of the source bar times.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub id: SeriesId,
    pub points: Vec<IndicatorPoint>,
}

/// The newest point of one series after an incremental recompute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesUpdate {
    pub id: SeriesId,
    pub point: IndicatorPoint,
}
