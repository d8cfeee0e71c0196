//! Provider wire shapes and their conversion to canonical [`Bar`]s.
//!
//! Pure functions only: no I/O and no retry logic. A response that cannot be
//! mapped field-for-field fails with [`FetchError::MalformedResponse`].

use chrono::{NaiveDate, NaiveDateTime};
use error_stack::{Report, ResultExt, bail};
use serde::Deserialize;
use serde::de::IgnoredAny;

use crate::error::FetchError;
use crate::model::{Bar, SourceId};

/// Convert one provider's raw response body into bars in ascending time order.
pub fn normalize(source: SourceId, raw: &[u8]) -> Result<Vec<Bar>, Report<FetchError>> {
    match source {
        SourceId::Binance | SourceId::BinanceUs => binance(source, raw),
        SourceId::Yahoo => yahoo(raw),
        SourceId::Polygon => polygon(raw),
        SourceId::TwelveData => twelvedata(raw),
        SourceId::Auto => bail!(FetchError::UnknownSource {
            name: source.to_string(),
        }),
    }
}

fn malformed(provider: SourceId) -> FetchError {
    FetchError::MalformedResponse { provider }
}

/// Parse a numeric field, rejecting anything that is not a finite number.
fn finite(provider: SourceId, field: &str, value: Option<f64>) -> Result<f64, Report<FetchError>> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(Report::new(malformed(provider)).attach(format!("field {field} missing or non-finite"))),
    }
}

fn parse_str(provider: SourceId, field: &str, raw: &str) -> Result<f64, Report<FetchError>> {
    let value = raw
        .parse::<f64>()
        .change_context_lazy(|| malformed(provider))
        .attach_with(|| format!("{field}: {raw:?}"))?;
    finite(provider, field, Some(value))
}

/// Volume is optional on some venues; anything unusable counts as zero.
fn volume(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        _ => 0.0,
    }
}

fn millis_to_secs(ms: i64) -> i64 {
    ms.div_euclid(1000)
}

// ── Binance / Binance US ──────────────────────────────────────────────────────

/// Binance kline row: 12-element array
/// [open_time, open, high, low, close, volume, close_time, ...]
#[derive(Debug, Deserialize)]
struct BinanceKlineRow(
    i64,        // 0: open_time (ms)
    String,     // 1: open
    String,     // 2: high
    String,     // 3: low
    String,     // 4: close
    String,     // 5: volume
    IgnoredAny, // 6: close_time
    IgnoredAny, // 7: quote asset volume
    IgnoredAny, // 8: number of trades
    IgnoredAny, // 9: taker buy base volume
    IgnoredAny, // 10: taker buy quote volume
    IgnoredAny, // 11: ignore
);

impl BinanceKlineRow {
    fn into_bar(self, provider: SourceId) -> Result<Bar, Report<FetchError>> {
        Ok(Bar {
            time: millis_to_secs(self.0),
            open: parse_str(provider, "open", &self.1)?,
            high: parse_str(provider, "high", &self.2)?,
            low: parse_str(provider, "low", &self.3)?,
            close: parse_str(provider, "close", &self.4)?,
            volume: volume(self.5.parse::<f64>().ok()),
        })
    }
}

fn binance(provider: SourceId, raw: &[u8]) -> Result<Vec<Bar>, Report<FetchError>> {
    let rows: Vec<BinanceKlineRow> =
        serde_json::from_slice(raw).change_context_lazy(|| malformed(provider))?;
    rows.into_iter().map(|row| row.into_bar(provider)).collect()
}

// ── Yahoo chart API ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct YahooEnvelope {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    #[serde(default)]
    result: Option<Vec<YahooResult>>,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    #[serde(default)]
    quote: Vec<YahooQuote>,
}

/// Parallel arrays; Yahoo emits `null` for intervals without trades.
#[derive(Debug, Default, Deserialize)]
struct YahooQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn yahoo(raw: &[u8]) -> Result<Vec<Bar>, Report<FetchError>> {
    let provider = SourceId::Yahoo;
    let envelope: YahooEnvelope =
        serde_json::from_slice(raw).change_context_lazy(|| malformed(provider))?;
    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Err(Report::new(malformed(provider)).attach("chart result empty"));
    };
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |column: &[Option<f64>], i: usize| column.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, &time) in result.timestamp.iter().enumerate() {
        // Rows without a usable close are gaps, not errors.
        let Some(close) = at(&quote.close, i).filter(|c| c.is_finite()) else {
            continue;
        };
        bars.push(Bar {
            time,
            open: finite(provider, "open", at(&quote.open, i))?,
            high: finite(provider, "high", at(&quote.high, i))?,
            low: finite(provider, "low", at(&quote.low, i))?,
            close,
            volume: volume(at(&quote.volume, i)),
        });
    }
    Ok(bars)
}

// ── Polygon aggregates ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PolygonEnvelope {
    #[serde(default)]
    results: Option<Vec<PolygonAgg>>,
}

#[derive(Debug, Deserialize)]
struct PolygonAgg {
    t: i64,
    o: Option<f64>,
    h: Option<f64>,
    l: Option<f64>,
    c: Option<f64>,
    #[serde(default)]
    v: Option<f64>,
}

fn polygon(raw: &[u8]) -> Result<Vec<Bar>, Report<FetchError>> {
    let provider = SourceId::Polygon;
    let envelope: PolygonEnvelope =
        serde_json::from_slice(raw).change_context_lazy(|| malformed(provider))?;
    envelope
        .results
        .unwrap_or_default()
        .into_iter()
        .map(|agg| {
            Ok(Bar {
                time: millis_to_secs(agg.t),
                open: finite(provider, "o", agg.o)?,
                high: finite(provider, "h", agg.h)?,
                low: finite(provider, "l", agg.l)?,
                close: finite(provider, "c", agg.c)?,
                volume: volume(agg.v),
            })
        })
        .collect()
}

// ── TwelveData time series ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TwelveDataEnvelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    values: Option<Vec<TwelveDataValue>>,
}

#[derive(Debug, Deserialize)]
struct TwelveDataValue {
    datetime: String,
    open: String,
    high: String,
    low: String,
    close: String,
    #[serde(default)]
    volume: Option<String>,
}

/// TwelveData sends either `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`, read as UTC.
fn parse_datetime(raw: &str) -> Option<i64> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

fn twelvedata(raw: &[u8]) -> Result<Vec<Bar>, Report<FetchError>> {
    let provider = SourceId::TwelveData;
    let envelope: TwelveDataEnvelope =
        serde_json::from_slice(raw).change_context_lazy(|| malformed(provider))?;

    if envelope.status.as_deref() == Some("error") {
        return Err(Report::new(FetchError::Provider {
            provider,
            status: envelope.code.unwrap_or(400),
        })
        .attach(envelope.message.unwrap_or_default()));
    }

    let mut bars = envelope
        .values
        .unwrap_or_default()
        .into_iter()
        .map(|v| {
            let Some(time) = parse_datetime(&v.datetime) else {
                return Err(Report::new(malformed(provider))
                    .attach(format!("datetime: {:?}", v.datetime)));
            };
            Ok(Bar {
                time,
                open: parse_str(provider, "open", &v.open)?,
                high: parse_str(provider, "high", &v.high)?,
                low: parse_str(provider, "low", &v.low)?,
                close: parse_str(provider, "close", &v.close)?,
                volume: volume(v.volume.and_then(|s| s.parse::<f64>().ok())),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Delivered newest-first.
    bars.reverse();
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binance_rows_parse_into_bars() {
        let raw = br#"[
            [1704067200000,"42000.0","43000.0","41500.0","42500.0","100.5",1704153599999,"0",10,"0","0","0"],
            [1704153600000,"42500.0","44000.0","42000.0","43800.0","80.25",1704239999999,"0",12,"0","0","0"]
        ]"#;
        let bars = normalize(SourceId::Binance, raw).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].time, 1_704_067_200);
        assert_eq!(bars[0].open, 42000.0);
        assert_eq!(bars[0].close, 42500.0);
        assert_eq!(bars[1].volume, 80.25);
    }

    #[test]
    fn binance_non_numeric_price_is_malformed() {
        let raw = br#"[[1704067200000,"abc","1","1","1","1",0,"0",0,"0","0","0"]]"#;
        let err = normalize(SourceId::BinanceUs, raw).unwrap_err();
        assert_eq!(
            *err.current_context(),
            FetchError::MalformedResponse {
                provider: SourceId::BinanceUs
            }
        );
    }

    #[test]
    fn binance_nan_string_is_malformed() {
        let raw = br#"[[1704067200000,"NaN","1","1","1","1",0,"0",0,"0","0","0"]]"#;
        assert!(normalize(SourceId::Binance, raw).is_err());
    }

    #[test]
    fn binance_error_object_is_malformed() {
        let raw = br#"{"code":-1121,"msg":"Invalid symbol."}"#;
        assert!(normalize(SourceId::Binance, raw).is_err());
    }

    #[test]
    fn yahoo_drops_rows_without_close() {
        let raw = br#"{"chart":{"result":[{
            "timestamp":[100,200,300],
            "indicators":{"quote":[{
                "open":[1.0,null,3.0],
                "high":[1.5,null,3.5],
                "low":[0.5,null,2.5],
                "close":[1.2,null,3.2],
                "volume":[10,null,null]
            }]}
        }]}}"#;
        let bars = normalize(SourceId::Yahoo, raw).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].time, 100);
        assert_eq!(bars[1].time, 300);
        assert_eq!(bars[1].volume, 0.0);
    }

    #[test]
    fn yahoo_empty_result_is_malformed() {
        let raw = br#"{"chart":{"result":null,"error":{"code":"Not Found"}}}"#;
        assert!(normalize(SourceId::Yahoo, raw).is_err());
    }

    #[test]
    fn polygon_aggregates_convert_millis() {
        let raw = br#"{"results":[{"t":1704067200999,"o":1,"h":2,"l":0.5,"c":1.5,"v":1000}]}"#;
        let bars = normalize(SourceId::Polygon, raw).unwrap();
        assert_eq!(bars[0].time, 1_704_067_200);
        assert_eq!(bars[0].high, 2.0);
    }

    #[test]
    fn polygon_without_results_is_empty() {
        let raw = br#"{"status":"OK","resultsCount":0}"#;
        assert!(normalize(SourceId::Polygon, raw).unwrap().is_empty());
    }

    #[test]
    fn polygon_missing_price_is_malformed() {
        let raw = br#"{"results":[{"t":1,"o":1,"h":2,"l":0.5,"v":1}]}"#;
        assert!(normalize(SourceId::Polygon, raw).is_err());
    }

    #[test]
    fn twelvedata_is_reversed_to_chronological() {
        let raw = br#"{"status":"ok","values":[
            {"datetime":"2024-01-03","open":"3","high":"3","low":"3","close":"3","volume":"30"},
            {"datetime":"2024-01-02","open":"2","high":"2","low":"2","close":"2","volume":"20"},
            {"datetime":"2024-01-01 09:30:00","open":"1","high":"1","low":"1","close":"1"}
        ]}"#;
        let bars = normalize(SourceId::TwelveData, raw).unwrap();
        let times: Vec<i64> = bars.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![1_704_101_400, 1_704_153_600, 1_704_240_000]);
        assert_eq!(bars[0].volume, 0.0);
        assert_eq!(bars[2].close, 3.0);
    }

    #[test]
    fn twelvedata_error_body_maps_to_provider_status() {
        let raw = br#"{"status":"error","code":429,"message":"API credits exhausted"}"#;
        let err = normalize(SourceId::TwelveData, raw).unwrap_err();
        assert_eq!(
            *err.current_context(),
            FetchError::Provider {
                provider: SourceId::TwelveData,
                status: 429
            }
        );
    }

    #[test]
    fn auto_is_not_a_wire_shape() {
        assert!(normalize(SourceId::Auto, b"[]").is_err());
    }
}
