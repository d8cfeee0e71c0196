use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::describe;
use crate::fallback::provider_symbol;
use crate::model::{Interval, SourceId};
use crate::provider::ProviderRegistry;

const PROBE_LIMIT: usize = 10;
/// Equity ticker used for the keyed, stock-oriented providers.
const EQUITY_PROBE_SYMBOL: &str = "AAPL";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub symbol: String,
    pub interval: String,
    pub results: BTreeMap<String, ProbeResult>,
}

/// Probe every provider with a small fetch, one after another.
///
/// The keyless providers use `symbol`; Polygon and TwelveData are only
/// probed when their credentials are present, and always with an equity ticker.
pub async fn check(
    registry: &ProviderRegistry,
    symbol: &str,
    interval: Interval,
    timeout: Duration,
) -> HealthReport {
    let mut results = BTreeMap::new();

    for source in [SourceId::Binance, SourceId::BinanceUs, SourceId::Yahoo] {
        let probe_symbol = provider_symbol(source, symbol);
        if let Some(result) = probe(registry, source, &probe_symbol, interval, timeout).await {
            results.insert(source.to_string(), result);
        }
    }

    for source in [SourceId::Polygon, SourceId::TwelveData] {
        let configured = registry.get(source).is_some_and(|p| p.is_configured());
        if !configured {
            continue;
        }
        if let Some(result) = probe(registry, source, EQUITY_PROBE_SYMBOL, interval, timeout).await {
            results.insert(source.to_string(), result);
        }
    }

    info!(
        symbol,
        interval = %interval,
        healthy = results.values().filter(|r| r.ok).count(),
        probed = results.len(),
        "health check complete"
    );

    HealthReport {
        symbol: symbol.to_owned(),
        interval: interval.to_string(),
        results,
    }
}

async fn probe(
    registry: &ProviderRegistry,
    source: SourceId,
    symbol: &str,
    interval: Interval,
    timeout: Duration,
) -> Option<ProbeResult> {
    let provider = registry.get(source)?;
    let started = Instant::now();
    let outcome =
        tokio::time::timeout(timeout, provider.fetch_bars(symbol, interval, PROBE_LIMIT)).await;

    let result = match outcome {
        Ok(Ok(_)) => ProbeResult {
            ok: true,
            ms: Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)),
            error: None,
        },
        Ok(Err(e)) => {
            warn!(provider = %source, symbol, error = %e, "health probe failed");
            ProbeResult {
                ok: false,
                ms: None,
                error: Some(describe(&e)),
            }
        }
        Err(_) => {
            warn!(provider = %source, symbol, "health probe timed out");
            ProbeResult {
                ok: false,
                ms: None,
                error: Some("timeout".into()),
            }
        }
    };
    Some(result)
}
