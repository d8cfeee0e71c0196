use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::model::{Bar, BarRequest, SourceId};
use crate::provider::ProviderRegistry;

/// Providers tried, in order, when a request names the `auto` source.
pub const AUTO_CHAIN: [SourceId; 3] = [SourceId::Binance, SourceId::BinanceUs, SourceId::Yahoo];

/// Map an exchange-style crypto pair to Yahoo's ticker form.
///
/// `BTCUSDT` → `BTC-USD`, `ETHUSD` → `ETH-USD`. Anything else (equities,
/// symbols already in `-USD` form) passes through unchanged.
pub fn yahoo_symbol(symbol: &str) -> String {
    let upper = symbol.to_ascii_uppercase();
    if let Some(base) = upper.strip_suffix("USDT")
        && !base.is_empty()
    {
        let base = base.replace(':', "-");
        return format!("{}-USD", base.trim_end_matches('-'));
    }
    if !upper.contains('-')
        && let Some(base) = upper.strip_suffix("USD")
        && !base.is_empty()
    {
        return format!("{base}-USD");
    }
    symbol.to_owned()
}

/// Symbol as the given provider expects it.
pub fn provider_symbol(source: SourceId, symbol: &str) -> String {
    match source {
        SourceId::Yahoo => yahoo_symbol(symbol),
        _ => symbol.to_owned(),
    }
}

/// Chooses the provider(s) for a request and runs them.
#[derive(Clone)]
pub struct FallbackResolver {
    registry: Arc<ProviderRegistry>,
    timeout: Option<Duration>,
}

impl FallbackResolver {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            timeout: None,
        }
    }

    /// Bound every provider attempt by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch bars for `request`.
    ///
    /// An explicit source is tried once and its error surfaces unchanged.
    /// `auto` walks [`AUTO_CHAIN`] and returns the first success; if every
    /// link fails, the last failure is wrapped in `AllProvidersFailed`.
    pub async fn resolve(&self, request: &BarRequest) -> Result<Vec<Bar>, Report<FetchError>> {
        if request.source != SourceId::Auto {
            return self.attempt(request.source, request).await;
        }

        let mut last_err = None;
        for source in AUTO_CHAIN {
            match self.attempt(source, request).await {
                Ok(bars) => {
                    info!(
                        provider = %source,
                        symbol = %request.symbol,
                        interval = %request.interval,
                        bars = bars.len(),
                        "auto source resolved"
                    );
                    return Ok(bars);
                }
                Err(e) => {
                    warn!(provider = %source, symbol = %request.symbol, error = %e, "auto source attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => e.change_context(FetchError::AllProvidersFailed),
            None => Report::new(FetchError::AllProvidersFailed),
        })
    }

    async fn attempt(
        &self,
        source: SourceId,
        request: &BarRequest,
    ) -> Result<Vec<Bar>, Report<FetchError>> {
        let Some(provider) = self.registry.get(source) else {
            return Err(Report::new(FetchError::UnknownSource {
                name: source.to_string(),
            }));
        };

        let symbol = provider_symbol(source, &request.symbol);
        let fetch = provider.fetch_bars(&symbol, request.interval, request.limit);

        match self.timeout {
            None => fetch.await,
            Some(limit) => tokio::time::timeout(limit, fetch).await.unwrap_or_else(|_| {
                Err(Report::new(FetchError::Timeout {
                    provider: source,
                    millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }))
            }),
        }
    }
}
