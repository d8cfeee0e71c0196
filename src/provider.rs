pub mod binance;
pub mod polygon;
pub mod twelvedata;
pub mod yahoo;

use std::collections::HashMap;
use std::sync::Arc;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;

use crate::config::ProvidersConfig;
use crate::error::FetchError;
use crate::model::{Bar, Interval, SourceId};
use crate::normalize::normalize;

use binance::BinanceProvider;
use polygon::PolygonProvider;
use twelvedata::TwelveDataProvider;
use yahoo::YahooProvider;

/// Abstraction over one external market data source.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn Provider`).
pub trait Provider: Send + Sync {
    fn kind(&self) -> SourceId;

    /// Whether the credentials this provider needs are present.
    fn is_configured(&self) -> bool {
        true
    }

    /// Fetch up to `limit` bars, oldest first.
    fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<FetchError>>>;
}

/// Source identifier → adapter.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<SourceId, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the five adapters from configuration.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BinanceProvider::global(config.binance_hosts.clone())));
        registry.register(Arc::new(BinanceProvider::us(config.binance_us_host.clone())));
        registry.register(Arc::new(YahooProvider::new(config.user_agent.clone())));
        registry.register(Arc::new(PolygonProvider::new(config.polygon_key())));
        registry.register(Arc::new(TwelveDataProvider::new(config.twelvedata_key())));
        registry
    }

    /// Register `provider` under its own kind, replacing any previous entry.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, source: SourceId) -> Option<&Arc<dyn Provider>> {
        self.providers.get(&source)
    }
}

/// Send `request`, require a 2xx and normalize the body as `provider`'s wire shape.
pub(crate) async fn send_and_normalize(
    request: reqwest::RequestBuilder,
    provider: SourceId,
) -> Result<Vec<Bar>, Report<FetchError>> {
    let response = request
        .send()
        .await
        .change_context(FetchError::Request { provider })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Report::new(FetchError::Provider {
            provider,
            status: status.as_u16(),
        }));
    }

    let body = response
        .bytes()
        .await
        .change_context(FetchError::Request { provider })?;
    normalize(provider, &body)
}

/// Keep only the newest `limit` bars.
pub(crate) fn keep_last(mut bars: Vec<Bar>, limit: usize) -> Vec<Bar> {
    if bars.len() > limit {
        bars.drain(..bars.len() - limit);
    }
    bars
}
