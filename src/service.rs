use std::sync::Arc;

use error_stack::Report;
use tracing::{debug, info};

use crate::cache::BarCache;
use crate::error::FetchError;
use crate::fallback::FallbackResolver;
use crate::model::{Bar, BarRequest};

/// Cache-fronted bar retrieval.
pub struct BarService {
    cache: Arc<dyn BarCache>,
    resolver: FallbackResolver,
}

impl BarService {
    pub fn new(cache: Arc<dyn BarCache>, resolver: FallbackResolver) -> Self {
        Self { cache, resolver }
    }

    /// Serve from cache when fresh, otherwise resolve and store. Failures are never cached.
    pub async fn get_bars(&self, request: &BarRequest) -> Result<Vec<Bar>, Report<FetchError>> {
        let key = request.cache_key();
        if let Some(bars) = self.cache.get(&key).await {
            debug!(key = %key, bars = bars.len(), "cache hit");
            return Ok(bars);
        }

        let bars = self.resolver.resolve(request).await?;
        self.cache.put(&key, &bars).await;
        info!(key = %key, bars = bars.len(), "bars fetched and cached");
        Ok(bars)
    }
}
