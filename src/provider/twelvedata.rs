use std::sync::Arc;

use error_stack::{Report, bail};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use tracing::info;

use crate::error::FetchError;
use crate::model::{Bar, Interval, SourceId};
use crate::provider::{Provider, send_and_normalize};

const TWELVEDATA_URL: &str = "https://api.twelvedata.com/time_series";
pub const TWELVEDATA_KEY_VAR: &str = "TWELVEDATA_API_KEY";
const MAX_OUTPUT_SIZE: usize = 5000;

/// TwelveData time series. Requires an API key.
pub struct TwelveDataProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl TwelveDataProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(nonzero!(5u32)))),
        }
    }
}

impl Provider for TwelveDataProvider {
    fn kind(&self) -> SourceId {
        SourceId::TwelveData
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<FetchError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let Some(api_key) = self.api_key.as_deref() else {
                bail!(FetchError::MissingCredential {
                    provider: SourceId::TwelveData,
                    var: TWELVEDATA_KEY_VAR.into(),
                });
            };

            self.rate_limiter.until_ready().await;

            let output_size = limit.min(MAX_OUTPUT_SIZE).to_string();
            let request = self.client.get(TWELVEDATA_URL).query(&[
                ("symbol", symbol.as_str()),
                ("interval", interval.twelvedata_interval()),
                ("outputsize", output_size.as_str()),
                ("apikey", api_key),
            ]);

            let bars = send_and_normalize(request, SourceId::TwelveData).await?;

            info!(
                symbol = %symbol,
                interval = %interval,
                fetched = bars.len(),
                "twelvedata time series fetch complete"
            );
            Ok(bars)
        })
    }
}
