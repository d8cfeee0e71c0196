use std::sync::Arc;

use chrono::{Months, NaiveDate, Utc};
use error_stack::{Report, bail};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Url;
use tracing::info;

use crate::error::FetchError;
use crate::model::{Bar, Interval, SourceId};
use crate::provider::{Provider, keep_last, send_and_normalize};

const POLYGON_BASE_URL: &str = "https://api.polygon.io";
pub const POLYGON_KEY_VAR: &str = "POLYGON_API_KEY";

/// Polygon aggregates over the trailing year. Requires an API key.
pub struct PolygonProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl PolygonProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(nonzero!(5u32)))),
        }
    }
}

/// `/v2/aggs/ticker/{symbol}/range/{mult}/{unit}/{from}/{to}`
fn aggregates_url(
    symbol: &str,
    interval: Interval,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Url, Report<FetchError>> {
    let invalid = || {
        Report::new(FetchError::InvalidRequest {
            reason: format!("cannot build polygon url for {symbol:?}"),
        })
    };
    let (multiplier, unit) = interval.polygon_span();
    let multiplier = multiplier.to_string();
    let from = from.format("%Y-%m-%d").to_string();
    let to = to.format("%Y-%m-%d").to_string();
    let mut url = Url::parse(POLYGON_BASE_URL).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|()| invalid())?
        .pop_if_empty()
        .extend([
            "v2",
            "aggs",
            "ticker",
            symbol,
            "range",
            multiplier.as_str(),
            unit,
            from.as_str(),
            to.as_str(),
        ]);
    Ok(url)
}

impl Provider for PolygonProvider {
    fn kind(&self) -> SourceId {
        SourceId::Polygon
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
                    provider: SourceId::Polygon,
                    var: POLYGON_KEY_VAR.into(),
                });
            };

            self.rate_limiter.until_ready().await;

            let to = Utc::now().date_naive();
            let from = to.checked_sub_months(Months::new(12)).unwrap_or(to);
            let url = aggregates_url(&symbol, interval, from, to)?;
            let request = self.client.get(url).query(&[
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
                ("apiKey", api_key),
            ]);

            let bars = keep_last(send_and_normalize(request, SourceId::Polygon).await?, limit);

            info!(
                symbol = %symbol,
                interval = %interval,
                fetched = bars.len(),
                "polygon aggregates fetch complete"
            );
            Ok(bars)
        })
    }
}
