use std::sync::Arc;

use error_stack::Report;
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Url;
use reqwest::header::USER_AGENT;
use tracing::info;

use crate::error::FetchError;
use crate::model::{Bar, Interval, SourceId};
use crate::provider::{Provider, keep_last, send_and_normalize};

const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo Finance chart API. Ranges are interval-derived; `limit` trims the tail.
pub struct YahooProvider {
    client: reqwest::Client,
    user_agent: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl YahooProvider {
    pub fn new(user_agent: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            user_agent,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(nonzero!(5u32)))),
        }
    }
}

fn chart_url(symbol: &str) -> Result<Url, Report<FetchError>> {
    let invalid = || {
        Report::new(FetchError::InvalidRequest {
            reason: format!("cannot build yahoo url for {symbol:?}"),
        })
    };
    let mut url = Url::parse(YAHOO_BASE_URL).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|()| invalid())?
        .pop_if_empty()
        .extend(["v8", "finance", "chart", symbol]);
    Ok(url)
}

impl Provider for YahooProvider {
    fn kind(&self) -> SourceId {
        SourceId::Yahoo
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<FetchError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            self.rate_limiter.until_ready().await;

            let url = chart_url(&symbol)?;
            let request = self
                .client
                .get(url)
                .header(USER_AGENT, &self.user_agent)
                .query(&[
                    ("interval", interval.yahoo_interval()),
                    ("range", interval.yahoo_range()),
                ]);

            let bars = keep_last(send_and_normalize(request, SourceId::Yahoo).await?, limit);

            info!(
                symbol = %symbol,
                interval = %interval,
                fetched = bars.len(),
                "yahoo chart fetch complete"
            );
            Ok(bars)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_url_escapes_symbol() {
        let url = chart_url("BTC-USD").unwrap();
        assert_eq!(
            url.as_str(),
            "https://query1.finance.yahoo.com/v8/finance/chart/BTC-USD"
        );
        let url = chart_url("A/B").unwrap();
        assert!(url.as_str().ends_with("/chart/A%2FB"));
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_bars() {
        let provider = YahooProvider::new("bar-gateway".into());
        let bars = provider
            .fetch_bars("AAPL", Interval::Day1, 20)
            .await
            .unwrap();
        assert!(!bars.is_empty());
        assert!(bars.len() <= 20);
    }
}
