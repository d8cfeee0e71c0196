use std::sync::Arc;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FetchError, StreamError};
use crate::model::{Bar, Interval, SourceId};
use crate::provider::{Provider, send_and_normalize};

pub const BINANCE_MIRRORS: [&str; 5] = [
    "https://api.binance.com",
    "https://api1.binance.com",
    "https://api2.binance.com",
    "https://api3.binance.com",
    "https://data-api.binance.vision",
];
pub const BINANCE_US_HOST: &str = "https://api.binance.us";
pub const BINANCE_WS_BASE: &str = "wss://stream.binance.com:9443/ws";
const MAX_BARS_PER_REQUEST: usize = 1000;

/// Spot klines from Binance or Binance US.
///
/// Holds an ordered list of equivalent hosts; each is tried once until one
/// answers 2xx. Binance US is the single-host case.
pub struct BinanceProvider {
    kind: SourceId,
    client: reqwest::Client,
    hosts: Vec<String>,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl BinanceProvider {
    pub fn global(hosts: Vec<String>) -> Self {
        Self::with_hosts(SourceId::Binance, hosts)
    }

    pub fn us(host: String) -> Self {
        Self::with_hosts(SourceId::BinanceUs, vec![host])
    }

    fn with_hosts(kind: SourceId, hosts: Vec<String>) -> Self {
        // Kline endpoint weight is 2 against a 6000/min budget; 20 req/s leaves headroom.
        let quota = Quota::per_second(nonzero!(20u32));
        Self {
            kind,
            client: reqwest::Client::new(),
            hosts,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

impl Provider for BinanceProvider {
    fn kind(&self) -> SourceId {
        self.kind
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<FetchError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let limit_str = limit.min(MAX_BARS_PER_REQUEST).to_string();
            let params = [
                ("symbol", symbol.as_str()),
                ("interval", interval.binance_interval()),
                ("limit", limit_str.as_str()),
            ];

            let mut last_err = None;
            for host in &self.hosts {
                self.rate_limiter.until_ready().await;

                let url = format!("{host}/api/v3/klines");
                let request = self.client.get(&url).query(&params);
                match send_and_normalize(request, self.kind).await {
                    Ok(bars) => {
                        info!(
                            provider = %self.kind,
                            host = %host,
                            symbol = %symbol,
                            interval = %interval,
                            fetched = bars.len(),
                            "binance kline fetch complete"
                        );
                        return Ok(bars);
                    }
                    // A 2xx with an unusable body is final; mirrors serve the same data.
                    Err(e) if matches!(e.current_context(), FetchError::MalformedResponse { .. }) => {
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(provider = %self.kind, host = %host, error = %e, "binance host failed");
                        last_err = Some(e.attach(format!("host: {host}")));
                    }
                }
            }

            Err(last_err.unwrap_or_else(|| {
                Report::new(FetchError::Request {
                    provider: self.kind,
                })
                .attach("no hosts configured")
            }))
        })
    }
}

// ── Live kline stream ─────────────────────────────────────────────────────────

/// Single kline stream message: `{ "e": "kline", "k": { ... } }`
#[derive(Debug, Deserialize)]
struct KlineEvent {
    k: KlineData,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    /// Kline open time (ms epoch)
    t: i64,
    o: String,
    h: String,
    l: String,
    c: String,
    v: String,
}

/// Decode one stream message into a bar. Anything unusable yields `None`.
pub fn parse_kline_message(text: &str) -> Option<Bar> {
    let event: KlineEvent = serde_json::from_str(text).ok()?;
    let k = event.k;
    let price = |s: &str| s.parse::<f64>().ok().filter(|v| v.is_finite());
    Some(Bar {
        time: k.t.div_euclid(1000),
        open: price(&k.o)?,
        high: price(&k.h)?,
        low: price(&k.l)?,
        close: price(&k.c)?,
        volume: price(&k.v).filter(|v| *v >= 0.0).unwrap_or(0.0),
    })
}

pub fn kline_stream_url(ws_base: &str, symbol: &str, interval: Interval) -> String {
    format!(
        "{}/{}@kline_{}",
        ws_base.trim_end_matches('/'),
        symbol.to_lowercase(),
        interval.binance_interval()
    )
}

/// Stream kline updates for one `(symbol, interval)` into `tx` until `cancel`
/// fires or the server closes the connection. No reconnect is attempted.
pub async fn run_kline_ws(
    ws_base: &str,
    symbol: &str,
    interval: Interval,
    tx: &mpsc::Sender<Bar>,
    cancel: &CancellationToken,
) -> Result<(), Report<StreamError>> {
    let ws_url = kline_stream_url(ws_base, symbol, interval);

    let (ws_stream, _) = connect_async(&ws_url)
        .await
        .change_context_lazy(|| StreamError::Connection {
            url: ws_url.clone(),
        })?;

    let (mut write, mut read) = ws_stream.split();

    info!(symbol, interval = %interval, "binance kline ws connected");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(symbol, "binance kline ws cancelled");
                break;
            }
            msg = read.next() => {
                match msg {
                    None => break,
                    Some(Err(e)) => return Err(Report::new(e)
                        .change_context(StreamError::Connection { url: ws_url })),
                    Some(Ok(Message::Text(text))) => {
                        match parse_kline_message(&text) {
                            Some(bar) => {
                                if tx.send(bar).await.is_err() {
                                    debug!(symbol, "kline receiver dropped");
                                    break;
                                }
                            }
                            None => debug!(raw = %text, "unparseable kline message dropped"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    Ok(())
}
