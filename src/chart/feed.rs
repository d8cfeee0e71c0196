use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::model::{Bar, Interval};
use crate::provider::binance::run_kline_ws;

const CHANNEL_CAPACITY: usize = 256;

struct Subscription {
    symbol: String,
    interval: Interval,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// At most one live kline subscription at a time.
///
/// Subscribing to a new `(symbol, interval)` closes the previous connection
/// first. A dropped or failed connection is logged and not retried.
pub struct LiveFeed {
    ws_base: String,
    active: Option<Subscription>,
}

impl LiveFeed {
    pub fn new(ws_base: impl Into<String>) -> Self {
        Self {
            ws_base: ws_base.into(),
            active: None,
        }
    }

    pub fn subscribe(&mut self, symbol: &str, interval: Interval) -> mpsc::Receiver<Bar> {
        self.close();

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let ws_base = self.ws_base.clone();
        let task_symbol = symbol.to_owned();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = run_kline_ws(&ws_base, &task_symbol, interval, &tx, &task_cancel).await {
                warn!(symbol = %task_symbol, interval = %interval, error = ?e, "live feed stopped");
            }
        });

        info!(symbol, interval = %interval, "live feed subscribed");
        self.active = Some(Subscription {
            symbol: symbol.to_owned(),
            interval,
            cancel,
            handle,
        });
        rx
    }

    pub fn close(&mut self) {
        if let Some(subscription) = self.active.take() {
            subscription.cancel.cancel();
            // Cancellation is only observed once connected; a pending handshake is aborted.
            subscription.handle.abort();
            info!(
                symbol = %subscription.symbol,
                interval = %subscription.interval,
                "live feed closed"
            );
        }
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.close();
    }
}
