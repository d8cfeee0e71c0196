use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, align, close_prices};
use crate::model::{Bar, IndicatorSeries, SeriesId};

/// RSI over a plain trailing average of the last `period` price changes.
///
/// This is not Wilder's smoothing: every output depends only on the
/// `period + 1` closes that end at its bar, so an incremental update over
/// the tail matches the batch value exactly.
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// One value per window of `period` deltas; the first belongs to close index `period`.
    pub fn calculate_prices(&self, prices: &[f64]) -> Vec<f64> {
        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
        deltas
            .windows(self.period)
            .map(|window| {
                let gain: f64 = window.iter().map(|&d| d.max(0.0)).sum();
                let loss: f64 = window.iter().map(|&d| (-d).max(0.0)).sum();
                rsi_value(gain / self.period as f64, loss / self.period as f64)
            })
            .collect()
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn warm_up(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<IndicatorSeries> {
        let values = self.calculate_prices(&close_prices(bars));
        vec![IndicatorSeries {
            id: SeriesId::Rsi(self.period),
            points: align(bars, self.period, values),
        }]
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    // No losses: RS is pinned at 100, so RSI tops out just above 99.
    let rs = if avg_loss == 0.0 {
        100.0
    } else {
        avg_gain / avg_loss
    };
    100.0 - 100.0 / (1.0 + rs)
}
