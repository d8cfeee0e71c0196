pub mod ma;
pub mod macd;
pub mod rsi;
pub mod volume;

use error_stack::Report;
use tracing::debug;

use crate::config::IndicatorConfig;
use crate::error::IndicatorError;
use crate::model::{Bar, IndicatorPoint, IndicatorSeries, SeriesUpdate};

use ma::{Ema, Sma};
use macd::Macd;
use rsi::Rsi;
use volume::Volume;

/// A technical analysis indicator over a bar buffer.
///
/// Bars must be in ascending time order (oldest first). Output series are
/// aligned to a suffix of the input bar times; inputs shorter than the
/// warm-up produce empty series rather than an error.
pub trait Indicator: Send {
    /// Short name used in logs (e.g., "rsi", "sma").
    fn name(&self) -> &str;

    /// Minimum number of bars required to produce at least one output value.
    fn warm_up(&self) -> usize;

    /// Trailing bars consumed by an incremental update.
    fn tail_window(&self) -> usize {
        self.warm_up()
    }

    /// Full-history computation.
    fn calculate(&self, bars: &[Bar]) -> Vec<IndicatorSeries>;

    /// Newest point of each series, computed from the trailing window only.
    ///
    /// For recursive indicators (EMA, MACD) this drifts slightly from the
    /// full-history value; a reload recomputes everything.
    fn latest(&self, bars: &[Bar]) -> Vec<SeriesUpdate> {
        let tail = &bars[bars.len().saturating_sub(self.tail_window())..];
        self.calculate(tail)
            .into_iter()
            .filter_map(|series| {
                series.points.last().map(|&point| SeriesUpdate {
                    id: series.id,
                    point,
                })
            })
            .collect()
    }
}

/// Extract close prices from a slice of bars.
pub fn close_prices(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Extract volumes from a slice of bars.
pub fn volumes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume).collect()
}

/// Pair `values` with bar times starting at bar index `offset`.
pub fn align(
    bars: &[Bar],
    offset: usize,
    values: impl IntoIterator<Item = f64>,
) -> Vec<IndicatorPoint> {
    bars.iter()
        .skip(offset)
        .zip(values)
        .map(|(bar, value)| IndicatorPoint {
            time: bar.time,
            value,
        })
        .collect()
}

/// The enabled set of indicators, run together in batch or incremental mode.
pub struct IndicatorEngine {
    indicators: Vec<Box<dyn Indicator>>,
}

impl IndicatorEngine {
    pub fn from_config(config: &IndicatorConfig) -> Result<Self, Report<IndicatorError>> {
        let mut indicators: Vec<Box<dyn Indicator>> = Vec::new();
        if config.show_sma {
            indicators.push(Box::new(Sma::new(config.sma_period)?));
        }
        if config.show_ema {
            indicators.push(Box::new(Ema::new(config.ema_period)?));
        }
        if config.show_rsi {
            indicators.push(Box::new(Rsi::new(config.rsi_period)?));
        }
        if config.show_macd {
            indicators.push(Box::new(Macd::new(
                config.macd_fast,
                config.macd_slow,
                config.macd_signal,
            )?));
        }
        if config.show_volume {
            indicators.push(Box::new(Volume));
        }
        debug!(
            enabled = ?indicators.iter().map(|i| i.name()).collect::<Vec<_>>(),
            "indicator engine ready"
        );
        Ok(Self { indicators })
    }

    pub fn full(&self, bars: &[Bar]) -> Vec<IndicatorSeries> {
        self.indicators
            .iter()
            .flat_map(|indicator| indicator.calculate(bars))
            .collect()
    }

    pub fn incremental(&self, bars: &[Bar]) -> Vec<SeriesUpdate> {
        self.indicators
            .iter()
            .flat_map(|indicator| indicator.latest(bars))
            .collect()
    }
}
