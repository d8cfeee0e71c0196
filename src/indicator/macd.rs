use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Ema;
use crate::indicator::{Indicator, align, close_prices};
use crate::model::{Bar, IndicatorSeries, SeriesId};

pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    slow_period: usize,
    signal_period: usize,
}

/// MACD line, signal line and histogram, index-aligned with each other.
#[derive(Debug, Default, PartialEq)]
pub struct MacdValues {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "all periods must be > 0".into(),
            });
        }
        if fast_period >= slow_period {
            bail!(IndicatorError::InvalidParameter {
                name: "fast_period must be < slow_period".into(),
            });
        }
        Ok(Self {
            fast: Ema::new(fast_period)?,
            slow: Ema::new(slow_period)?,
            signal: Ema::new(signal_period)?,
            slow_period,
            signal_period,
        })
    }

    /// Both EMAs run over the whole input; outputs start once the slow EMA
    /// is past its warm-up. The signal EMA is seeded with the first MACD value
    /// and keeps every output.
    pub fn calculate_prices(&self, prices: &[f64]) -> MacdValues {
        if prices.len() < self.slow_period {
            return MacdValues::default();
        }

        let fast = self.fast.recurrence(prices);
        let slow = self.slow.recurrence(prices);
        let line: Vec<f64> = fast
            .iter()
            .zip(&slow)
            .skip(self.slow_period - 1)
            .map(|(f, s)| f - s)
            .collect();

        let signal = self.signal.recurrence(&line);
        let histogram = line.iter().zip(&signal).map(|(m, s)| m - s).collect();

        MacdValues {
            line,
            signal,
            histogram,
        }
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        "macd"
    }

    fn warm_up(&self) -> usize {
        self.slow_period
    }

    fn tail_window(&self) -> usize {
        self.slow_period + self.signal_period - 1
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<IndicatorSeries> {
        let values = self.calculate_prices(&close_prices(bars));
        let offset = self.slow_period - 1;
        vec![
            IndicatorSeries {
                id: SeriesId::MacdLine,
                points: align(bars, offset, values.line),
            },
            IndicatorSeries {
                id: SeriesId::MacdSignal,
                points: align(bars, offset, values.signal),
            },
            IndicatorSeries {
                id: SeriesId::MacdHistogram,
                points: align(bars, offset, values.histogram),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::testing::bars_from_closes;

    #[test]
    fn macd_invalid_params() {
        assert!(Macd::new(0, 26, 9).is_err());
        assert!(Macd::new(26, 12, 9).is_err());
        assert!(Macd::new(12, 12, 9).is_err());
    }

    #[test]
    fn macd_insufficient_data_is_empty() {
        let macd = Macd::new(12, 26, 9).unwrap();
        let series = macd.calculate(&bars_from_closes(&[1.0; 25]));
        assert_eq!(series.len(), 3);
        assert!(series.iter().all(|s| s.points.is_empty()));
    }

    #[test]
    fn macd_flat_prices_zero() {
        let macd = Macd::new(12, 26, 9).unwrap();
        let values = macd.calculate_prices(&[100.0; 50]);
        assert_eq!(values.line.len(), 50 - 25);
        for ((m, s), h) in values.line.iter().zip(&values.signal).zip(&values.histogram) {
            assert!(m.abs() < 1e-9);
            assert!(s.abs() < 1e-9);
            assert!(h.abs() < 1e-9);
        }
    }

    #[test]
    fn macd_series_align_to_slow_warm_up() {
        let closes: Vec<f64> = (1..=40).map(|i| i as f64).collect();
        let bars = bars_from_closes(&closes);
        let series = Macd::new(12, 26, 9).unwrap().calculate(&bars);
        for s in &series {
            assert_eq!(s.points.len(), 40 - 25);
            assert_eq!(s.points[0].time, bars[25].time);
        }
        // Rising prices: fast EMA sits above slow EMA.
        assert!(series[0].points.iter().all(|p| p.value > 0.0));
        // Signal is seeded with the first MACD value.
        assert_eq!(series[1].points[0].value, series[0].points[0].value);
        assert_eq!(series[2].points[0].value, 0.0);
    }
}
