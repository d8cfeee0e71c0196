use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, align, close_prices};
use crate::model::{Bar, IndicatorSeries, SeriesId};

/// Simple Moving Average.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// One mean per full window; empty when `prices` is shorter than the period.
    pub fn calculate_prices(&self, prices: &[f64]) -> Vec<f64> {
        prices
            .windows(self.period)
            .map(|w| w.iter().sum::<f64>() / self.period as f64)
            .collect()
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        "sma"
    }

    fn warm_up(&self) -> usize {
        self.period
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<IndicatorSeries> {
        let values = self.calculate_prices(&close_prices(bars));
        vec![IndicatorSeries {
            id: SeriesId::Sma(self.period),
            points: align(bars, self.period - 1, values),
        }]
    }
}

/// Exponential Moving Average.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// The recurrence over every input, seeded with `prices[0]`.
    ///
    /// Output has the same length as `prices`; the first `period - 1` values
    /// are warm-up and callers discard them.
    pub fn recurrence(&self, prices: &[f64]) -> Vec<f64> {
        let k = 2.0 / (self.period as f64 + 1.0);
        let mut out = Vec::with_capacity(prices.len());
        let mut prev = None;
        for &price in prices {
            let ema = match prev {
                None => price,
                Some(prev) => price * k + prev * (1.0 - k),
            };
            out.push(ema);
            prev = Some(ema);
        }
        out
    }

    pub fn calculate_prices(&self, prices: &[f64]) -> Vec<f64> {
        self.recurrence(prices)
            .into_iter()
            .skip(self.period - 1)
            .collect()
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        "ema"
    }

    fn warm_up(&self) -> usize {
        self.period
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<IndicatorSeries> {
        let values = self.calculate_prices(&close_prices(bars));
        vec![IndicatorSeries {
            id: SeriesId::Ema(self.period),
            points: align(bars, self.period - 1, values),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::testing::bars_from_closes;

    fn one_to(n: usize) -> Vec<Bar> {
        let closes: Vec<f64> = (1..=n).map(|i| i as f64).collect();
        bars_from_closes(&closes)
    }

    #[test]
    fn sma_period_zero_invalid() {
        assert!(Sma::new(0).is_err());
    }

    #[test]
    fn sma_insufficient_data_is_empty() {
        let sma = Sma::new(5).unwrap();
        let series = sma.calculate(&bars_from_closes(&[1.0; 4]));
        assert!(series[0].points.is_empty());
    }

    #[test]
    fn sma_known_value() {
        let sma = Sma::new(3).unwrap();
        let values = sma.calculate_prices(&[1.0, 2.0, 3.0, 4.0]);
        // (1+2+3)/3 = 2.0, (2+3+4)/3 = 3.0
        assert!((values[0] - 2.0).abs() < 1e-9);
        assert!((values[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn sma20_over_thirty_closes_aligns_to_twentieth_bar() {
        let bars = one_to(30);
        let series = Sma::new(20).unwrap().calculate(&bars);
        let points = &series[0].points;
        assert_eq!(series[0].id, SeriesId::Sma(20));
        assert_eq!(points.len(), 30 - 19);
        assert_eq!(points[0].time, bars[19].time);
        assert!((points[0].value - 10.5).abs() < 1e-9);
        assert_eq!(points.last().unwrap().time, bars[29].time);
    }

    #[test]
    fn ema_period_zero_invalid() {
        assert!(Ema::new(0).is_err());
    }

    #[test]
    fn ema50_drops_warm_up_outputs() {
        let bars = one_to(80);
        let series = Ema::new(50).unwrap().calculate(&bars);
        let points = &series[0].points;
        assert_eq!(points.len(), 80 - 49);
        assert_eq!(points[0].time, bars[49].time);
    }

    #[test]
    fn ema_seeded_with_first_value() {
        let ema = Ema::new(3).unwrap();
        let values = ema.recurrence(&[2.0, 4.0]);
        // k = 0.5: 2.0, then 4*0.5 + 2*0.5 = 3.0
        assert_eq!(values, vec![2.0, 3.0]);
    }

    #[test]
    fn ema_flat_prices() {
        let ema = Ema::new(3).unwrap();
        for v in ema.calculate_prices(&[10.0; 6]) {
            assert!((v - 10.0).abs() < 1e-9);
        }
    }
}
