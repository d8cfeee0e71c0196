use tracing::{debug, info};

use crate::chart::viewport::ViewportRange;
use crate::model::{Bar, IndicatorPoint, SeriesId};
use crate::surface::RenderSurface;

/// Renders to the log: full loads at `info`, per-tick updates at `debug`.
pub struct LogSurface {
    symbol: String,
}

impl LogSurface {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }
}

impl RenderSurface for LogSurface {
    fn set_bars(&mut self, bars: &[Bar]) {
        info!(
            symbol = %self.symbol,
            bars = bars.len(),
            first = bars.first().map(|b| b.time),
            last = bars.last().map(|b| b.time),
            "bars loaded"
        );
    }

    fn update_bar(&mut self, bar: &Bar) {
        info!(
            symbol = %self.symbol,
            time = bar.time,
            open = bar.open,
            high = bar.high,
            low = bar.low,
            close = bar.close,
            volume = bar.volume,
            "bar"
        );
    }

    fn set_series(&mut self, id: SeriesId, points: &[IndicatorPoint]) {
        info!(
            symbol = %self.symbol,
            series = %id,
            points = points.len(),
            latest = points.last().map(|p| p.value),
            "series loaded"
        );
    }

    fn apply_update(&mut self, id: SeriesId, point: IndicatorPoint) {
        debug!(
            symbol = %self.symbol,
            series = %id,
            time = point.time,
            value = point.value,
            "series updated"
        );
    }

    fn set_visible_range(&mut self, range: ViewportRange) {
        debug!(symbol = %self.symbol, from = range.from, to = range.to, "visible range");
    }
}
