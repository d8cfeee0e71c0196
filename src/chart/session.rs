use error_stack::Report;
use tracing::debug;

use crate::chart::buffer::{BarBuffer, MergeOutcome};
use crate::chart::viewport::{Viewport, ViewportRange};
use crate::error::ChartError;
use crate::indicator::{IndicatorEngine, align, close_prices};
use crate::model::{Bar, IndicatorPoint, Interval, SeriesId};
use crate::surface::RenderSurface;

/// One chart: the bar buffer, its indicators and visible window, drawn onto `S`.
///
/// All mutation goes through `&mut self`; a single task owns the session.
pub struct ChartSession<S: RenderSurface> {
    buffer: BarBuffer,
    engine: IndicatorEngine,
    viewport: Viewport,
    interval: Interval,
    surface: S,
}

impl<S: RenderSurface> ChartSession<S> {
    pub fn new(
        surface: S,
        engine: IndicatorEngine,
        interval: Interval,
        right_pad: u32,
    ) -> Result<Self, Report<ChartError>> {
        Ok(Self {
            buffer: BarBuffer::new(),
            engine,
            viewport: Viewport::new(right_pad)?,
            interval,
            surface,
        })
    }

    #[allow(dead_code)]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    #[allow(dead_code)]
    pub fn bars(&self) -> &[Bar] {
        self.buffer.bars()
    }

    /// Replace the history and redraw everything from a full recompute.
    pub fn load(&mut self, bars: Vec<Bar>, interval: Interval) {
        self.interval = interval;
        self.buffer.replace(bars);
        let bars = self.buffer.bars();

        self.surface.set_bars(bars);
        self.surface
            .set_series(SeriesId::Close, &align(bars, 0, close_prices(bars)));
        for series in self.engine.full(bars) {
            self.surface.set_series(series.id, &series.points);
        }

        if let Some(range) = self.viewport.on_data_loaded(self.buffer.len(), self.interval) {
            self.surface.set_visible_range(range);
        }
    }

    /// Merge one live bar and push only what changed.
    pub fn on_bar(&mut self, bar: Bar) -> MergeOutcome {
        let outcome = self.buffer.merge(bar);
        if outcome == MergeOutcome::Ignored {
            debug!(time = bar.time, "stale live bar ignored");
            return outcome;
        }

        self.surface.update_bar(&bar);
        self.surface.apply_update(
            SeriesId::Close,
            IndicatorPoint {
                time: bar.time,
                value: bar.close,
            },
        );
        for update in self.engine.incremental(self.buffer.bars()) {
            self.surface.apply_update(update.id, update.point);
        }

        if let Some(range) = self.viewport.on_bars_changed(self.buffer.len()) {
            self.surface.set_visible_range(range);
        }
        outcome
    }

    /// The surface reports a scroll or zoom.
    ///
    /// Called by a surface adapter with an interactive range; the log
    /// surface has none, so `watch` never reaches it.
    #[allow(dead_code)]
    pub fn on_range_changed(&mut self, range: ViewportRange) {
        if let Some(adjusted) = self.viewport.on_range_changed(range, self.buffer.len()) {
            self.surface.set_visible_range(adjusted);
        }
    }

    /// Settings hook for a surface adapter; rejects pads above the maximum.
    #[allow(dead_code)]
    pub fn set_right_pad(&mut self, right_pad: u32) -> Result<(), Report<ChartError>> {
        if let Some(adjusted) = self.viewport.set_right_pad(right_pad, self.buffer.len())? {
            self.surface.set_visible_range(adjusted);
        }
        Ok(())
    }
}
