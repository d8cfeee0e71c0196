pub mod log;

use crate::chart::viewport::ViewportRange;
use crate::model::{Bar, IndicatorPoint, SeriesId};

/// Sink for everything a chart session draws.
///
/// `set_*` replaces a series wholesale; `update_bar`/`apply_update` touch
/// only the newest point (replacing it when the time matches, appending otherwise).
pub trait RenderSurface: Send {
    fn set_bars(&mut self, bars: &[Bar]);

    fn update_bar(&mut self, bar: &Bar);

    fn set_series(&mut self, id: SeriesId, points: &[IndicatorPoint]);

    fn apply_update(&mut self, id: SeriesId, point: IndicatorPoint);

    fn set_visible_range(&mut self, range: ViewportRange);
}
