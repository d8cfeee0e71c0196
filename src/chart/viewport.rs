use error_stack::{Report, bail};

use crate::error::ChartError;
use crate::model::Interval;

pub const MAX_RIGHT_PAD: u32 = 50;

/// Visible window in logical bar indices. Fractional edges are allowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRange {
    pub from: f64,
    pub to: f64,
}

/// Shift `range` left so its right edge is at most `last_bar_index + right_pad`.
///
/// Width is preserved; ranges already in bounds are returned unchanged.
pub fn clamp(range: ViewportRange, last_bar_index: usize, right_pad: u32) -> ViewportRange {
    let max_to = last_bar_index as f64 + f64::from(right_pad);
    if range.to <= max_to {
        return range;
    }
    let width = range.to - range.from;
    ViewportRange {
        from: max_to - width,
        to: max_to,
    }
}

/// Tracks the visible range and keeps it clamped to the data.
///
/// Every method returns the range the surface should display when it
/// changed. A surface that reports range changes back will echo that range
/// once; the echo is recognised and not clamped again.
#[derive(Debug)]
pub struct Viewport {
    range: Option<ViewportRange>,
    right_pad: u32,
    echo: Option<ViewportRange>,
}

impl Viewport {
    pub fn new(right_pad: u32) -> Result<Self, Report<ChartError>> {
        check_pad(right_pad)?;
        Ok(Self {
            range: None,
            right_pad,
            echo: None,
        })
    }

    #[allow(dead_code)]
    pub fn range(&self) -> Option<ViewportRange> {
        self.range
    }

    #[allow(dead_code)]
    pub fn right_pad(&self) -> u32 {
        self.right_pad
    }

    /// A fresh history of `bar_count` bars was loaded.
    ///
    /// Keeps the previous range if there was one, otherwise shows the
    /// interval's default window ending at the right pad.
    pub fn on_data_loaded(&mut self, bar_count: usize, interval: Interval) -> Option<ViewportRange> {
        let last = bar_count.checked_sub(1)?;
        let base = self.range.unwrap_or_else(|| ViewportRange {
            from: (last as f64 - interval.default_window() as f64).max(0.0),
            to: last as f64 + f64::from(self.right_pad),
        });
        Some(self.publish(clamp(base, last, self.right_pad)))
    }

    /// The buffer changed length or its tail moved.
    pub fn on_bars_changed(&mut self, bar_count: usize) -> Option<ViewportRange> {
        let last = bar_count.checked_sub(1)?;
        let current = self.range?;
        let clamped = clamp(current, last, self.right_pad);
        (clamped != current).then(|| self.publish(clamped))
    }

    pub fn set_right_pad(
        &mut self,
        right_pad: u32,
        bar_count: usize,
    ) -> Result<Option<ViewportRange>, Report<ChartError>> {
        check_pad(right_pad)?;
        self.right_pad = right_pad;
        Ok(self.on_bars_changed(bar_count))
    }

    /// The surface reported a new visible range (user scroll/zoom or our own echo).
    pub fn on_range_changed(
        &mut self,
        range: ViewportRange,
        bar_count: usize,
    ) -> Option<ViewportRange> {
        if self.echo.take() == Some(range) {
            self.range = Some(range);
            return None;
        }
        self.range = Some(range);
        self.on_bars_changed(bar_count)
    }

    fn publish(&mut self, range: ViewportRange) -> ViewportRange {
        self.range = Some(range);
        self.echo = Some(range);
        range
    }
}

fn check_pad(right_pad: u32) -> Result<(), Report<ChartError>> {
    if right_pad > MAX_RIGHT_PAD {
        bail!(ChartError::RightPadOutOfRange {
            pad: right_pad,
            max: MAX_RIGHT_PAD,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(from: f64, to: f64) -> ViewportRange {
        ViewportRange { from, to }
    }

    #[test]
    fn clamp_shifts_left_preserving_width() {
        let clamped = clamp(range(90.0, 130.0), 99, 2);
        assert_eq!(clamped, range(61.0, 101.0));
    }

    #[test]
    fn clamp_in_bounds_is_noop() {
        let r = range(10.0, 101.0);
        assert_eq!(clamp(r, 99, 2), r);
    }

    #[test]
    fn clamp_is_idempotent() {
        for r in [range(0.0, 500.0), range(-3.5, 40.25), range(95.0, 101.0)] {
            let once = clamp(r, 99, 2);
            assert_eq!(clamp(once, 99, 2), once);
        }
    }

    #[test]
    fn initial_load_uses_interval_window() {
        let mut viewport = Viewport::new(2).unwrap();
        let r = viewport.on_data_loaded(800, Interval::Day1).unwrap();
        assert_eq!(r, range(799.0 - 220.0, 801.0));
    }

    #[test]
    fn initial_load_window_floors_at_zero() {
        let mut viewport = Viewport::new(2).unwrap();
        let r = viewport.on_data_loaded(50, Interval::Min1).unwrap();
        assert_eq!(r, range(0.0, 51.0));
    }

    #[test]
    fn reload_preserves_existing_range_and_clamps_it() {
        let mut viewport = Viewport::new(2).unwrap();
        viewport.on_data_loaded(800, Interval::Day1);
        viewport.on_range_changed(range(100.0, 200.0), 800);

        assert_eq!(viewport.on_data_loaded(800, Interval::Day1), Some(range(100.0, 200.0)));
        // Shorter history on the new load pulls the window back.
        assert_eq!(viewport.on_data_loaded(150, Interval::Day1), Some(range(51.0, 151.0)));
    }

    #[test]
    fn empty_load_has_no_range() {
        let mut viewport = Viewport::new(2).unwrap();
        assert!(viewport.on_data_loaded(0, Interval::Day1).is_none());
        assert!(viewport.range().is_none());
    }

    #[test]
    fn user_scroll_past_data_is_pulled_back() {
        let mut viewport = Viewport::new(2).unwrap();
        viewport.on_data_loaded(100, Interval::Hour1);
        let adjusted = viewport.on_range_changed(range(80.0, 140.0), 100);
        assert_eq!(adjusted, Some(range(41.0, 101.0)));
    }

    #[test]
    fn own_adjustment_echo_is_not_reclamped() {
        let mut viewport = Viewport::new(2).unwrap();
        viewport.on_data_loaded(100, Interval::Hour1);
        let adjusted = viewport.on_range_changed(range(80.0, 140.0), 100).unwrap();

        // The surface reports our adjustment back, possibly after the data shrank.
        assert_eq!(viewport.on_range_changed(adjusted, 100), None);
        assert_eq!(viewport.range(), Some(adjusted));
    }

    #[test]
    fn right_pad_change_reclamps() {
        let mut viewport = Viewport::new(10).unwrap();
        viewport.on_data_loaded(100, Interval::Hour1);
        assert_eq!(viewport.range().map(|r| r.to), Some(109.0));

        let adjusted = viewport.set_right_pad(0, 100).unwrap();
        assert_eq!(adjusted.map(|r| r.to), Some(99.0));
    }

    #[test]
    fn right_pad_above_max_rejected() {
        assert!(Viewport::new(51).is_err());
        let mut viewport = Viewport::new(2).unwrap();
        assert!(viewport.set_right_pad(MAX_RIGHT_PAD + 1, 10).is_err());
        assert_eq!(viewport.right_pad(), 2);
    }

    #[test]
    fn appended_bar_inside_window_needs_no_adjustment() {
        let mut viewport = Viewport::new(2).unwrap();
        viewport.on_data_loaded(100, Interval::Hour1);
        assert_eq!(viewport.on_bars_changed(101), None);
    }
}
