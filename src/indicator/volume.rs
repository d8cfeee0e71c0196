use crate::indicator::{Indicator, align, volumes};
use crate::model::{Bar, IndicatorSeries, SeriesId};

/// Per-bar traded volume as its own histogram series.
pub struct Volume;

impl Indicator for Volume {
    fn name(&self) -> &str {
        "volume"
    }

    fn warm_up(&self) -> usize {
        1
    }

    fn calculate(&self, bars: &[Bar]) -> Vec<IndicatorSeries> {
        vec![IndicatorSeries {
            id: SeriesId::Volume,
            points: align(bars, 0, volumes(bars)),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::testing::bars_from_closes;

    #[test]
    fn one_point_per_bar() {
        let bars = bars_from_closes(&[1.0, 2.0, 3.0]);
        let series = Volume.calculate(&bars);
        assert_eq!(series[0].points.len(), 3);
        assert_eq!(series[0].points[2].value, 3.0);
    }

    #[test]
    fn latest_tracks_tail_volume() {
        let bars = bars_from_closes(&[1.0, 2.0]);
        let updates = Volume.latest(&bars);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].point.time, bars[1].time);
        assert_eq!(updates[0].point.value, 2.0);
    }
}
