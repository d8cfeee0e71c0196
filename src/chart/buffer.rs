use crate::model::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The in-progress bar was replaced.
    UpdatedTail,
    Appended,
    /// Older than the tail; dropped.
    Ignored,
}

/// Bar history in strictly increasing time order. Only the tail is mutable.
#[derive(Debug, Default)]
pub struct BarBuffer {
    bars: Vec<Bar>,
}

impl BarBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, bars: Vec<Bar>) {
        self.bars = bars;
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn merge(&mut self, incoming: Bar) -> MergeOutcome {
        match self.bars.last_mut() {
            Some(last) if incoming.time == last.time => {
                *last = incoming;
                MergeOutcome::UpdatedTail
            }
            Some(last) if incoming.time < last.time => MergeOutcome::Ignored,
            _ => {
                self.bars.push(incoming);
                MergeOutcome::Appended
            }
        }
    }
}
