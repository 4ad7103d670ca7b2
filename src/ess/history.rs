//! Bounded voltage history for plotting.
//!
//! Each channel keeps its own series. A channel only grows when its own sample
//! was present in a frame, so series lengths can differ; the Load channel's
//! timestamps serve as the clock reference for display.

use crate::constants::HISTORY_CAPACITY;
use crate::ess::voltage::Channel;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;

/// One history point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    pub volts: f64,
}

/// Append-only series that drops its oldest entry beyond capacity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySeries {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl HistorySeries {
    pub fn new(capacity: usize) -> Self {
        HistorySeries {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        if self.capacity == 0 {
            return;
        }
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.volts).collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// A display row: the Load timestamp and each channel's value at that position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedRow {
    pub timestamp: DateTime<Local>,
    pub volts: [Option<f64>; 4],
}

/// History of all four channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoltageHistory {
    series: [HistorySeries; 4],
}

impl VoltageHistory {
    pub fn new(capacity: usize) -> Self {
        VoltageHistory {
            series: std::array::from_fn(|_| HistorySeries::new(capacity)),
        }
    }

    pub fn series(&self, channel: Channel) -> &HistorySeries {
        &self.series[channel.index()]
    }

    pub fn push(&mut self, channel: Channel, sample: Sample) {
        self.series[channel.index()].push(sample);
    }

    /// Timestamps of the clock-reference (Load) series.
    pub fn times(&self) -> Vec<DateTime<Local>> {
        self.series(Channel::Load).iter().map(|s| s.timestamp).collect()
    }

    /// Rows keyed on Load timestamps, other channels right-aligned to their newest sample.
    ///
    /// Alignment is for plotting only; a shorter series leaves `None` in its oldest rows.
    pub fn aligned(&self) -> Vec<AlignedRow> {
        let load = self.series(Channel::Load);
        let rows = load.len();
        load.iter()
            .enumerate()
            .map(|(row, reference)| {
                let volts = std::array::from_fn(|i| {
                    let series = &self.series[i];
                    let offset = rows - row;
                    series
                        .len()
                        .checked_sub(offset)
                        .and_then(|idx| series.samples.get(idx))
                        .map(|s| s.volts)
                });
                AlignedRow {
                    timestamp: reference.timestamp,
                    volts,
                }
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.series.iter_mut().for_each(HistorySeries::clear);
    }
}

impl Default for VoltageHistory {
    fn default() -> Self {
        VoltageHistory::new(HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(volts: f64) -> Sample {
        Sample {
            timestamp: Local::now(),
            volts,
        }
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut series = HistorySeries::new(100);
        for i in 1..=105 {
            series.push(sample(i as f64));
        }
        assert_eq!(series.len(), 100);
        let expected: Vec<f64> = (6..=105).map(|i| i as f64).collect();
        assert_eq!(series.values(), expected);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut series = HistorySeries::new(0);
        series.push(sample(1.0));
        assert!(series.is_empty());
    }

    #[test]
    fn test_channels_grow_independently() {
        let mut history = VoltageHistory::new(10);
        history.push(Channel::Load, sample(12.0));
        history.push(Channel::Load, sample(12.1));
        history.push(Channel::BankA, sample(3.3));

        assert_eq!(history.series(Channel::Load).len(), 2);
        assert_eq!(history.series(Channel::BankA).len(), 1);
        assert!(history.series(Channel::Charge).is_empty());
        assert_eq!(history.times().len(), 2);
    }

    #[test]
    fn test_aligned_rows_right_align_shorter_series() {
        let mut history = VoltageHistory::new(10);
        history.push(Channel::Load, sample(12.0));
        history.push(Channel::Load, sample(12.1));
        history.push(Channel::BankA, sample(3.3));

        let rows = history.aligned();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].volts, [Some(12.0), None, None, None]);
        assert_eq!(rows[1].volts, [Some(12.1), None, Some(3.3), None]);
    }

    #[test]
    fn test_clear() {
        let mut history = VoltageHistory::default();
        history.push(Channel::BankB, sample(1.0));
        history.clear();
        assert!(history.series(Channel::BankB).is_empty());
        assert_eq!(history.series(Channel::BankB).capacity(), HISTORY_CAPACITY);
    }
}
