//! Append-only monitoring series
//!
//! Samples are kept in tick order with non-decreasing timestamps. When the
//! buffer is full the oldest sample is evicted; entries are never edited.

use heapless::Deque;

use super::sample::{ExportRow, Sample};

/// Errors appending to the series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SeriesError {
    /// Timestamp earlier than the newest stored sample
    OutOfOrder { last_ms: u64, rejected_ms: u64 },
}

/// Bounded time series of samples
#[derive(Debug, Clone)]
pub struct SampleSeries<const N: usize> {
    samples: Deque<Sample, N>,
    evicted: u32,
}

impl<const N: usize> Default for SampleSeries<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SampleSeries<N> {
    /// Create an empty series
    pub const fn new() -> Self {
        Self {
            samples: Deque::new(),
            evicted: 0,
        }
    }

    /// Append a sample, evicting the oldest one when full
    pub fn push(&mut self, sample: Sample) -> Result<(), SeriesError> {
        if let Some(last) = self.samples.back() {
            if sample.timestamp_ms < last.timestamp_ms {
                return Err(SeriesError::OutOfOrder {
                    last_ms: last.timestamp_ms,
                    rejected_ms: sample.timestamp_ms,
                });
            }
        }
        if self.samples.is_full() {
            self.samples.pop_front();
            self.evicted = self.evicted.saturating_add(1);
        }
        // Room was made above
        let _ = self.samples.push_back(sample);
        Ok(())
    }

    /// Number of stored samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if no samples are stored
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Capacity of the series
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Samples dropped to make room since the last clear
    pub fn evicted(&self) -> u32 {
        self.evicted
    }

    /// Newest sample
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Sample by position, oldest first
    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.iter().nth(index)
    }

    /// Iterate oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Export rows starting at position `from`
    pub fn export_rows(&self, from: usize) -> impl Iterator<Item = ExportRow> + '_ {
        self.samples.iter().skip(from).map(Sample::export_row)
    }

    /// Drop every sample
    pub(crate) fn clear(&mut self) {
        self.samples.clear();
        self.evicted = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ValveState;
    use std::vec::Vec;

    fn sample(timestamp_ms: u64, flow: f32) -> Sample {
        Sample {
            timestamp_ms,
            furnace: None,
            actual_flow_sccm: Some(flow),
            valve: ValveState::Closed,
        }
    }

    #[test]
    fn test_push_in_order() {
        let mut series: SampleSeries<4> = SampleSeries::new();
        series.push(sample(0, 1.0)).unwrap();
        series.push(sample(1000, 2.0)).unwrap();
        series.push(sample(1000, 3.0)).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.latest().unwrap().actual_flow_sccm, Some(3.0));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut series: SampleSeries<4> = SampleSeries::new();
        series.push(sample(2000, 1.0)).unwrap();
        assert_eq!(
            series.push(sample(1000, 2.0)),
            Err(SeriesError::OutOfOrder {
                last_ms: 2000,
                rejected_ms: 1000
            })
        );
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_eviction_keeps_order() {
        let mut series: SampleSeries<3> = SampleSeries::new();
        for t in 0..5u64 {
            series.push(sample(t * 1000, t as f32)).unwrap();
        }
        assert_eq!(series.len(), 3);
        assert_eq!(series.evicted(), 2);
        let stamps: Vec<u64> = series.iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(stamps, [2000, 3000, 4000]);
    }

    #[test]
    fn test_export_rows_from_offset() {
        let mut series: SampleSeries<8> = SampleSeries::new();
        for t in 0..4u64 {
            series.push(sample(t * 1000, t as f32)).unwrap();
        }
        let rows: Vec<ExportRow> = series.export_rows(2).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp_ms, 2000);
        assert_eq!(rows[0].process_temperature_x10, None);
        assert_eq!(rows[1].actual_flow_sccm, Some(3.0));
    }

    #[test]
    fn test_clear() {
        let mut series: SampleSeries<2> = SampleSeries::new();
        for t in 0..3u64 {
            series.push(sample(t, 0.0)).unwrap();
        }
        series.clear();
        assert!(series.is_empty());
        assert_eq!(series.evicted(), 0);
        // Timestamps may restart after a clear
        series.push(sample(0, 0.0)).unwrap();
    }

    proptest::proptest! {
        #[test]
        fn prop_series_stays_monotonic(stamps in proptest::collection::vec(0u64..100_000, 0..64)) {
            let mut series: SampleSeries<16> = SampleSeries::new();
            let mut accepted: Vec<u64> = Vec::new();
            for t in stamps {
                if series.push(sample(t, 0.0)).is_ok() {
                    accepted.push(t);
                }
            }
            let stored: Vec<u64> = series.iter().map(|s| s.timestamp_ms).collect();
            proptest::prop_assert!(stored.windows(2).all(|w| w[0] <= w[1]));
            // Stored entries are exactly the newest accepted ones
            let tail = &accepted[accepted.len().saturating_sub(16)..];
            proptest::prop_assert_eq!(&stored[..], tail);
        }
    }
}
