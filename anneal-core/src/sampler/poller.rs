//! Sampler: reads both instruments once per tick

use crate::traits::{FlowController, Furnace, LinkError};

use super::sample::Sample;
use super::series::SampleSeries;

/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Poll {
    /// Sample as recorded in the series
    pub sample: Sample,
    /// Furnace read failure, if any
    pub furnace_error: Option<LinkError>,
    /// Flow read failure, if any
    pub flow_error: Option<LinkError>,
}

/// Polls instruments and owns the monitoring series
#[derive(Debug, Clone)]
pub struct Sampler<const N: usize> {
    series: SampleSeries<N>,
}

impl<const N: usize> Default for Sampler<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Sampler<N> {
    /// Create a sampler with an empty series
    pub const fn new() -> Self {
        Self {
            series: SampleSeries::new(),
        }
    }

    /// Read both instruments and append the sample
    ///
    /// Each read is attempted once with the link's own timeout. A failed
    /// read is recorded as a missing field and reported in the result so
    /// the sequencer can count it. Timestamps earlier than the newest
    /// stored sample are raised to it, keeping the series ordered.
    pub async fn poll<F, M>(&mut self, now_ms: u64, furnace: &mut F, flow: &mut M) -> Poll
    where
        F: Furnace,
        M: FlowController,
    {
        let furnace_result = furnace.read_status().await;
        let flow_result = flow.read_actual_flow().await;

        let timestamp_ms = match self.series.latest() {
            Some(last) => now_ms.max(last.timestamp_ms),
            None => now_ms,
        };

        let sample = Sample {
            timestamp_ms,
            furnace: furnace_result.ok(),
            actual_flow_sccm: flow_result.ok(),
            valve: flow.valve_state(),
        };

        // Cannot fail: the timestamp was clamped above
        let _ = self.series.push(sample);

        Poll {
            sample,
            furnace_error: furnace_result.err(),
            flow_error: flow_result.err(),
        }
    }

    /// Recorded samples
    pub fn series(&self) -> &SampleSeries<N> {
        &self.series
    }

    /// Drop the series; the sequencer gates this on run state
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.series.len();
        self.series.clear();
        dropped
    }
}
