//! Periodic instrument polling and the monitoring time series

mod poller;
mod sample;
mod series;

pub use poller::{Poll, Sampler};
pub use sample::{ExportRow, Sample};
pub use series::{SampleSeries, SeriesError};
