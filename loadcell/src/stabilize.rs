//! Turning noisy conversions into one stable value.
//!
//! A batch is centred on its median, samples further than a relative threshold
//! from the median are dropped as glitches, and the survivors are averaged.
//! The same filter smooths the recent-weight history shown to clients.

use std::thread;
use std::time::Duration;

use heapless::HistoryBuffer;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{LoadCellError, Result};
use crate::sampler::StrainGauge;

/// Handling of a batch whose median is exactly zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroMedian {
    /// The band is empty, so the batch reduces to the median
    #[default]
    Strict,
    /// Every value is kept
    KeepAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierFilter {
    pub relative_threshold: f64,
    pub zero_median: ZeroMedian,
}

impl OutlierFilter {
    /// Policy for batches of raw conversions
    pub const RAW: OutlierFilter = OutlierFilter {
        relative_threshold: 0.1,
        zero_median: ZeroMedian::Strict,
    };

    /// Policy for the recent-weight history
    pub const HISTORY: OutlierFilter = OutlierFilter {
        relative_threshold: 0.05,
        zero_median: ZeroMedian::KeepAll,
    };

    pub fn new(relative_threshold: f64, zero_median: ZeroMedian) -> Self {
        Self {
            relative_threshold,
            zero_median,
        }
    }

    fn keeps(&self, value: f64, median: f64) -> bool {
        if median == 0.0 && self.zero_median == ZeroMedian::KeepAll {
            return true;
        }
        (value - median).abs() < self.relative_threshold * median.abs()
    }

    /// Mean of the values strictly inside the band around the median, or the
    /// median when nothing survives. `None` for an empty slice.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        let median = median(values)?;

        let (sum, kept) = values
            .iter()
            .filter(|value| self.keeps(**value, median))
            .fold((0.0, 0usize), |(sum, kept), value| (sum + value, kept + 1));

        if kept == 0 {
            trace!(median, "outlier filter rejected every value");
            return Some(median);
        }
        if kept < values.len() {
            trace!(rejected = values.len() - kept, median, "outliers rejected");
        }
        Some(sum / kept as f64)
    }
}

impl Default for OutlierFilter {
    fn default() -> Self {
        OutlierFilter::RAW
    }
}

/// Upper median: the element at `len / 2` after sorting.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(sorted[sorted.len() / 2])
}

/// Largest batch a single acquisition may request. At the default pacing this
/// already holds the scale for well over a minute.
pub const MAX_SAMPLES: usize = 1000;

/// `InvalidSampleCount` unless `1..=MAX_SAMPLES` holds.
pub fn check_sample_count(sample_count: usize) -> Result<()> {
    if sample_count == 0 || sample_count > MAX_SAMPLES {
        return Err(LoadCellError::InvalidSampleCount);
    }
    Ok(())
}

/// Read `sample_count` conversions back to back, `delay` apart, and reduce
/// them through `filter`.
pub fn acquire_stable<G>(
    gauge: &mut G,
    sample_count: usize,
    filter: &OutlierFilter,
    delay: Duration,
) -> Result<f64>
where
    G: StrainGauge + ?Sized,
{
    check_sample_count(sample_count)?;

    let mut samples = Vec::new();
    for index in 0..sample_count {
        if index > 0 && !delay.is_zero() {
            thread::sleep(delay);
        }
        samples.push(f64::from(gauge.read_raw()?));
    }

    let stable = filter
        .apply(&samples)
        .ok_or(LoadCellError::InvalidSampleCount)?;
    debug!(samples = sample_count, stable, "stabilized reading");
    Ok(stable)
}

pub const HISTORY_CAPACITY: usize = 10;

/// Most recent weights, oldest evicted first
pub struct WeightHistory<const N: usize = HISTORY_CAPACITY> {
    weights: HistoryBuffer<f64, N>,
    filter: OutlierFilter,
}

impl<const N: usize> WeightHistory<N> {
    pub fn new(filter: OutlierFilter) -> Self {
        Self {
            weights: HistoryBuffer::new(),
            filter,
        }
    }

    /// Record `weight` and return the filtered value of the window.
    pub fn push(&mut self, weight: f64) -> f64 {
        self.weights.write(weight);
        self.smoothed().unwrap_or(weight)
    }

    pub fn smoothed(&self) -> Option<f64> {
        self.filter.apply(self.weights.as_slice())
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.weights.capacity()
    }

    pub fn oldest_first(&self) -> Vec<f64> {
        self.weights.oldest_ordered().copied().collect()
    }

    pub fn clear(&mut self) {
        self.weights.clear();
    }
}

impl<const N: usize> Default for WeightHistory<N> {
    fn default() -> Self {
        Self::new(OutlierFilter::HISTORY)
    }
}
