//! Resource usage data series
//!
//! A series holds the samples of one metric for one entity during a
//! monitor run, together with the warning bookkeeping that survives
//! between runs.

use super::statistics::{self, WindowType, DEFAULT_WINDOW_WIDTH};
use super::{Numeric, RingBuffer};
use crate::error::{ObserverError, ObserverResult};

/// Returned by the sliding window accessors when the series is empty
const EMPTY_WINDOW_SENTINEL: f64 = -1.0;

/// Sample storage: a fixed-capacity ring or an unbounded vector
#[derive(Debug, Clone)]
pub enum SeriesData<T: Numeric> {
    Bounded(RingBuffer<T>),
    Unbounded(Vec<T>),
}

impl<T: Numeric> SeriesData<T> {
    pub fn push(&mut self, value: T) {
        match self {
            SeriesData::Bounded(ring) => {
                ring.enqueue(value);
            }
            SeriesData::Unbounded(values) => values.push(value),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SeriesData::Bounded(ring) => ring.len(),
            SeriesData::Unbounded(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed capacity, `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        match self {
            SeriesData::Bounded(ring) => Some(ring.capacity()),
            SeriesData::Unbounded(_) => None,
        }
    }

    pub fn clear(&mut self) {
        match self {
            SeriesData::Bounded(ring) => ring.clear(),
            SeriesData::Unbounded(values) => values.clear(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = T> + '_> {
        match self {
            SeriesData::Bounded(ring) => Box::new(ring.iter()),
            SeriesData::Unbounded(values) => Box::new(values.iter().copied()),
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        match self {
            SeriesData::Bounded(ring) => ring.to_vec(),
            SeriesData::Unbounded(values) => values.clone(),
        }
    }
}

/// Samples of one metric (`property`) for one entity (`id`)
#[derive(Debug, Clone)]
pub struct ResourceUsageDataSeries<T: Numeric> {
    property: String,
    id: String,
    units: String,
    data: SeriesData<T>,
    active_error_or_warning: bool,
    active_error_or_warning_code: String,
    lifetime_warning_count: u64,
}

impl<T: Numeric> ResourceUsageDataSeries<T> {
    /// Create a series.
    ///
    /// With `use_ring_buffer` the series keeps at most `capacity` samples
    /// and `capacity` must be positive; otherwise `capacity` is only a
    /// preallocation hint.
    pub fn new(
        property: impl Into<String>,
        id: impl Into<String>,
        capacity: usize,
        use_ring_buffer: bool,
    ) -> ObserverResult<Self> {
        let property = property.into();
        let id = id.into();

        if property.is_empty() {
            return Err(ObserverError::InvalidArgument(
                "series property must not be empty".to_string(),
            ));
        }
        if id.is_empty() {
            return Err(ObserverError::InvalidArgument(
                "series id must not be empty".to_string(),
            ));
        }

        let data = if use_ring_buffer {
            SeriesData::Bounded(RingBuffer::new(capacity)?)
        } else {
            SeriesData::Unbounded(Vec::with_capacity(capacity))
        };

        Ok(Self {
            units: infer_units(&property),
            property,
            id,
            data,
            active_error_or_warning: false,
            active_error_or_warning_code: String::new(),
            lifetime_warning_count: 0,
        })
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn data(&self) -> &SeriesData<T> {
        &self.data
    }

    pub fn add_data(&mut self, value: T) {
        self.data.push(value);
    }

    /// Drop all samples; warning bookkeeping is kept
    pub fn clear_data(&mut self) {
        self.data.clear();
    }

    pub fn max_data_value(&self) -> T {
        self.data
            .iter()
            .reduce(|max, v| if v.total_cmp(&max).is_gt() { v } else { max })
            .unwrap_or_default()
    }

    /// Mean of the samples rounded to one decimal place (ties to even),
    /// 0.0 when empty
    pub fn average_data_value(&self) -> f64 {
        statistics::mean(&self.data.to_vec())
            .map(|avg| (avg * 10.0).round_ties_even() / 10.0)
            .unwrap_or(0.0)
    }

    pub fn standard_deviation(&self) -> T {
        statistics::standard_deviation(&self.data.to_vec())
    }

    pub fn sliding_window_max(&self) -> Vec<T> {
        self.sliding_window(WindowType::Max)
    }

    pub fn sliding_window_min(&self) -> Vec<T> {
        self.sliding_window(WindowType::Min)
    }

    fn sliding_window(&self, window_type: WindowType) -> Vec<T> {
        if self.data.is_empty() {
            return vec![T::from_f64(EMPTY_WINDOW_SENTINEL)];
        }
        statistics::sliding_window(&self.data.to_vec(), DEFAULT_WINDOW_WIDTH, window_type)
            .unwrap_or_default()
    }

    /// True when the series has samples, `threshold` is at least 1 and the
    /// average sample meets or exceeds it
    pub fn is_unhealthy(&self, threshold: T) -> bool {
        let threshold = threshold.to_f64();
        if self.data.is_empty() || threshold < 1.0 {
            return false;
        }
        self.average_data_value() >= threshold
    }

    pub fn active_error_or_warning(&self) -> bool {
        self.active_error_or_warning
    }

    /// Set the active warning flag; each false -> true transition counts
    /// once towards [`lifetime_warning_count`](Self::lifetime_warning_count)
    pub fn set_active_error_or_warning(&mut self, active: bool) {
        if active && !self.active_error_or_warning {
            self.lifetime_warning_count += 1;
        }
        self.active_error_or_warning = active;
    }

    pub fn active_error_or_warning_code(&self) -> &str {
        &self.active_error_or_warning_code
    }

    pub fn set_active_error_or_warning_code(&mut self, code: impl Into<String>) {
        self.active_error_or_warning_code = code.into();
    }

    pub fn lifetime_warning_count(&self) -> u64 {
        self.lifetime_warning_count
    }
}

/// "MB" (case-sensitive) selects megabytes; a percent sign, "cpu" or
/// "percent" (case-insensitive) then selects percent and wins if both match
fn infer_units(property: &str) -> String {
    let mut units = String::new();

    if property.contains("MB") {
        units = "MB".to_string();
    }

    let lower = property.to_lowercase();
    if lower.contains('%') || lower.contains("cpu") || lower.contains("percent") {
        units = "%".to_string();
    }

    units
}
