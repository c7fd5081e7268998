//! Resource usage data engine
//!
//! This module provides:
//! - A fixed-capacity ring buffer over numeric samples
//! - Standard deviation and sliding-window extrema
//! - Per (metric, entity) data series with threshold evaluation

mod numeric;
mod ring_buffer;
mod series;
pub mod statistics;

pub use numeric::Numeric;
pub use ring_buffer::{Iter, RingBuffer};
pub use series::{ResourceUsageDataSeries, SeriesData};
pub use statistics::{sliding_window, standard_deviation, WindowType};
