//! Stateless statistics over numeric samples
//!
//! Accumulation happens in `f64` so integer series cannot overflow; results
//! are converted back to the element type.

use super::numeric::Ordered;
use super::Numeric;
use std::collections::BTreeMap;

/// Default sliding window width used by data series
pub const DEFAULT_WINDOW_WIDTH: usize = 3;

/// Which extreme a sliding window reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    Max,
    Min,
}

/// Arithmetic mean, or `None` for an empty sequence
pub fn mean<T: Numeric>(data: &[T]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let sum: f64 = data.iter().map(|v| v.to_f64()).sum();
    Some(sum / data.len() as f64)
}

/// Population standard deviation; the default value for an empty sequence
pub fn standard_deviation<T: Numeric>(data: &[T]) -> T {
    let Some(mean) = mean(data) else {
        return T::default();
    };

    let variance = data
        .iter()
        .map(|v| (v.to_f64() - mean).powi(2))
        .sum::<f64>()
        / data.len() as f64;

    T::from_f64(variance.sqrt())
}

/// Trailing-window extremes over `data`.
///
/// A window of `window_width` elements ending at position `i` is evaluated
/// for every `i` from `window_width - 1` up to `data.len() - 2` inclusive,
/// so the newest sample never closes a window and the result holds
/// `data.len() - window_width` values (none when `data` is too short).
///
/// Returns `None` for an empty sequence or a zero width.
pub fn sliding_window<T: Numeric>(
    data: &[T],
    window_width: usize,
    window_type: WindowType,
) -> Option<Vec<T>> {
    if window_width < 1 || data.is_empty() {
        return None;
    }

    let mut window_data = Vec::with_capacity(data.len().saturating_sub(window_width));
    // Ordered multiset of the values currently inside the window
    let mut window: BTreeMap<Ordered<T>, usize> = BTreeMap::new();

    for i in 0..data.len() - 1 {
        *window.entry(Ordered(data[i])).or_insert(0) += 1;

        if i + 1 < window_width {
            continue;
        }

        let extreme = match window_type {
            WindowType::Max => window.keys().next_back(),
            WindowType::Min => window.keys().next(),
        };
        if let Some(Ordered(value)) = extreme {
            window_data.push(*value);
        }

        let leaving = Ordered(data[i + 1 - window_width]);
        if let Some(count) = window.get_mut(&leaving) {
            *count -= 1;
            if *count == 0 {
                window.remove(&leaving);
            }
        }
    }

    Some(window_data)
}
