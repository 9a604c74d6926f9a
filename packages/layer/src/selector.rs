//! Current-hour reading selection.
//!
//! A reading is current when its timestamp `t` satisfies
//! `now < t <= now + 1h` and it passes the active [`CategoryFilter`].
//! Among current readings the most severe (highest European AQI) wins.

use chrono::{DateTime, TimeDelta, Utc};
use ecosensor_sensor_models::{Pollutant, Reading};
use serde::{Deserialize, Serialize};

/// Width of the forward-looking selection window.
#[must_use]
pub fn window() -> TimeDelta {
    TimeDelta::hours(1)
}

/// Which readings are eligible for selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CategoryFilter {
    /// Only readings for this pollutant.
    Pollutant(Pollutant),
    /// Single-category feeds: any reading that carries a color or value.
    AnyWithValue,
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self::Pollutant(Pollutant::default())
    }
}

impl CategoryFilter {
    /// Returns `true` if `reading` passes this filter.
    #[must_use]
    pub fn matches(&self, reading: &Reading) -> bool {
        match self {
            Self::Pollutant(p) => reading.category == Some(*p),
            Self::AnyWithValue => reading.supplied_color().is_some() || reading.value.is_some(),
        }
    }

    /// Returns the pollutant this filter selects, if any.
    #[must_use]
    pub const fn pollutant(&self) -> Option<Pollutant> {
        match self {
            Self::Pollutant(p) => Some(*p),
            Self::AnyWithValue => None,
        }
    }
}

/// Picks the reading valid for `now` from a feature's time series.
///
/// Readings are ordered by timestamp before filtering; readings whose
/// timestamp does not parse are never eligible. On equal European AQI the
/// earliest reading wins.
#[must_use]
pub fn select_current(
    readings: &[Reading],
    filter: CategoryFilter,
    now: DateTime<Utc>,
) -> Option<&Reading> {
    let end = now + window();

    let mut timed: Vec<(DateTime<Utc>, &Reading)> = readings
        .iter()
        .filter_map(|r| r.timestamp_utc().map(|t| (t, r)))
        .collect();
    timed.sort_by_key(|(t, _)| *t);

    timed
        .into_iter()
        .filter(|(t, r)| *t > now && *t <= end && filter.matches(r))
        .map(|(_, r)| r)
        .fold(None, |best: Option<&Reading>, r| match best {
            Some(b)
                if r.european_aqi_index
                    .total_cmp(&b.european_aqi_index)
                    .is_le() =>
            {
                Some(b)
            }
            _ => Some(r),
        })
}
