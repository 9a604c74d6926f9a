//! The view state a pipeline pass reads.

use chrono::{DateTime, Utc};
use ecosensor_layer::{BoundingBox, CategoryFilter};

/// Read-only access to the current filter, viewport and clock.
///
/// Passes read the context once when they begin, so a change made while a
/// fetch is in flight only affects the next pass.
pub trait ViewContext: Send + Sync {
    /// The category readings are selected for.
    fn active_filter(&self) -> CategoryFilter;

    /// The visible map area, if known.
    fn viewport(&self) -> Option<BoundingBox>;

    /// The instant the selection window starts at.
    fn now(&self) -> DateTime<Utc>;
}

/// A [`ViewContext`] built from plain values.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticContext {
    /// Active category filter.
    pub filter: CategoryFilter,
    /// Visible area.
    pub viewport: Option<BoundingBox>,
    /// Fixed clock; `None` reads the system clock.
    pub now: Option<DateTime<Utc>>,
}

impl StaticContext {
    /// Creates a context for `filter` over the whole map, on the system clock.
    #[must_use]
    pub fn new(filter: CategoryFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Restricts the context to `viewport`.
    #[must_use]
    pub const fn with_viewport(mut self, viewport: Option<BoundingBox>) -> Self {
        self.viewport = viewport;
        self
    }

    /// Pins the clock to `now`.
    #[must_use]
    pub const fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

impl ViewContext for StaticContext {
    fn active_filter(&self) -> CategoryFilter {
        self.filter
    }

    fn viewport(&self) -> Option<BoundingBox> {
        self.viewport
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}
