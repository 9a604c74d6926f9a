//! Paint resolution for a selected reading.

use ecosensor_layer_models::{
    GeometryKind, LineCap, LineJoin, OVERLAY_LINE_WIDTH, OVERLAY_OPACITY, PaintSpec,
};
use ecosensor_sensor_models::Reading;

/// A numeric-to-color scale used when a reading has no supplied color.
pub trait ColorRamp: Send + Sync {
    /// Returns the color for `value`.
    fn color_for(&self, value: f64) -> String;
}

/// Step scale over `[1, 1000]` in ten equal steps of 100.
#[derive(Debug, Clone)]
pub struct StepRamp {
    stops: [String; STOP_COUNT],
}

/// Number of stops on a [`StepRamp`].
pub const STOP_COUNT: usize = 10;

const STEP: f64 = 100.0;
const DOMAIN_MAX: f64 = 1000.0;

const DEFAULT_STOPS: [&str; STOP_COUNT] = [
    "#50F0E6", "#50CCAA", "#9BD35A", "#F0E641", "#F5B93C", "#FF8C32", "#FF5050", "#E8333C",
    "#960032", "#7D2181",
];

impl StepRamp {
    /// Creates a ramp from ten color stops, lowest first.
    #[must_use]
    pub const fn new(stops: [String; STOP_COUNT]) -> Self {
        Self { stops }
    }

    /// Returns the stop index for `value`.
    ///
    /// Values above the domain clamp to the last stop; `round(value / 100)`
    /// is clamped into the valid stop range at both ends.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn stop_index(value: f64) -> usize {
        if value > DOMAIN_MAX {
            return STOP_COUNT - 1;
        }
        if value.is_nan() {
            return 0;
        }
        (value / STEP).round().clamp(0.0, (STOP_COUNT - 1) as f64) as usize
    }

    /// Returns the color at stop `index`.
    #[must_use]
    pub fn stop(&self, index: usize) -> &str {
        &self.stops[index.min(STOP_COUNT - 1)]
    }
}

impl Default for StepRamp {
    fn default() -> Self {
        Self::new(DEFAULT_STOPS.map(str::to_string))
    }
}

impl ColorRamp for StepRamp {
    fn color_for(&self, value: f64) -> String {
        self.stop(Self::stop_index(value)).to_string()
    }
}

/// Resolves the paint for `reading` drawn as `geometry_kind`.
///
/// A non-empty server-supplied color is used verbatim; otherwise the
/// reading's value goes through `ramp` (missing values count as zero).
#[must_use]
pub fn resolve_style(
    reading: &Reading,
    geometry_kind: GeometryKind,
    ramp: &dyn ColorRamp,
) -> PaintSpec {
    let color = reading.supplied_color().map_or_else(
        || ramp.color_for(reading.value.unwrap_or(0.0)),
        ToString::to_string,
    );

    match geometry_kind {
        GeometryKind::Polygon | GeometryKind::MultiPolygon => PaintSpec::Fill {
            fill_color: color,
            fill_opacity: OVERLAY_OPACITY,
        },
        GeometryKind::LineString | GeometryKind::MultiLineString => PaintSpec::Line {
            line_color: color,
            line_width: OVERLAY_LINE_WIDTH,
            line_opacity: OVERLAY_OPACITY,
            line_join: LineJoin::Round,
            line_cap: LineCap::Round,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(color: Option<&str>, value: Option<f64>) -> Reading {
        serde_json::from_value(serde_json::json!({
            "date": "2024-05-01T10:30:00Z",
            "europeanAqi": 1,
            "color": color,
            "value": value
        }))
        .unwrap()
    }

    #[test]
    fn stop_index_rounds_and_clamps() {
        assert_eq!(StepRamp::stop_index(250.0), 3);
        assert_eq!(StepRamp::stop_index(1500.0), 9);
        assert_eq!(StepRamp::stop_index(1000.0), 9);
        assert_eq!(StepRamp::stop_index(960.0), 9);
        assert_eq!(StepRamp::stop_index(1.0), 0);
        assert_eq!(StepRamp::stop_index(-40.0), 0);
        assert_eq!(StepRamp::stop_index(f64::NAN), 0);
    }

    #[test]
    fn supplied_color_wins() {
        let ramp = StepRamp::default();
        let paint = resolve_style(
            &reading(Some("#E8333C"), Some(900.0)),
            GeometryKind::Polygon,
            &ramp,
        );
        assert_eq!(
            paint,
            PaintSpec::Fill {
                fill_color: "#E8333C".to_string(),
                fill_opacity: 0.3
            }
        );
    }

    #[test]
    fn empty_color_falls_back_to_ramp() {
        let ramp = StepRamp::default();
        let paint = resolve_style(
            &reading(Some(""), Some(250.0)),
            GeometryKind::Polygon,
            &ramp,
        );
        assert_eq!(paint.color(), ramp.stop(3));

        let paint = resolve_style(&reading(None, Some(1500.0)), GeometryKind::Polygon, &ramp);
        assert_eq!(paint.color(), ramp.stop(9));

        let paint = resolve_style(&reading(None, None), GeometryKind::Polygon, &ramp);
        assert_eq!(paint.color(), ramp.stop(0));
    }

    #[test]
    fn line_geometry_gets_line_paint() {
        let ramp = StepRamp::default();
        let paint = resolve_style(
            &reading(Some("#44C39A"), None),
            GeometryKind::LineString,
            &ramp,
        );
        assert_eq!(
            paint,
            PaintSpec::Line {
                line_color: "#44C39A".to_string(),
                line_width: 1.0,
                line_opacity: 0.3,
                line_join: LineJoin::Round,
                line_cap: LineCap::Round,
            }
        );
    }
}
