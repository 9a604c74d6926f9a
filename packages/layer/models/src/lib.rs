#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Layer descriptor and `MapLibre` style specification types.
//!
//! A [`LayerDescriptor`] is the pipeline's ephemeral per-feature output. It
//! is rebuilt on every pass and never mutated. [`LayerSpec`] and
//! [`GeoJsonSourceSpec`] are the serialized shapes handed to a rendering
//! surface, matching the `MapLibre` style specification.

use ecosensor_sensor_models::Reading;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Opacity used for every sensor overlay.
pub const OVERLAY_OPACITY: f64 = 0.3;

/// Line width used for line overlays.
pub const OVERLAY_LINE_WIDTH: f64 = 1.0;

/// How a layer is drawn.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RenderKind {
    /// Filled polygon
    Fill,
    /// Stroked line
    Line,
}

/// Geometry kinds that can be styled.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum GeometryKind {
    /// Single polygon
    Polygon,
    /// Multiple polygons
    MultiPolygon,
    /// Single line string
    LineString,
    /// Multiple line strings
    MultiLineString,
}

impl GeometryKind {
    /// Classifies a `GeoJSON` geometry. Returns `None` for points and
    /// geometry collections, which have no overlay paint.
    #[must_use]
    pub const fn from_geojson(value: &geojson::Value) -> Option<Self> {
        match value {
            geojson::Value::Polygon(_) => Some(Self::Polygon),
            geojson::Value::MultiPolygon(_) => Some(Self::MultiPolygon),
            geojson::Value::LineString(_) => Some(Self::LineString),
            geojson::Value::MultiLineString(_) => Some(Self::MultiLineString),
            geojson::Value::Point(_)
            | geojson::Value::MultiPoint(_)
            | geojson::Value::GeometryCollection(_) => None,
        }
    }

    /// Returns how this geometry is drawn.
    #[must_use]
    pub const fn render_kind(self) -> RenderKind {
        match self {
            Self::Polygon | Self::MultiPolygon => RenderKind::Fill,
            Self::LineString | Self::MultiLineString => RenderKind::Line,
        }
    }
}

/// Line join style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    /// Rounded joins
    #[default]
    Round,
    /// Beveled joins
    Bevel,
    /// Sharp joins
    Miter,
}

/// Line cap style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    /// Rounded caps
    #[default]
    Round,
    /// Flat caps at the endpoint
    Butt,
    /// Square caps past the endpoint
    Square,
}

/// Resolved style attributes for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PaintSpec {
    /// Polygon fill.
    #[serde(rename_all = "camelCase")]
    Fill {
        /// Fill color.
        fill_color: String,
        /// Fill opacity in `0..=1`.
        fill_opacity: f64,
    },
    /// Line stroke.
    #[serde(rename_all = "camelCase")]
    Line {
        /// Stroke color.
        line_color: String,
        /// Stroke width in pixels.
        line_width: f64,
        /// Stroke opacity in `0..=1`.
        line_opacity: f64,
        /// Join style.
        line_join: LineJoin,
        /// Cap style.
        line_cap: LineCap,
    },
}

impl PaintSpec {
    /// Returns the fill or stroke color.
    #[must_use]
    pub fn color(&self) -> &str {
        match self {
            Self::Fill { fill_color, .. } => fill_color,
            Self::Line { line_color, .. } => line_color,
        }
    }

    /// Returns the fill or stroke opacity.
    #[must_use]
    pub const fn opacity(&self) -> f64 {
        match self {
            Self::Fill { fill_opacity, .. } => *fill_opacity,
            Self::Line { line_opacity, .. } => *line_opacity,
        }
    }

    /// Returns the render kind this paint applies to.
    #[must_use]
    pub const fn render_kind(&self) -> RenderKind {
        match self {
            Self::Fill { .. } => RenderKind::Fill,
            Self::Line { .. } => RenderKind::Line,
        }
    }
}

/// One feature's layer, derived fresh on every pipeline pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDescriptor {
    /// `{sourceName}_{featureId}`, unique within a source.
    pub layer_name: String,
    /// OSM id of the feature, matched against the source feature `id`.
    pub feature_id: i64,
    /// How the layer is drawn.
    pub render_kind: RenderKind,
    /// Resolved style.
    pub paint: PaintSpec,
    /// Geometry kind of the feature.
    pub geometry_kind: GeometryKind,
    /// Reading the style was resolved from.
    pub selected_reading: Option<Reading>,
}

impl LayerDescriptor {
    /// Returns the European AQI of the selected reading.
    #[must_use]
    pub fn european_aqi_index(&self) -> Option<f64> {
        self.selected_reading.as_ref().map(|r| r.european_aqi_index)
    }
}

/// Builds the deterministic layer name for a feature.
#[must_use]
pub fn layer_name(source_name: &str, feature_id: i64) -> String {
    format!("{source_name}_{feature_id}")
}

/// `MapLibre` fill paint properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillPaint {
    /// `fill-color`
    #[serde(rename = "fill-color")]
    pub fill_color: String,
    /// `fill-opacity`
    #[serde(rename = "fill-opacity")]
    pub fill_opacity: f64,
}

/// `MapLibre` line paint properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinePaint {
    /// `line-color`
    #[serde(rename = "line-color")]
    pub line_color: String,
    /// `line-width`
    #[serde(rename = "line-width")]
    pub line_width: f64,
    /// `line-opacity`
    #[serde(rename = "line-opacity")]
    pub line_opacity: f64,
}

/// `MapLibre` paint block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Paint {
    /// Fill layer paint.
    Fill(FillPaint),
    /// Line layer paint.
    Line(LinePaint),
}

/// `MapLibre` line layout block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineLayout {
    /// `line-join`
    #[serde(rename = "line-join")]
    pub line_join: LineJoin,
    /// `line-cap`
    #[serde(rename = "line-cap")]
    pub line_cap: LineCap,
}

/// Free-form layer metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMetadata {
    /// Human-readable note on what the layer shows.
    #[serde(rename = "source:comment")]
    pub comment: String,
}

/// A style layer as registered on a rendering surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Layer id.
    pub id: String,
    /// Layer type.
    #[serde(rename = "type")]
    pub kind: RenderKind,
    /// Name of the data source the layer draws from.
    pub source: String,
    /// Layer metadata.
    pub metadata: LayerMetadata,
    /// Paint properties.
    pub paint: Paint,
    /// Layout properties, present for line layers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LineLayout>,
    /// Feature filter expression restricting the layer to one feature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
}

impl LayerSpec {
    /// Builds the style layer for `descriptor` drawing from `source`.
    #[must_use]
    pub fn from_descriptor(descriptor: &LayerDescriptor, source: &str) -> Self {
        let (paint, layout) = match &descriptor.paint {
            PaintSpec::Fill {
                fill_color,
                fill_opacity,
            } => (
                Paint::Fill(FillPaint {
                    fill_color: fill_color.clone(),
                    fill_opacity: *fill_opacity,
                }),
                None,
            ),
            PaintSpec::Line {
                line_color,
                line_width,
                line_opacity,
                line_join,
                line_cap,
            } => (
                Paint::Line(LinePaint {
                    line_color: line_color.clone(),
                    line_width: *line_width,
                    line_opacity: *line_opacity,
                }),
                Some(LineLayout {
                    line_join: *line_join,
                    line_cap: *line_cap,
                }),
            ),
        };

        Self {
            id: descriptor.layer_name.clone(),
            kind: descriptor.render_kind,
            source: source.to_string(),
            metadata: LayerMetadata {
                comment: format!("EcoSensor data for {}", descriptor.layer_name),
            },
            paint,
            layout,
            filter: Some(feature_filter(descriptor.feature_id)),
        }
    }
}

/// `MapLibre` expression matching the source feature whose `id` is
/// `feature_id`.
#[must_use]
pub fn feature_filter(feature_id: i64) -> serde_json::Value {
    serde_json::json!(["==", ["id"], feature_id])
}

/// A `GeoJSON` data source as registered on a rendering surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoJsonSourceSpec {
    /// Always `"geojson"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Ask the renderer to assign feature ids. Off, since features carry
    /// their OSM id and layer filters match on it.
    pub generate_id: bool,
    /// Ask the renderer to compute line distance metrics.
    pub line_metrics: bool,
    /// The feature collection.
    pub data: serde_json::Value,
}

impl GeoJsonSourceSpec {
    /// Wraps a feature collection as a `GeoJSON` source.
    #[must_use]
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            kind: "geojson".to_string(),
            generate_id: false,
            line_metrics: true,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(paint: PaintSpec, geometry_kind: GeometryKind) -> LayerDescriptor {
        LayerDescriptor {
            layer_name: layer_name("src", 7),
            feature_id: 7,
            render_kind: paint.render_kind(),
            paint,
            geometry_kind,
            selected_reading: None,
        }
    }

    #[test]
    fn geometry_kinds_map_to_render_kinds() {
        let poly = geojson::Value::Polygon(vec![vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 0.0]]]);
        let line = geojson::Value::LineString(vec![vec![0.0, 0.0], vec![1.0, 1.0]]);
        let point = geojson::Value::Point(vec![0.0, 0.0]);

        assert_eq!(
            GeometryKind::from_geojson(&poly).map(GeometryKind::render_kind),
            Some(RenderKind::Fill)
        );
        assert_eq!(
            GeometryKind::from_geojson(&line).map(GeometryKind::render_kind),
            Some(RenderKind::Line)
        );
        assert_eq!(GeometryKind::from_geojson(&point), None);
    }

    #[test]
    fn fill_layer_spec_serializes_maplibre_keys() {
        let desc = descriptor(
            PaintSpec::Fill {
                fill_color: "#E8333C".to_string(),
                fill_opacity: OVERLAY_OPACITY,
            },
            GeometryKind::Polygon,
        );
        let value = serde_json::to_value(LayerSpec::from_descriptor(&desc, "src")).unwrap();

        assert_eq!(value["id"], "src_7");
        assert_eq!(value["type"], "fill");
        assert_eq!(value["source"], "src");
        assert_eq!(value["paint"]["fill-color"], "#E8333C");
        assert_eq!(value["paint"]["fill-opacity"], 0.3);
        assert_eq!(value["metadata"]["source:comment"], "EcoSensor data for src_7");
        assert_eq!(value["filter"], serde_json::json!(["==", ["id"], 7]));
        assert!(value.get("layout").is_none());
    }

    #[test]
    fn line_layer_spec_carries_join_and_cap_layout() {
        let desc = descriptor(
            PaintSpec::Line {
                line_color: "#44C39A".to_string(),
                line_width: OVERLAY_LINE_WIDTH,
                line_opacity: OVERLAY_OPACITY,
                line_join: LineJoin::Round,
                line_cap: LineCap::Round,
            },
            GeometryKind::LineString,
        );
        let value = serde_json::to_value(LayerSpec::from_descriptor(&desc, "src")).unwrap();

        assert_eq!(value["type"], "line");
        assert_eq!(value["paint"]["line-width"], 1.0);
        assert_eq!(value["layout"]["line-join"], "round");
        assert_eq!(value["layout"]["line-cap"], "round");
        assert!(value["paint"].get("line-join").is_none());
    }

    #[test]
    fn source_spec_keeps_feed_ids_and_requests_metrics() {
        let value = serde_json::to_value(GeoJsonSourceSpec::new(serde_json::json!({}))).unwrap();
        assert_eq!(value["type"], "geojson");
        assert_eq!(value["generateId"], false);
        assert_eq!(value["lineMetrics"], true);
    }
}
