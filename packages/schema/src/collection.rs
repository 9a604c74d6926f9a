//! GeoJSON-like feature collection as delivered by the data feeds.
//!
//! `properties` is kept as an untyped [`serde_json::Value`] because its
//! layout depends on the feed (see [`crate::SchemaMode`]); geometry is
//! parsed eagerly so reprojection and style resolution can rely on it.

use serde::{Deserialize, Serialize};

fn feature_collection_type() -> String {
    "FeatureCollection".to_string()
}

fn feature_type() -> String {
    "Feature".to_string()
}

/// A collection of monitored features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    /// Always `"FeatureCollection"`.
    #[serde(rename = "type", default = "feature_collection_type")]
    pub kind: String,
    /// Features in feed order.
    #[serde(default)]
    pub features: Vec<RawFeature>,
}

/// One monitored feature with its raw property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFeature {
    /// Always `"Feature"`.
    #[serde(rename = "type", default = "feature_type")]
    pub kind: String,
    /// Feed-assigned feature id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// Feature geometry. `None` for null geometries.
    #[serde(default)]
    pub geometry: Option<geojson::Geometry>,
    /// Raw properties, pair array or flat map depending on the feed.
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl FeatureCollection {
    /// Creates a collection from features.
    #[must_use]
    pub fn new(features: Vec<RawFeature>) -> Self {
        Self {
            kind: feature_collection_type(),
            features,
        }
    }

    /// Decodes a collection from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a feature collection.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Encodes the collection as a JSON value suitable for registering as
    /// a map data source.
    ///
    /// # Errors
    ///
    /// Returns an error if a property value fails to serialize.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Returns the number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` if there are no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl RawFeature {
    /// Creates a feature from a geometry and raw properties.
    #[must_use]
    pub fn new(geometry: geojson::Geometry, properties: serde_json::Value) -> Self {
        Self {
            kind: feature_type(),
            id: None,
            geometry: Some(geometry),
            properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_collection_with_pair_array_properties() {
        let fc = FeatureCollection::from_value(serde_json::json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": { "type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]] },
                "properties": [{ "key": "OSM", "value": { "id": 1 } }]
            }]
        }))
        .unwrap();

        assert_eq!(fc.len(), 1);
        assert!(fc.features[0].properties.is_array());
        assert!(matches!(
            fc.features[0].geometry.as_ref().unwrap().value,
            geojson::Value::LineString(_)
        ));
    }

    #[test]
    fn null_geometry_is_none() {
        let fc = FeatureCollection::from_value(serde_json::json!({
            "features": [{ "geometry": null, "properties": {} }]
        }))
        .unwrap();

        assert_eq!(fc.kind, "FeatureCollection");
        assert!(fc.features[0].geometry.is_none());
    }

    #[test]
    fn encodes_back_to_geojson_shape() {
        let fc = FeatureCollection::new(vec![RawFeature::new(
            geojson::Geometry::new(geojson::Value::Point(vec![1.0, 2.0])),
            serde_json::json!({ "osm": { "id": 3 } }),
        )]);
        let value = fc.to_value().unwrap();

        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"][0]["type"], "Feature");
        assert_eq!(value["features"][0]["geometry"]["type"], "Point");
        assert!(value["features"][0].get("id").is_none());
    }
}
