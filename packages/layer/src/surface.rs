//! The rendering surface capability and an in-memory style document.
//!
//! [`RenderSurface`] is everything the pipeline needs from a map renderer:
//! add and remove sources and layers by name, and check whether a name is
//! registered. [`StyleDocument`] implements it by keeping an ordered
//! `MapLibre` style in memory, which the server and CLI serialize for a
//! frontend.

use std::collections::BTreeMap;

use ecosensor_layer_models::{GeoJsonSourceSpec, LayerSpec};
use serde_json::json;

/// Errors a rendering surface can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    /// A layer with this id is already registered.
    #[error("layer {0} already exists")]
    DuplicateLayer(String),

    /// A source with this name is already registered.
    #[error("source {0} already exists")]
    DuplicateSource(String),

    /// No layer with this id is registered.
    #[error("layer {0} does not exist")]
    UnknownLayer(String),

    /// No source with this name is registered.
    #[error("source {0} does not exist")]
    UnknownSource(String),

    /// The source cannot be removed while layers still draw from it.
    #[error("source {source_name} is still used by layer {layer}")]
    SourceInUse {
        /// Source being removed.
        source_name: String,
        /// A layer that still references it.
        layer: String,
    },
}

/// Named add/remove operations on a map renderer.
pub trait RenderSurface {
    /// Registers a `GeoJSON` data source.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::DuplicateSource`] if `name` is taken.
    fn add_source(&mut self, name: &str, source: GeoJsonSourceSpec) -> Result<(), SurfaceError>;

    /// Removes a data source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is unknown or still in use.
    fn remove_source(&mut self, name: &str) -> Result<(), SurfaceError>;

    /// Appends a layer on top of the existing ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is taken or its source is unknown.
    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), SurfaceError>;

    /// Removes a layer.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::UnknownLayer`] if `name` is not registered.
    fn remove_layer(&mut self, name: &str) -> Result<(), SurfaceError>;

    /// Returns `true` if a layer named `name` is registered.
    fn has_layer(&self, name: &str) -> bool;

    /// Returns `true` if a source named `name` is registered.
    fn has_source(&self, name: &str) -> bool;
}

/// Raster tiles drawn beneath every overlay.
const BASE_TILES: &str = "https://a.tile.openstreetmap.org/{z}/{x}/{y}.png";
const BASE_ATTRIBUTION: &str = "&copy; OpenStreetMap Contributors";

/// An in-memory `MapLibre` style: named sources plus layers in draw order.
#[derive(Debug, Clone, Default)]
pub struct StyleDocument {
    sources: BTreeMap<String, GeoJsonSourceSpec>,
    layers: Vec<LayerSpec>,
}

impl StyleDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the layers in draw order.
    #[must_use]
    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    /// Returns the layer ids in draw order.
    #[must_use]
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.id.as_str()).collect()
    }

    /// Returns the registered source names.
    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Returns the source registered as `name`.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&GeoJsonSourceSpec> {
        self.sources.get(name)
    }

    /// Serializes the document as a complete `MapLibre` style with an
    /// OpenStreetMap raster base layer.
    ///
    /// # Errors
    ///
    /// Returns an error if a source or layer fails to serialize.
    pub fn to_style(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut sources = serde_json::Map::new();
        sources.insert(
            "osm".to_string(),
            json!({
                "type": "raster",
                "tiles": [BASE_TILES],
                "tileSize": 256,
                "attribution": BASE_ATTRIBUTION,
                "maxzoom": 19
            }),
        );
        for (name, source) in &self.sources {
            sources.insert(name.clone(), serde_json::to_value(source)?);
        }

        let mut layers = vec![json!({ "id": "osm", "type": "raster", "source": "osm" })];
        for layer in &self.layers {
            layers.push(serde_json::to_value(layer)?);
        }

        Ok(json!({
            "version": 8,
            "sources": sources,
            "layers": layers
        }))
    }
}

impl RenderSurface for StyleDocument {
    fn add_source(&mut self, name: &str, source: GeoJsonSourceSpec) -> Result<(), SurfaceError> {
        if self.sources.contains_key(name) {
            return Err(SurfaceError::DuplicateSource(name.to_string()));
        }
        self.sources.insert(name.to_string(), source);
        Ok(())
    }

    fn remove_source(&mut self, name: &str) -> Result<(), SurfaceError> {
        if let Some(layer) = self.layers.iter().find(|l| l.source == name) {
            return Err(SurfaceError::SourceInUse {
                source_name: name.to_string(),
                layer: layer.id.clone(),
            });
        }
        self.sources
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SurfaceError::UnknownSource(name.to_string()))
    }

    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), SurfaceError> {
        if self.has_layer(&layer.id) {
            return Err(SurfaceError::DuplicateLayer(layer.id));
        }
        if !self.sources.contains_key(&layer.source) {
            return Err(SurfaceError::UnknownSource(layer.source));
        }
        self.layers.push(layer);
        Ok(())
    }

    fn remove_layer(&mut self, name: &str) -> Result<(), SurfaceError> {
        let index = self
            .layers
            .iter()
            .position(|l| l.id == name)
            .ok_or_else(|| SurfaceError::UnknownLayer(name.to_string()))?;
        self.layers.remove(index);
        Ok(())
    }

    fn has_layer(&self, name: &str) -> bool {
        self.layers.iter().any(|l| l.id == name)
    }

    fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use ecosensor_layer_models::{
        GeometryKind, LayerDescriptor, OVERLAY_OPACITY, PaintSpec, RenderKind,
    };

    use super::*;

    fn layer(id: &str, source: &str) -> LayerSpec {
        LayerSpec::from_descriptor(
            &LayerDescriptor {
                layer_name: id.to_string(),
                feature_id: 0,
                render_kind: RenderKind::Fill,
                paint: PaintSpec::Fill {
                    fill_color: "#47EEE0".to_string(),
                    fill_opacity: OVERLAY_OPACITY,
                },
                geometry_kind: GeometryKind::Polygon,
                selected_reading: None,
            },
            source,
        )
    }

    fn empty_source() -> GeoJsonSourceSpec {
        GeoJsonSourceSpec::new(json!({ "type": "FeatureCollection", "features": [] }))
    }

    #[test]
    fn layers_require_a_registered_source() {
        let mut doc = StyleDocument::new();
        assert_eq!(
            doc.add_layer(layer("a", "src")),
            Err(SurfaceError::UnknownSource("src".to_string()))
        );

        doc.add_source("src", empty_source()).unwrap();
        doc.add_layer(layer("a", "src")).unwrap();
        assert!(doc.has_layer("a"));
        assert_eq!(
            doc.add_layer(layer("a", "src")),
            Err(SurfaceError::DuplicateLayer("a".to_string()))
        );
    }

    #[test]
    fn source_in_use_cannot_be_removed() {
        let mut doc = StyleDocument::new();
        doc.add_source("src", empty_source()).unwrap();
        doc.add_layer(layer("a", "src")).unwrap();

        assert!(matches!(
            doc.remove_source("src"),
            Err(SurfaceError::SourceInUse { .. })
        ));
        doc.remove_layer("a").unwrap();
        doc.remove_source("src").unwrap();
        assert!(!doc.has_source("src"));
        assert_eq!(
            doc.remove_layer("a"),
            Err(SurfaceError::UnknownLayer("a".to_string()))
        );
    }

    #[test]
    fn style_puts_base_map_below_overlays() {
        let mut doc = StyleDocument::new();
        doc.add_source("src", empty_source()).unwrap();
        doc.add_layer(layer("src_1", "src")).unwrap();
        doc.add_layer(layer("src_2", "src")).unwrap();

        let style = doc.to_style().unwrap();
        assert_eq!(style["version"], 8);
        assert_eq!(style["layers"][0]["id"], "osm");
        assert_eq!(style["layers"][1]["id"], "src_1");
        assert_eq!(style["layers"][2]["id"], "src_2");
        assert_eq!(style["sources"]["src"]["type"], "geojson");
        assert_eq!(style["sources"]["osm"]["type"], "raster");
    }
}
