//! Feature collection to ordered layer set.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use ecosensor_layer_models::{GeometryKind, LayerDescriptor, layer_name};
use ecosensor_schema::{FeatureCollection, RawFeature, SchemaError, SchemaNormalizer};

use crate::selector::{CategoryFilter, select_current};
use crate::style::{ColorRamp, resolve_style};

/// Why one feature could not be turned into a layer.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// Identity or readings failed schema validation.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The feature has a null geometry.
    #[error("feature has no geometry")]
    MissingGeometry,

    /// The geometry kind has no overlay style.
    #[error("unsupported geometry type {0}")]
    UnsupportedGeometry(&'static str),

    /// Another feature in the same collection already produced this layer.
    #[error("duplicate layer name {0}")]
    DuplicateLayer(String),
}

/// A feature that was skipped, with its position in the collection.
#[derive(Debug)]
pub struct FeatureFailure {
    /// Index of the feature in the collection.
    pub index: usize,
    /// What went wrong.
    pub error: FeatureError,
}

/// Output of one build pass.
#[derive(Debug, Default)]
pub struct LayerSet {
    /// Layers in ascending European AQI order.
    pub layers: Vec<LayerDescriptor>,
    /// Features skipped because of schema or geometry problems.
    pub failures: Vec<FeatureFailure>,
}

/// Turns feature collections into [`LayerSet`]s.
pub struct LayerSetBuilder<'a> {
    normalizer: SchemaNormalizer,
    ramp: &'a dyn ColorRamp,
}

impl<'a> LayerSetBuilder<'a> {
    /// Creates a builder validating properties with `normalizer` and
    /// falling back to `ramp` for colorless readings.
    #[must_use]
    pub const fn new(normalizer: SchemaNormalizer, ramp: &'a dyn ColorRamp) -> Self {
        Self { normalizer, ramp }
    }

    /// Builds the layer set for `collection` under `source_name`.
    ///
    /// A feature yields a layer only if it has a current reading for
    /// `filter` at `now`. Features that fail validation are skipped and
    /// reported in [`LayerSet::failures`]; they never abort the pass.
    #[must_use]
    pub fn build(
        &self,
        collection: &FeatureCollection,
        source_name: &str,
        filter: CategoryFilter,
        now: DateTime<Utc>,
    ) -> LayerSet {
        let mut set = LayerSet::default();
        let mut seen = BTreeSet::new();

        for (index, feature) in collection.features.iter().enumerate() {
            match self.build_feature(feature, source_name, filter, now) {
                Ok(Some(descriptor)) => {
                    if seen.insert(descriptor.layer_name.clone()) {
                        set.layers.push(descriptor);
                    } else {
                        log::warn!(
                            "{source_name}: feature {index}: duplicate layer {}",
                            descriptor.layer_name
                        );
                        set.failures.push(FeatureFailure {
                            index,
                            error: FeatureError::DuplicateLayer(descriptor.layer_name),
                        });
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    log::warn!("{source_name}: skipping feature {index}: {error}");
                    set.failures.push(FeatureFailure { index, error });
                }
            }
        }

        set.layers.retain(|layer| layer.selected_reading.is_some());
        set.layers.sort_by(|a, b| {
            let a = a.european_aqi_index().unwrap_or(f64::NEG_INFINITY);
            let b = b.european_aqi_index().unwrap_or(f64::NEG_INFINITY);
            a.total_cmp(&b)
        });

        log::debug!(
            "{source_name}: {} layers from {} features ({} skipped)",
            set.layers.len(),
            collection.len(),
            set.failures.len()
        );

        set
    }

    /// Returns a copy of `collection` whose features carry their OSM id as
    /// the feature `id`, so per-feature layer filters can match them.
    ///
    /// Features without a readable identity keep their feed id.
    #[must_use]
    pub fn with_feature_ids(&self, collection: &FeatureCollection) -> FeatureCollection {
        let mut stamped = collection.clone();
        for feature in &mut stamped.features {
            if let Ok(identity) = self.normalizer.identity(&feature.properties) {
                feature.id = Some(identity.id.into());
            }
        }
        stamped
    }

    fn build_feature(
        &self,
        feature: &RawFeature,
        source_name: &str,
        filter: CategoryFilter,
        now: DateTime<Utc>,
    ) -> Result<Option<LayerDescriptor>, FeatureError> {
        let identity = self.normalizer.identity(&feature.properties)?;
        let readings = self.normalizer.readings(&feature.properties)?;

        let geometry = feature
            .geometry
            .as_ref()
            .ok_or(FeatureError::MissingGeometry)?;
        let geometry_kind = GeometryKind::from_geojson(&geometry.value)
            .ok_or_else(|| FeatureError::UnsupportedGeometry(type_name(&geometry.value)))?;

        let Some(reading) = select_current(&readings, filter, now) else {
            log::trace!("{source_name}: feature {} has no current reading", identity.id);
            return Ok(None);
        };

        let paint = resolve_style(reading, geometry_kind, self.ramp);

        Ok(Some(LayerDescriptor {
            layer_name: layer_name(source_name, identity.id),
            feature_id: identity.id,
            render_kind: geometry_kind.render_kind(),
            paint,
            geometry_kind,
            selected_reading: Some(reading.clone()),
        }))
    }
}

const fn type_name(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}
