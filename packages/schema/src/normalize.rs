//! Property lookup and validation into canonical records.

use ecosensor_sensor_models::{OsmIdentity, Reading};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{SchemaError, SchemaMode};

/// A property the pipeline reads from every feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// The OSM identity block.
    Identity,
    /// The time series of readings.
    Readings,
}

impl PropertyKey {
    /// Returns the key name used by the feed in `mode`.
    #[must_use]
    pub const fn name(self, mode: SchemaMode) -> &'static str {
        match (self, mode) {
            (Self::Identity, SchemaMode::PairArray) => "OSM",
            (Self::Readings, SchemaMode::PairArray) => "Data",
            (Self::Identity, SchemaMode::FlatMap) => "osm",
            (Self::Readings, SchemaMode::FlatMap) => "data",
        }
    }
}

/// A property validated into its canonical typed shape.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalRecord {
    /// The feature's OSM identity.
    Identity(OsmIdentity),
    /// The feature's readings, in feed order.
    Readings(Vec<Reading>),
}

/// Looks up and validates feature properties for one [`SchemaMode`].
#[derive(Debug, Clone, Copy)]
pub struct SchemaNormalizer {
    mode: SchemaMode,
}

impl SchemaNormalizer {
    /// Creates a normalizer for `mode`.
    #[must_use]
    pub const fn new(mode: SchemaMode) -> Self {
        Self { mode }
    }

    /// Returns the active mode.
    #[must_use]
    pub const fn mode(&self) -> SchemaMode {
        self.mode
    }

    /// Returns the raw value of `key`, in canonical camel case for
    /// [`SchemaMode::FlatMap`].
    ///
    /// # Errors
    ///
    /// * [`SchemaError::InvalidProperties`] if `properties` has the wrong
    ///   layout for the mode
    /// * [`SchemaError::PropertyNotFound`] if the key is absent
    pub fn property(&self, properties: &Value, key: PropertyKey) -> Result<Value, SchemaError> {
        let name = key.name(self.mode);
        match self.mode {
            SchemaMode::PairArray => {
                let Value::Array(pairs) = properties else {
                    return Err(self.invalid("an array of {key, value} pairs", properties));
                };
                pairs
                    .iter()
                    .find(|pair| pair.get("key").and_then(Value::as_str) == Some(name))
                    .and_then(|pair| pair.get("value"))
                    .cloned()
                    .ok_or(SchemaError::PropertyNotFound { key: name })
            }
            SchemaMode::FlatMap => {
                let Value::Object(map) = properties else {
                    return Err(self.invalid("an object", properties));
                };
                map.iter()
                    .find(|(k, _)| to_camel_case(k) == name)
                    .map(|(_, v)| camelize_keys(v))
                    .ok_or(SchemaError::PropertyNotFound { key: name })
            }
        }
    }

    /// Looks up `key` and validates it into a [`CanonicalRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Malformed`] if the value does not decode into
    /// the canonical shape, plus any error from [`Self::property`].
    pub fn normalize(
        &self,
        properties: &Value,
        key: PropertyKey,
    ) -> Result<CanonicalRecord, SchemaError> {
        Ok(match key {
            PropertyKey::Identity => CanonicalRecord::Identity(self.identity(properties)?),
            PropertyKey::Readings => CanonicalRecord::Readings(self.readings(properties)?),
        })
    }

    /// Returns the feature's OSM identity.
    ///
    /// # Errors
    ///
    /// See [`Self::normalize`].
    pub fn identity(&self, properties: &Value) -> Result<OsmIdentity, SchemaError> {
        self.decode(properties, PropertyKey::Identity)
    }

    /// Returns the feature's readings in feed order.
    ///
    /// Each element is decoded on its own. An element that does not decode
    /// is logged and skipped, and the remaining readings are still returned.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Malformed`] if the property is not an array,
    /// plus any error from [`Self::property`].
    pub fn readings(&self, properties: &Value) -> Result<Vec<Reading>, SchemaError> {
        let key = PropertyKey::Readings;
        let items: Vec<Value> = self.decode(properties, key)?;
        Ok(items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value(item) {
                Ok(reading) => Some(reading),
                Err(e) => {
                    log::warn!("{} reading {index}: skipping: {e}", key.name(self.mode));
                    None
                }
            })
            .collect())
    }

    fn decode<T: DeserializeOwned>(
        &self,
        properties: &Value,
        key: PropertyKey,
    ) -> Result<T, SchemaError> {
        let value = self.property(properties, key)?;
        serde_json::from_value(value).map_err(|source| SchemaError::Malformed {
            key: key.name(self.mode),
            source,
        })
    }

    fn invalid(&self, expected: &'static str, found: &Value) -> SchemaError {
        SchemaError::InvalidProperties {
            mode: self.mode,
            expected,
            found: json_type_name(found),
        }
    }
}

/// Rewrites a dash- or underscore-separated key to camel case.
///
/// Keys already in camel case are returned unchanged. Empty segments
/// (leading, trailing, or doubled separators) are dropped.
#[must_use]
pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for segment in key.split(['_', '-']).filter(|s| !s.is_empty()) {
        if out.is_empty() {
            out.push_str(segment);
            continue;
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Recursively rewrites every object key under `value` to camel case.
fn camelize_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (to_camel_case(k), camelize_keys(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(camelize_keys).collect()),
        other => other.clone(),
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
