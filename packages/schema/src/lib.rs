#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raw feature collection types and property schema normalization.
//!
//! Data feeds deliver per-feature `properties` in one of two historical
//! shapes: an array of `{key, value}` pairs (development API) or a flat
//! map with dash/underscore-separated keys (published files). The
//! [`SchemaNormalizer`] hides that difference behind one interface
//! selected by [`SchemaMode`], and validates every record into a
//! [`CanonicalRecord`] before anything downstream sees it.

pub mod collection;
pub mod normalize;

pub use collection::{FeatureCollection, RawFeature};
pub use normalize::{CanonicalRecord, PropertyKey, SchemaNormalizer, to_camel_case};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Which property layout the data feed uses.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SchemaMode {
    /// `properties` is an array of `{key, value}` pairs; values are
    /// returned as-is.
    PairArray,
    /// `properties` is a flat map whose keys are rewritten to camel case.
    FlatMap,
}

/// Errors produced while validating feature properties.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The requested property key is absent.
    #[error("property not found: {key}")]
    PropertyNotFound {
        /// Key that was looked up.
        key: &'static str,
    },

    /// The property exists but does not match the canonical shape.
    #[error("malformed property {key}: {source}")]
    Malformed {
        /// Key that was looked up.
        key: &'static str,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The `properties` value itself has the wrong layout for the mode.
    #[error("feature properties must be {expected} in {mode} mode, found {found}")]
    InvalidProperties {
        /// Active schema mode.
        mode: SchemaMode,
        /// Layout expected for the mode.
        expected: &'static str,
        /// JSON type actually found.
        found: &'static str,
    },
}
