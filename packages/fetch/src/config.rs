//! Deployment environment configuration.
//!
//! Read once at process start, either from `ECOSENSOR_*` environment
//! variables or from a TOML document. Every field has a default, so an
//! empty environment yields a working production configuration.

use std::str::FromStr;

use ecosensor_schema::SchemaMode;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::reproject::{Identity, ReprojectError, Reprojector, WebMercator};

/// Default development API root.
pub const DEFAULT_DEV_API_URL: &str = "http://localhost:5000/api";

/// Default content-delivery host for published datasets.
pub const DEFAULT_CDN_URL: &str = "https://d17kn6fj50jzfv.cloudfront.net";

/// Default prefix for rendering source names.
pub const DEFAULT_SOURCE_PREFIX: &str = "ecoSensor";

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML document failed to parse.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// An environment variable holds an unrecognized value.
    #[error("invalid value {value:?} for {var}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Rejected value.
        value: String,
    },
}

/// Where the datasets are fetched from.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DeploymentMode {
    /// Local query API with pair-array properties.
    Development,
    /// Published files on the content host with flat-map properties.
    #[default]
    Production,
}

impl DeploymentMode {
    /// Returns the property layout this mode's feeds use.
    #[must_use]
    pub const fn schema_mode(self) -> SchemaMode {
        match self {
            Self::Development => SchemaMode::PairArray,
            Self::Production => SchemaMode::FlatMap,
        }
    }
}

/// Coordinate reference system of fetched geometries.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SourceCrs {
    /// Already longitude/latitude degrees.
    Wgs84,
    /// Spherical Web Mercator meters (EPSG:3857).
    #[default]
    WebMercator,
}

impl SourceCrs {
    /// Returns the reprojector from this CRS to WGS84.
    ///
    /// # Errors
    ///
    /// Returns [`ReprojectError`] if the projection cannot be set up.
    pub fn reprojector(self) -> Result<Box<dyn Reprojector>, ReprojectError> {
        Ok(match self {
            Self::Wgs84 => Box::new(Identity),
            Self::WebMercator => Box::new(WebMercator::new()?),
        })
    }
}

/// Base URLs and data conventions for one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Selects URL construction and property layout.
    pub mode: DeploymentMode,
    /// Development query API root.
    pub dev_api_url: String,
    /// Content-delivery host for published datasets.
    pub cdn_url: String,
    /// Manifest location; defaults to `{cdn_url}/manifest.json`.
    pub manifest_url: Option<String>,
    /// CRS of fetched geometries.
    pub source_crs: SourceCrs,
    /// Prefix for rendering source names.
    pub source_prefix: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::default(),
            dev_api_url: DEFAULT_DEV_API_URL.to_string(),
            cdn_url: DEFAULT_CDN_URL.to_string(),
            manifest_url: None,
            source_crs: SourceCrs::default(),
            source_prefix: DEFAULT_SOURCE_PREFIX.to_string(),
        }
    }
}

impl EnvironmentConfig {
    /// Reads `ECOSENSOR_MODE`, `ECOSENSOR_DEV_API_URL`, `ECOSENSOR_CDN_URL`,
    /// `ECOSENSOR_MANIFEST_URL`, `ECOSENSOR_SOURCE_CRS` and
    /// `ECOSENSOR_SOURCE_PREFIX`, falling back to defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the mode or CRS is not
    /// recognized.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Parses a TOML document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the document is invalid.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("ECOSENSOR_MODE") {
            config.mode = parse_var("ECOSENSOR_MODE", value)?;
        }
        if let Some(value) = lookup("ECOSENSOR_SOURCE_CRS") {
            config.source_crs = parse_var("ECOSENSOR_SOURCE_CRS", value)?;
        }
        if let Some(value) = lookup("ECOSENSOR_DEV_API_URL") {
            config.dev_api_url = value;
        }
        if let Some(value) = lookup("ECOSENSOR_CDN_URL") {
            config.cdn_url = value;
        }
        if let Some(value) = lookup("ECOSENSOR_SOURCE_PREFIX") {
            config.source_prefix = value;
        }
        config.manifest_url = lookup("ECOSENSOR_MANIFEST_URL");

        Ok(config)
    }

    /// Returns the property layout for the configured mode.
    #[must_use]
    pub const fn schema_mode(&self) -> SchemaMode {
        self.mode.schema_mode()
    }

    /// Returns the manifest URL.
    #[must_use]
    pub fn manifest_url(&self) -> String {
        self.manifest_url.clone().unwrap_or_else(|| {
            format!("{}/manifest.json", self.cdn_url.trim_end_matches('/'))
        })
    }
}

fn parse_var<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { var, value })
}
