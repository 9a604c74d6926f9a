#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the EcoSensor map server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the sensor and layer types to allow independent evolution of the
//! API contract.

use ecosensor_sensor_models::{MonitoringKind, Pollutant, SourceEntry};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// A selectable pollutant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPollutant {
    /// Numeric wire code.
    pub code: u8,
    /// Display text (e.g. `"PM2.5"`).
    pub name: String,
    /// Whether this is the pollutant selected when none is given.
    pub default: bool,
}

impl From<Pollutant> for ApiPollutant {
    fn from(pollutant: Pollutant) -> Self {
        Self {
            code: pollutant.code(),
            name: pollutant.to_string(),
            default: pollutant == Pollutant::default(),
        }
    }
}

/// A dataset as listed by `GET /api/sources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSource {
    /// Rendering source name the dataset's layers are registered under.
    pub source_name: String,
    /// Monitored asset key.
    pub entity_key: String,
    /// Human-readable name.
    pub name: Option<String>,
    /// Hazard data kind.
    pub monitoring_kind: MonitoringKind,
    /// Map center as `[lng, lat]`.
    pub center: [f64; 2],
    /// Declared extent as `[minLng, minLat, maxLng, maxLat]`.
    pub extent: Option<[f64; 4]>,
    /// When the dataset was last refreshed.
    pub last_updated: Option<String>,
}

impl ApiSource {
    /// Builds the listing for `entry` under source prefix `prefix`.
    #[must_use]
    pub fn from_entry(entry: &SourceEntry, prefix: &str) -> Self {
        Self {
            source_name: entry.source_name(prefix),
            entity_key: entry.entity_key.clone(),
            name: entry.name.clone(),
            monitoring_kind: entry.monitoring_kind,
            center: entry.center,
            extent: entry.extent,
            last_updated: entry.last_updated.clone(),
        }
    }
}

/// Query parameters for the style endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleQueryParams {
    /// Pollutant code (`2`) or name (`PM25`, `PM2.5`). Defaults to PM2.5.
    pub pollutant: Option<String>,
    /// Viewport as `minLng,minLat,maxLng,maxLat`.
    pub bbox: Option<String>,
}

/// Per-dataset result included in the style response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSourceStatus {
    /// Rendering source name.
    pub source_name: String,
    /// `rendered`, `failed`, `superseded` or `cancelled`.
    pub status: &'static str,
    /// Layers placed, for rendered datasets.
    pub layers: usize,
    /// Failure description, for failed datasets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
