#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Dataset fetching for the sensor map.
//!
//! A [`Fetcher`] resolves each [`SourceEntry`] to a URL for the configured
//! [`DeploymentMode`], downloads the feature collection through the retry
//! helper, and reprojects every geometry to WGS84 before returning it.

pub mod config;
pub mod reproject;
pub mod retry;
pub mod url;

use std::sync::Arc;
use std::time::Duration;

use ecosensor_schema::FeatureCollection;
use ecosensor_sensor_models::{Pollutant, SourceEntry};
use reqwest::Url;

pub use config::{ConfigError, DeploymentMode, EnvironmentConfig, SourceCrs};
pub use reproject::{Identity, ReprojectError, Reprojector, WebMercator};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while fetching a dataset.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A dataset URL could not be built from the configured base.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// Base URL that was rejected.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Coordinates could not be converted to WGS84.
    #[error(transparent)]
    Reproject(#[from] ReprojectError),
}

/// Downloads manifests and feature collections for one environment.
///
/// Cheap to clone; clones share the HTTP connection pool.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    config: Arc<EnvironmentConfig>,
    reprojector: Arc<dyn Reprojector>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates a fetcher for `config`, reprojecting from its source CRS.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the HTTP client cannot be built, or
    /// [`FetchError::Reproject`] if the source CRS cannot be set up.
    pub fn new(config: EnvironmentConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let reprojector = Arc::from(config.source_crs.reprojector()?);
        Ok(Self {
            client,
            config: Arc::new(config),
            reprojector,
        })
    }

    /// Returns the environment this fetcher targets.
    #[must_use]
    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Returns the URL `entry` is fetched from.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] if the configured base is not a
    /// valid URL.
    pub fn collection_url(
        &self,
        entry: &SourceEntry,
        pollutant: Option<Pollutant>,
    ) -> Result<Url, FetchError> {
        url::collection_url(&self.config, entry, pollutant)
    }

    /// Fetches and reprojects `entry`'s feature collection.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on network failure, a non-success status,
    /// or a body that is not a feature collection. Failures are logged here.
    pub async fn fetch_collection(
        &self,
        entry: &SourceEntry,
        pollutant: Option<Pollutant>,
    ) -> Result<FeatureCollection, FetchError> {
        let result = match self.collection_url(entry, pollutant) {
            Ok(url) => {
                log::debug!("{}: fetching {url}", entry.entity_key);
                self.download_collection(url).await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(collection) => log::debug!(
                "{}: fetched {} features",
                entry.entity_key,
                collection.len()
            ),
            Err(e) => log::error!("{}: fetch failed: {e}", entry.entity_key),
        }
        result
    }

    async fn download_collection(&self, url: Url) -> Result<FeatureCollection, FetchError> {
        let body = retry::send_json(|| self.client.get(url.clone())).await?;
        self.decode_collection(body)
    }

    /// Parses a downloaded body into a reprojected feature collection.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Json`] if `body` is not a feature collection.
    pub fn decode_collection(
        &self,
        body: serde_json::Value,
    ) -> Result<FeatureCollection, FetchError> {
        let mut collection = FeatureCollection::from_value(body)?;
        reproject::reproject_collection(&mut collection, self.reprojector.as_ref());
        Ok(collection)
    }

    /// Fetches the dataset manifest, with center points in WGS84.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if the manifest cannot be downloaded or is
    /// not an array of source entries.
    pub async fn fetch_manifest(&self) -> Result<Vec<SourceEntry>, FetchError> {
        let url = self.config.manifest_url();
        log::info!("Loading manifest from {url}");
        let body = retry::send_json(|| self.client.get(&url)).await?;
        let entries = self.decode_manifest(body)?;
        log::info!("Manifest lists {} datasets", entries.len());
        Ok(entries)
    }

    /// Parses a manifest body and reprojects each entry's center.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Json`] if `body` is not an array of entries.
    pub fn decode_manifest(&self, body: serde_json::Value) -> Result<Vec<SourceEntry>, FetchError> {
        let mut entries: Vec<SourceEntry> = serde_json::from_value(body)?;
        for entry in &mut entries {
            entry.center = reproject::reproject_point(entry.center, self.reprojector.as_ref())?;
        }
        Ok(entries)
    }
}
