//! Where feature collections come from.

use async_trait::async_trait;
use ecosensor_fetch::{FetchError, Fetcher};
use ecosensor_schema::FeatureCollection;
use ecosensor_sensor_models::{Pollutant, SourceEntry};

/// Anything that can produce a WGS84 feature collection for a dataset.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Fetches the collection for `entry`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if the collection cannot be retrieved.
    async fn fetch_collection(
        &self,
        entry: &SourceEntry,
        pollutant: Option<Pollutant>,
    ) -> Result<FeatureCollection, FetchError>;
}

#[async_trait]
impl CollectionSource for Fetcher {
    async fn fetch_collection(
        &self,
        entry: &SourceEntry,
        pollutant: Option<Pollutant>,
    ) -> Result<FeatureCollection, FetchError> {
        Self::fetch_collection(self, entry, pollutant).await
    }
}
