//! Dataset URL resolution per deployment mode.

use ecosensor_sensor_models::{Pollutant, SourceEntry};
use reqwest::Url;

use crate::FetchError;
use crate::config::{DeploymentMode, EnvironmentConfig};

/// Returns the URL of `entry`'s feature collection under `config`.
///
/// `pollutant` only affects the development query; published files hold
/// every pollutant.
///
/// # Errors
///
/// Returns [`FetchError::InvalidUrl`] if the configured base URL does not
/// parse or cannot carry a path.
pub fn collection_url(
    config: &EnvironmentConfig,
    entry: &SourceEntry,
    pollutant: Option<Pollutant>,
) -> Result<Url, FetchError> {
    match config.mode {
        DeploymentMode::Development => dev_url(&config.dev_api_url, entry, pollutant),
        DeploymentMode::Production => prod_url(&config.cdn_url, entry),
    }
}

/// `{api}/airquality?entityKey=..&typeMonitoringData=..&pollution=..`
///
/// # Errors
///
/// See [`collection_url`].
pub fn dev_url(
    api: &str,
    entry: &SourceEntry,
    pollutant: Option<Pollutant>,
) -> Result<Url, FetchError> {
    let base = format!("{}/airquality", api.trim_end_matches('/'));
    let mut params = vec![
        ("entityKey", entry.entity_key.clone()),
        ("typeMonitoringData", entry.monitoring_kind.code().to_string()),
    ];
    if let Some(pollutant) = pollutant.or(entry.category) {
        params.push(("pollution", pollutant.code().to_string()));
    }
    Url::parse_with_params(&base, &params).map_err(|e| invalid(&base, e))
}

/// `{cdn}/{dataFileRef}` when the entry has one, otherwise
/// `{cdn}/{pathPrefix}/{entityKey}_{kindCode}_latest.json`.
///
/// Every path segment is percent-encoded.
///
/// # Errors
///
/// See [`collection_url`].
pub fn prod_url(cdn: &str, entry: &SourceEntry) -> Result<Url, FetchError> {
    let mut url = Url::parse(cdn).map_err(|e| invalid(cdn, e))?;
    let file_name = entry.latest_file_name();
    let relative = match entry.data_file_ref.as_deref().filter(|f| !f.is_empty()) {
        Some(file) => file.to_string(),
        None => format!("{}/{file_name}", entry.path_prefix),
    };

    url.path_segments_mut()
        .map_err(|()| invalid(cdn, "URL cannot carry a path"))?
        .pop_if_empty()
        .extend(relative.split('/').filter(|s| !s.is_empty()));
    Ok(url)
}

fn invalid(url: &str, reason: impl std::fmt::Display) -> FetchError {
    FetchError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
