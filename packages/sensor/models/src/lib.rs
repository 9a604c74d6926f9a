#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Sensor reading, pollutant, and dataset manifest types.
//!
//! These are the canonical shapes every data feed is normalized into. A
//! [`Reading`] is one timestamped measurement attached to a monitored
//! feature, an [`OsmIdentity`] names that feature, and a [`SourceEntry`]
//! describes one fetchable dataset from the manifest.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Error returned when a numeric code does not map to a known variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidCodeError {
    /// Which enum the code was parsed for.
    pub kind: &'static str,
    /// The code that was provided.
    pub code: u8,
}

impl std::fmt::Display for InvalidCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} code {}", self.kind, self.code)
    }
}

impl std::error::Error for InvalidCodeError {}

/// Pollutant measured by an air quality reading.
///
/// Serialized on the wire as its numeric code. Parses from either its
/// display text (`"PM2.5"`) or its code name (`"PM25"`), case-insensitive.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(try_from = "u8", into = "u8")]
#[strum(ascii_case_insensitive)]
pub enum Pollutant {
    /// Particulate matter up to 10 µm
    #[strum(to_string = "PM10")]
    Pm10 = 1,
    /// Particulate matter up to 2.5 µm
    #[default]
    #[strum(to_string = "PM2.5", serialize = "PM25")]
    Pm25 = 2,
    /// Nitrogen dioxide
    #[strum(to_string = "NO₂", serialize = "NO2")]
    NitrogenDioxide = 3,
    /// Ground-level ozone
    #[strum(to_string = "O₃", serialize = "O3")]
    Ozone = 4,
    /// Sulphur dioxide
    #[strum(to_string = "SO₂", serialize = "SO2")]
    SulphurDioxide = 5,
    /// Carbon monoxide
    #[strum(to_string = "CO")]
    CarbonMonoxide = 6,
}

impl Pollutant {
    /// Returns the numeric wire code of this pollutant.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Creates a pollutant from its numeric wire code.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is not in the range 1-6.
    pub const fn from_code(code: u8) -> Result<Self, InvalidCodeError> {
        match code {
            1 => Ok(Self::Pm10),
            2 => Ok(Self::Pm25),
            3 => Ok(Self::NitrogenDioxide),
            4 => Ok(Self::Ozone),
            5 => Ok(Self::SulphurDioxide),
            6 => Ok(Self::CarbonMonoxide),
            _ => Err(InvalidCodeError {
                kind: "pollutant",
                code,
            }),
        }
    }

    /// Parses a numeric code (`"2"`) or a name (`"PM25"`, `"pm2.5"`).
    #[must_use]
    pub fn from_code_or_name(s: &str) -> Option<Self> {
        let s = s.trim();
        s.parse::<u8>()
            .map_or_else(|_| s.parse().ok(), |code| Self::from_code(code).ok())
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Pm10,
            Self::Pm25,
            Self::NitrogenDioxide,
            Self::Ozone,
            Self::SulphurDioxide,
            Self::CarbonMonoxide,
        ]
    }
}

impl TryFrom<u8> for Pollutant {
    type Error = InvalidCodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl From<Pollutant> for u8 {
    fn from(value: Pollutant) -> Self {
        value.code()
    }
}

/// Category of hazard data a dataset carries.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(try_from = "u8", into = "u8")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MonitoringKind {
    /// Air quality sensors
    #[default]
    AirQuality = 0,
    /// Flood level sensors
    Flood = 1,
    /// Landslide movement sensors
    LandSlide = 2,
}

impl MonitoringKind {
    /// Returns the numeric code used in file names and query strings.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Creates a monitoring kind from its numeric code.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is not in the range 0-2.
    pub const fn from_code(code: u8) -> Result<Self, InvalidCodeError> {
        match code {
            0 => Ok(Self::AirQuality),
            1 => Ok(Self::Flood),
            2 => Ok(Self::LandSlide),
            _ => Err(InvalidCodeError {
                kind: "monitoring kind",
                code,
            }),
        }
    }
}

impl TryFrom<u8> for MonitoringKind {
    type Error = InvalidCodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl From<MonitoringKind> for u8 {
    fn from(value: MonitoringKind) -> Self {
        value.code()
    }
}

/// One sensor measurement attached to a monitored feature.
///
/// Field names on the wire follow the data feed (`date`, `europeanAqi`,
/// `pollution`, ...). The timestamp is kept as received; see
/// [`Reading::timestamp_utc`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Latitude of the measurement location.
    #[serde(default)]
    pub lat: f64,
    /// Longitude of the measurement location.
    #[serde(default)]
    pub lng: f64,
    /// Measured value. `None` when the feed omits it.
    #[serde(default)]
    pub value: Option<f64>,
    /// Unit of [`Self::value`].
    #[serde(default)]
    pub unit: String,
    /// ISO 8601 time the reading is valid for. `None` when the feed sends
    /// `null` or omits it.
    #[serde(rename = "date", default)]
    pub timestamp: Option<String>,
    /// Elevation of the measurement location.
    #[serde(default)]
    pub elevation: f64,
    /// European Air Quality Index; higher is worse.
    #[serde(rename = "europeanAqi")]
    pub european_aqi_index: f64,
    /// Pollutant this reading measures. Codes outside the known range
    /// decode as `None`.
    #[serde(rename = "pollution", default, deserialize_with = "lenient_pollutant")]
    pub category: Option<Pollutant>,
    /// Display text for the pollution level.
    #[serde(rename = "pollutionText", default)]
    pub category_text: String,
    /// Identifier of the upstream data source.
    #[serde(rename = "source", default)]
    pub source_id: Option<i64>,
    /// Display text for the upstream data source.
    #[serde(default)]
    pub source_text: String,
    /// GIS identifier of the measured feature.
    #[serde(default)]
    pub gis_id: Option<i64>,
    /// Server-supplied display color (e.g. `"#E8333C"`).
    #[serde(default)]
    pub color: Option<String>,
    /// Kind of hazard data.
    #[serde(rename = "typeMonitoringData", default)]
    pub monitoring_kind: Option<MonitoringKind>,
    /// Unique identifier of this reading.
    #[serde(default)]
    pub id: i64,
    /// When the reading was recorded upstream.
    #[serde(rename = "timeStamp", default)]
    pub recorded_at: Option<String>,
}

impl Reading {
    /// Returns `(lat, lng)` of the measurement location.
    #[must_use]
    pub const fn location(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }

    /// Returns the server-supplied color when present and non-empty.
    #[must_use]
    pub fn supplied_color(&self) -> Option<&str> {
        self.color.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Parses [`Self::timestamp`] as an instant.
    ///
    /// Accepts RFC 3339 with any offset. A timestamp without an offset is
    /// read as UTC. Returns `None` for anything else.
    #[must_use]
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }
}

fn lenient_pollutant<'de, D>(deserializer: D) -> Result<Option<Pollutant>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let code = Option::<i64>::deserialize(deserializer)?;
    Ok(code
        .and_then(|code| u8::try_from(code).ok())
        .and_then(|code| Pollutant::from_code(code).ok()))
}

/// Parses an ISO 8601 timestamp, treating offset-less values as UTC.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// OSM-derived identity of a monitored feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsmIdentity {
    /// OSM element type (e.g. `"way"`).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// OSM tags carried by the element.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Display name of the feature.
    #[serde(default)]
    pub name: String,
    /// OSM element id. Used to name the feature's layer.
    pub id: i64,
    /// Monitored asset this feature belongs to.
    #[serde(default)]
    pub entity_key: String,
    /// When the identity block was produced.
    #[serde(rename = "timeStamp", default)]
    pub observed_at: Option<String>,
}

/// One fetchable dataset listed in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEntry {
    /// Pollutant the dataset is published for, if it is single-category.
    #[serde(default)]
    pub category: Option<Pollutant>,
    /// Storage bucket holding the dataset.
    #[serde(default)]
    pub bucket_name: Option<String>,
    /// Path prefix of the dataset's files on the content host.
    #[serde(default)]
    pub path_prefix: String,
    /// Pre-resolved file path on the content host, overriding the
    /// `{entityKey}_{kind}_latest.json` convention.
    #[serde(default)]
    pub data_file_ref: Option<String>,
    /// Monitored asset key (e.g. `"siena"`).
    pub entity_key: String,
    /// When the dataset was last refreshed.
    #[serde(default)]
    pub last_updated: Option<String>,
    /// Hazard data kind.
    #[serde(default)]
    pub monitoring_kind: MonitoringKind,
    /// Map center for this dataset as `[lng, lat]`.
    #[serde(alias = "centerPoint")]
    pub center: [f64; 2],
    /// Declared bounding extent as `[minLng, minLat, maxLng, maxLat]`.
    #[serde(default)]
    pub extent: Option<[f64; 4]>,
    /// Human-readable dataset name.
    #[serde(default)]
    pub name: Option<String>,
}

impl SourceEntry {
    /// Returns the `{entityKey}_{monitoringKindCode}_latest.json` file name.
    #[must_use]
    pub fn latest_file_name(&self) -> String {
        format!("{}_{}_latest.json", self.entity_key, self.monitoring_kind.code())
    }

    /// Returns the rendering source name for this entry under `prefix`.
    ///
    /// Unique per entity and monitoring kind, so each dataset owns its own
    /// set of layers on the map.
    #[must_use]
    pub fn source_name(&self, prefix: &str) -> String {
        format!(
            "{prefix}_{}_{}",
            self.entity_key,
            self.monitoring_kind.code()
        )
    }
}

/// One band of the European Air Quality Index legend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EuropeanAqiLevel {
    /// Band number, 1 (good) to 6 (extremely poor).
    pub id: u8,
    /// Display color.
    pub color: &'static str,
    /// Display name.
    pub name: &'static str,
}

/// The six European AQI bands in ascending severity.
pub const EUROPEAN_AQI_LEVELS: [EuropeanAqiLevel; 6] = [
    EuropeanAqiLevel {
        id: 1,
        color: "#47EEE0",
        name: "Good",
    },
    EuropeanAqiLevel {
        id: 2,
        color: "#44C39A",
        name: "Fair",
    },
    EuropeanAqiLevel {
        id: 3,
        color: "#ECE433",
        name: "Moderate",
    },
    EuropeanAqiLevel {
        id: 4,
        color: "#E8333C",
        name: "Poor",
    },
    EuropeanAqiLevel {
        id: 5,
        color: "#820026",
        name: "Very Poor",
    },
    EuropeanAqiLevel {
        id: 6,
        color: "#680D6D",
        name: "Extremely Poor",
    },
];

impl EuropeanAqiLevel {
    /// Looks up the band for an index value, rounding to the nearest band
    /// and clamping into 1-6.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn for_index(index: f64) -> Option<&'static Self> {
        if !index.is_finite() {
            return None;
        }
        let band = index.round().clamp(1.0, 6.0) as usize;
        EUROPEAN_AQI_LEVELS.get(band - 1)
    }
}
