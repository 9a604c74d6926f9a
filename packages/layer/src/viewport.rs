//! WGS84 viewport bounds and the dataset extent pre-filter.

use std::str::FromStr;

use ecosensor_sensor_models::SourceEntry;
use geo::{Intersects as _, Rect, coord};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    /// Western edge.
    pub min_lng: f64,
    /// Southern edge.
    pub min_lat: f64,
    /// Eastern edge.
    pub max_lng: f64,
    /// Northern edge.
    pub max_lat: f64,
}

impl BoundingBox {
    /// Creates a bounding box, normalizing swapped corners.
    #[must_use]
    pub fn new(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Self {
        Self {
            min_lng: min_lng.min(max_lng),
            min_lat: min_lat.min(max_lat),
            max_lng: min_lng.max(max_lng),
            max_lat: min_lat.max(max_lat),
        }
    }

    /// Creates a bounding box from `[minLng, minLat, maxLng, maxLat]`.
    #[must_use]
    pub fn from_extent(extent: [f64; 4]) -> Self {
        Self::new(extent[0], extent[1], extent[2], extent[3])
    }

    /// Returns the box as a [`geo::Rect`].
    #[must_use]
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_lng, y: self.min_lat },
            coord! { x: self.max_lng, y: self.max_lat },
        )
    }

    /// Returns `true` if the two boxes overlap or touch.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.to_rect().intersects(&other.to_rect())
    }
}

/// Error returned when parsing a `minLng,minLat,maxLng,maxLat` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid bounding box {input:?}: expected minLng,minLat,maxLng,maxLat")]
pub struct ParseBoundingBoxError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for BoundingBox {
    type Err = ParseBoundingBoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseBoundingBoxError {
            input: s.to_string(),
        };
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| err())?;
        match parts.as_slice() {
            [a, b, c, d] if parts.iter().all(|v| v.is_finite()) => Ok(Self::new(*a, *b, *c, *d)),
            _ => Err(err()),
        }
    }
}

/// Returns the entries whose declared extent intersects `viewport`.
///
/// With no viewport every entry passes. Entries without an extent always
/// pass, since their coverage is unknown.
#[must_use]
pub fn entries_in_viewport<'a>(
    entries: &'a [SourceEntry],
    viewport: Option<&BoundingBox>,
) -> Vec<&'a SourceEntry> {
    let Some(viewport) = viewport else {
        return entries.iter().collect();
    };

    entries
        .iter()
        .filter(|entry| {
            let keep = entry
                .extent
                .is_none_or(|extent| BoundingBox::from_extent(extent).intersects(viewport));
            if !keep {
                log::debug!("{}: extent outside viewport, skipping", entry.entity_key);
            }
            keep
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, extent: Option<[f64; 4]>) -> SourceEntry {
        let mut entry: SourceEntry = serde_json::from_value(serde_json::json!({
            "entityKey": key,
            "center": [0.0, 0.0]
        }))
        .unwrap();
        entry.extent = extent;
        entry
    }

    #[test]
    fn parses_bbox_string() {
        let bbox: BoundingBox = "11.2, 43.2, 11.4, 43.4".parse().unwrap();
        assert!((bbox.min_lng - 11.2).abs() < f64::EPSILON);
        assert!((bbox.max_lat - 43.4).abs() < f64::EPSILON);
        assert!("1,2,3".parse::<BoundingBox>().is_err());
        assert!("a,b,c,d".parse::<BoundingBox>().is_err());
        assert!("1,2,3,inf".parse::<BoundingBox>().is_err());
    }

    #[test]
    fn swapped_corners_are_normalized() {
        let bbox = BoundingBox::new(5.0, 6.0, 1.0, 2.0);
        assert_eq!(bbox, BoundingBox::new(1.0, 2.0, 5.0, 6.0));
    }

    #[test]
    fn filters_entries_outside_viewport() {
        let entries = [
            entry("siena", Some([11.2, 43.2, 11.4, 43.4])),
            entry("gioia", Some([16.8, 40.7, 17.0, 40.9])),
            entry("unknown", None),
        ];
        let viewport = BoundingBox::new(11.0, 43.0, 12.0, 44.0);

        let kept: Vec<&str> = entries_in_viewport(&entries, Some(&viewport))
            .into_iter()
            .map(|e| e.entity_key.as_str())
            .collect();
        assert_eq!(kept, ["siena", "unknown"]);

        assert_eq!(entries_in_viewport(&entries, None).len(), 3);
    }

    #[test]
    fn touching_boxes_intersect() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let b = BoundingBox::new(1.0, 1.0, 2.0, 2.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&BoundingBox::new(1.5, 1.5, 2.0, 2.0)));
    }
}
