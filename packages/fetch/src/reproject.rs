//! Coordinate reprojection to WGS84.

use ecosensor_schema::FeatureCollection;
use geo::{Coord, MapCoords as _};
use proj4rs::Proj;

/// EPSG:3857 as a proj string.
const PSEUDO_MERCATOR: &str = "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs";

/// Geographic coordinates on the EPSG:3857 sphere.
const SPHERE_LONGLAT: &str = "+proj=longlat +a=6378137 +b=6378137 +no_defs";

/// Errors raised while converting coordinates.
#[derive(Debug, thiserror::Error)]
pub enum ReprojectError {
    /// The projection library rejected a definition or a coordinate.
    #[error("projection failed: {0}")]
    Proj(#[from] proj4rs::errors::Error),
}

/// Converts a coordinate from a source CRS to WGS84 longitude/latitude.
pub trait Reprojector: Send + Sync {
    /// Returns `coord` as `(lng, lat)` degrees.
    ///
    /// # Errors
    ///
    /// Returns [`ReprojectError`] if `coord` cannot be converted.
    fn to_wgs84(&self, coord: Coord<f64>) -> Result<Coord<f64>, ReprojectError>;
}

/// Coordinates already in WGS84.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Reprojector for Identity {
    fn to_wgs84(&self, coord: Coord<f64>) -> Result<Coord<f64>, ReprojectError> {
        Ok(coord)
    }
}

/// Web Mercator (EPSG:3857) meters, inverted through `proj4rs`.
#[derive(Debug)]
pub struct WebMercator {
    source: Proj,
    target: Proj,
}

impl WebMercator {
    /// Builds the EPSG:3857 to geographic transform.
    ///
    /// # Errors
    ///
    /// Returns [`ReprojectError`] if a projection definition is rejected.
    pub fn new() -> Result<Self, ReprojectError> {
        Ok(Self {
            source: Proj::from_proj_string(PSEUDO_MERCATOR)?,
            target: Proj::from_proj_string(SPHERE_LONGLAT)?,
        })
    }
}

impl Reprojector for WebMercator {
    fn to_wgs84(&self, coord: Coord<f64>) -> Result<Coord<f64>, ReprojectError> {
        let mut point = (coord.x, coord.y, 0.0);
        proj4rs::transform::transform(&self.source, &self.target, &mut point)?;
        // proj4rs works in radians for geographic systems
        Ok(Coord {
            x: point.0.to_degrees(),
            y: point.1.to_degrees(),
        })
    }
}

/// Reprojects every feature geometry in `collection` in place.
///
/// A geometry that cannot be represented (for example a position with
/// fewer than two ordinates) or converted is dropped with a warning, which
/// makes the builder report that feature as missing its geometry.
pub fn reproject_collection(collection: &mut FeatureCollection, reprojector: &dyn Reprojector) {
    for (index, feature) in collection.features.iter_mut().enumerate() {
        let Some(geometry) = feature.geometry.take() else {
            continue;
        };
        let shape = match geo::Geometry::<f64>::try_from(geometry.value) {
            Ok(shape) => shape,
            Err(e) => {
                log::warn!("feature {index}: dropping unreadable geometry: {e}");
                continue;
            }
        };
        match shape.try_map_coords(|c| reprojector.to_wgs84(c)) {
            Ok(shape) => {
                feature.geometry = Some(geojson::Geometry::new(geojson::Value::from(&shape)));
            }
            Err(e) => log::warn!("feature {index}: dropping unprojectable geometry: {e}"),
        }
    }
}

/// Reprojects a single `[x, y]` pair.
///
/// # Errors
///
/// Returns [`ReprojectError`] if the point cannot be converted.
pub fn reproject_point(
    point: [f64; 2],
    reprojector: &dyn Reprojector,
) -> Result<[f64; 2], ReprojectError> {
    let c = reprojector.to_wgs84(Coord {
        x: point[0],
        y: point[1],
    })?;
    Ok([c.x, c.y])
}

#[cfg(test)]
mod tests {
    use ecosensor_schema::RawFeature;
    use serde_json::json;

    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn mercator() -> WebMercator {
        WebMercator::new().unwrap()
    }

    #[test]
    fn mercator_origin_maps_to_origin() {
        let c = mercator().to_wgs84(Coord { x: 0.0, y: 0.0 }).unwrap();
        assert!(close(c.x, 0.0));
        assert!(close(c.y, 0.0));
    }

    #[test]
    fn mercator_edge_maps_to_antimeridian() {
        let c = mercator()
            .to_wgs84(Coord {
                x: 20_037_508.342_789_244,
                y: 0.0,
            })
            .unwrap();
        assert!(close(c.x.abs(), 180.0));
        assert!(close(c.y, 0.0));
    }

    #[test]
    fn mercator_latitude_matches_known_value() {
        // Siena, roughly 43.318 N
        let [lng, lat] = reproject_point([1_256_000.0, 5_359_000.0], &mercator()).unwrap();
        assert!((lng - 11.283).abs() < 1e-3);
        assert!((lat - 43.318).abs() < 1e-2);
    }

    #[test]
    fn collection_geometries_are_reprojected() {
        let mut collection = FeatureCollection::new(vec![RawFeature::new(
            geojson::Geometry::new(geojson::Value::LineString(vec![
                vec![0.0, 0.0],
                vec![10_018_754.171_394_622, 0.0],
            ])),
            json!({}),
        )]);

        reproject_collection(&mut collection, &mercator());

        let geometry = collection.features[0].geometry.as_ref().unwrap();
        let geojson::Value::LineString(points) = &geometry.value else {
            panic!("expected a line string");
        };
        assert!(close(points[0][0], 0.0));
        assert!(close(points[1][0], 90.0));
    }

    #[test]
    fn identity_leaves_coordinates() {
        let [lng, lat] = reproject_point([11.3, 43.3], &Identity).unwrap();
        assert!(close(lng, 11.3));
        assert!(close(lat, 43.3));
    }
}
