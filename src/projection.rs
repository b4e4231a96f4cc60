//! # Planar Projection
//!
//! Forward and inverse spherical Web Mercator (EPSG:3857) used by the whole
//! analysis pipeline. Clustering radii, hull extraction, overlay and the
//! area/distance metrics all operate on projected meters; geometry is only
//! converted back to WGS84 degrees at the record boundary.
//!
//! Web Mercator meters are inflated by `1/cos(latitude)` away from the
//! equator. The analysis parameters (`eps_meters`, `min_surface_ha`) are
//! interpreted in this projected space, so results stay consistent with
//! configurations tuned against the same projection.

use geo::{Coord, MapCoords};

/// WGS84 semi-major axis in meters (the sphere radius used by EPSG:3857).
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Project a WGS84 coordinate (x = longitude, y = latitude, degrees) to
/// Web Mercator meters.
#[inline]
pub fn to_mercator(c: Coord<f64>) -> Coord<f64> {
    let x = EARTH_RADIUS_M * c.x.to_radians();
    let y = EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + c.y.to_radians() / 2.0).tan().ln();
    Coord { x, y }
}

/// Inverse of [`to_mercator`]: Web Mercator meters back to WGS84 degrees
/// (x = longitude, y = latitude).
#[inline]
pub fn to_wgs84(c: Coord<f64>) -> Coord<f64> {
    let lon = (c.x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (c.y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    Coord { x: lon, y: lat }
}

/// Project an entire geometry from WGS84 degrees to Web Mercator meters.
pub fn geometry_to_mercator<G>(geometry: &G) -> G
where
    G: MapCoords<f64, f64, Output = G>,
{
    geometry.map_coords(to_mercator)
}

/// Project an entire geometry from Web Mercator meters back to WGS84 degrees.
pub fn geometry_to_wgs84<G>(geometry: &G) -> G
where
    G: MapCoords<f64, f64, Output = G>,
{
    geometry.map_coords(to_wgs84)
}
