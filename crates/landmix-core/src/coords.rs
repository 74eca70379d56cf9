//! Geographic coordinate types, great-circle distances and the local
//! metre ↔ degree conversion used for grid steps and KDE bandwidths.
//! All coordinate math uses f64.

use geo::{Area, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::{LumError, Result};

/// Mean Earth radius in metres (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_009.0;

/// First trial offset when searching for a degree step, in degrees.
const INITIAL_OFFSET_DEG: f64 = 1e-6;
const BISECTION_STEPS: usize = 64;

/// A point on the sphere in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Convert to radians.
    pub fn to_radians(self) -> (f64, f64) {
        (self.lat.to_radians(), self.lon.to_radians())
    }
}

/// Axis-aligned geographic bounding box, `lat_min ≤ lat_max`, `lon_min ≤ lon_max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lon_min: f64,
    pub lat_max: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Build a bounding box, rejecting inverted or non-finite extents.
    pub fn new(lat_min: f64, lon_min: f64, lat_max: f64, lon_max: f64) -> Result<Self> {
        let all_finite = [lat_min, lon_min, lat_max, lon_max].iter().all(|v| v.is_finite());
        if !all_finite {
            return Err(LumError::InvalidBoundingBox("non-finite bound".into()));
        }
        if lat_min > lat_max || lon_min > lon_max {
            return Err(LumError::InvalidBoundingBox(format!(
                "[{lat_min}, {lon_min}, {lat_max}, {lon_max}] is inverted"
            )));
        }
        Ok(Self { lat_min, lon_min, lat_max, lon_max })
    }

    /// Smallest box enclosing every `(lon, lat)` pair. `None` for an empty input.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut iter = points.into_iter();
        let (lon, lat) = iter.next()?;
        let init = Self { lat_min: lat, lon_min: lon, lat_max: lat, lon_max: lon };
        Some(iter.fold(init, |b, (lon, lat)| Self {
            lat_min: b.lat_min.min(lat),
            lon_min: b.lon_min.min(lon),
            lat_max: b.lat_max.max(lat),
            lon_max: b.lon_max.max(lon),
        }))
    }

    pub fn centroid(&self) -> LatLon {
        LatLon::new((self.lat_min + self.lat_max) / 2.0, (self.lon_min + self.lon_max) / 2.0)
    }

    /// Inclusive containment test.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.lon_min && lon <= self.lon_max && lat >= self.lat_min && lat <= self.lat_max
    }

    pub fn lat_extent(&self) -> f64 {
        self.lat_max - self.lat_min
    }

    pub fn lon_extent(&self) -> f64 {
        self.lon_max - self.lon_min
    }
}

/// Degree deltas equivalent to a physical distance at some reference point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegreeStep {
    pub lat: f64,
    pub lon: f64,
}

/// Great-circle distance in metres (haversine).
pub fn haversine_m(a: LatLon, b: LatLon) -> f64 {
    let (lat1, lon1) = a.to_radians();
    let (lat2, lon2) = b.to_radians();
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().clamp(0.0, 1.0).asin()
}

/// Convert a distance in metres to latitude/longitude degree deltas at `center`.
///
/// Each axis is searched independently: the trial offset grows (doubling)
/// until the great-circle distance from `center` reaches `meters`, then is
/// tightened by bisection. The longitude search holds latitude fixed and vice
/// versa. Only valid locally; distortion grows with the size of the area and
/// towards the poles.
pub fn degree_step_at(center: LatLon, meters: f64) -> Result<DegreeStep> {
    if !(meters.is_finite() && meters > 0.0) {
        return Err(LumError::InvalidStep(format!("{meters} m is not a positive distance")));
    }
    let lat = grow_offset(meters, 90.0, |d| haversine_m(center, LatLon::new(center.lat + d, center.lon)));
    let lon = grow_offset(meters, 180.0, |d| haversine_m(center, LatLon::new(center.lat, center.lon + d)));
    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok(DegreeStep { lat, lon }),
        _ => Err(LumError::InvalidStep(format!(
            "{meters} m cannot be reached from ({}, {})",
            center.lat, center.lon
        ))),
    }
}

/// Smallest offset (within bisection precision) whose distance reaches `target`.
fn grow_offset(target: f64, limit: f64, dist: impl Fn(f64) -> f64) -> Option<f64> {
    let mut lo = 0.0;
    let mut hi = INITIAL_OFFSET_DEG;
    while dist(hi) < target {
        lo = hi;
        hi *= 2.0;
        if hi > limit {
            return None;
        }
    }
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if dist(mid) >= target {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Some(hi)
}

/// Project `(lon, lat)` vertices onto a sinusoidal (equal-area) plane, in metres.
pub fn sinusoidal_projection(ring: &[[f64; 2]]) -> Vec<(f64, f64)> {
    let metres_per_deg = std::f64::consts::PI * EARTH_RADIUS_M / 180.0;
    ring.iter()
        .map(|&[lon, lat]| (lon * metres_per_deg * lat.to_radians().cos(), lat * metres_per_deg))
        .collect()
}

/// Area in square metres of a `(lon, lat)` ring, via the sinusoidal projection.
/// Degree-area is not comparable across latitudes, so filters use this instead.
pub fn sinusoidal_area_m2(ring: &[[f64; 2]]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    Polygon::new(LineString::from(sinusoidal_projection(ring)), vec![]).unsigned_area()
}
