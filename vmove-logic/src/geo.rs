use std::{f64::consts::PI, fmt};

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// A "part" of a point, in decimal degrees
pub type Coordinate = f64;

/// Semi-major axis of the reference ellipsoid, in meters
const SEMI_MAJOR_AXIS: f64 = 6378137.0;
/// First eccentricity squared of the reference ellipsoid
const ECCENTRICITY_SQ: f64 = 0.00669342162296594323;
/// Mean earth radius used for the planar distance estimate
const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
/// Some point on the globe. Always in range, construct with [GeoPoint::new].
pub struct GeoPoint {
    lat: Coordinate,
    lng: Coordinate,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    lat: Coordinate,
    lng: Coordinate,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = SimError;

    fn try_from(raw: RawGeoPoint) -> Result<Self, Self::Error> {
        Self::new(raw.lat, raw.lng)
    }
}

impl GeoPoint {
    /// Create a new point, rejecting anything outside of [-90, 90] / [-180, 180] (or NaN)
    pub fn new(lat: Coordinate, lng: Coordinate) -> Result<Self, SimError> {
        if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) {
            Ok(Self { lat, lng })
        } else {
            Err(SimError::InvalidArgument { lat, lng })
        }
    }

    pub(crate) const fn new_unchecked(lat: Coordinate, lng: Coordinate) -> Self {
        Self { lat, lng }
    }

    pub const fn lat(&self) -> Coordinate {
        self.lat
    }

    pub const fn lng(&self) -> Coordinate {
        self.lng
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

fn lat_offset(x: f64, y: f64) -> f64 {
    let mut ret = -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn lng_offset(x: f64, y: f64) -> f64 {
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}

/// Apply the regional frame offset to a point.
///
/// The coefficients and ellipsoid constants define the target frame, they must not be tuned.
/// No range check happens here, see [to_offset_frame] for the guarded version.
pub fn correct(p: GeoPoint) -> GeoPoint {
    let x = p.lng - 105.0;
    let y = p.lat - 35.0;

    let rad_lat = p.lat / 180.0 * PI;
    let magic = rad_lat.sin();
    let magic = 1.0 - ECCENTRICITY_SQ * magic * magic;
    let sqrt_magic = magic.sqrt();

    let d_lat = (lat_offset(x, y) * 180.0)
        / ((SEMI_MAJOR_AXIS * (1.0 - ECCENTRICITY_SQ)) / (magic * sqrt_magic) * PI);
    let d_lng = (lng_offset(x, y) * 180.0) / (SEMI_MAJOR_AXIS / sqrt_magic * rad_lat.cos() * PI);

    GeoPoint::new_unchecked(p.lat - d_lat, p.lng - d_lng)
}

/// Whether a point lies outside of the region the offset frame applies to
pub fn out_of_china(p: GeoPoint) -> bool {
    !(72.004..=137.8347).contains(&p.lng) || !(0.8293..=55.8271).contains(&p.lat)
}

/// Convert a point to the frame the mock provider expects, points outside of the offset region
/// pass through unchanged.
pub fn to_offset_frame(p: GeoPoint) -> GeoPoint {
    if out_of_china(p) { p } else { correct(p) }
}

/// Approximate distance between two points in kilometers.
///
/// Planar, with the longitude axis scaled by the cosine of the average latitude. Only good
/// for city-scale segments.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let avg_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let dy = (b.lat - a.lat).to_radians() * EARTH_RADIUS_KM;
    let dx = (b.lng - a.lng).to_radians() * EARTH_RADIUS_KM * avg_lat.cos();
    dx.hypot(dy)
}
