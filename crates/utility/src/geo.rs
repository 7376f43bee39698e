use std::f64::consts::{FRAC_PI_2, PI};

/// Mean earth radius used for every great-circle computation.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

fn to_radians(degrees: f64) -> f64 {
    degrees * PI / 180.0
}

fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / PI
}

pub fn is_valid_latitude(latitude: f64) -> bool {
    latitude.is_finite() && (-90.0..=90.0).contains(&latitude)
}

pub fn is_valid_longitude(longitude: f64) -> bool {
    longitude.is_finite() && (-180.0..=180.0).contains(&longitude)
}

/// An area on the sphere enclosing a circle. Longitudes are split into up to
/// two spans when the circle crosses the antimeridian.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub longitude_spans: Vec<(f64, f64)>,
}

impl BoundingBox {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_latitude
            && latitude <= self.max_latitude
            && self
                .longitude_spans
                .iter()
                .any(|(min, max)| longitude >= *min && longitude <= *max)
    }
}

/// Smallest latitude/longitude box containing every point within `radius_meters`
/// of the center. Covers all longitudes when a pole lies inside the circle.
pub fn calculate_bounding_box(
    latitude: f64,
    longitude: f64,
    radius_meters: f64,
) -> BoundingBox {
    let lat_rad = to_radians(latitude);
    let lon_rad = to_radians(longitude);
    let angular_radius = radius_meters / EARTH_RADIUS_METERS;

    let min_lat = lat_rad - angular_radius;
    let max_lat = lat_rad + angular_radius;

    if min_lat <= -FRAC_PI_2 || max_lat >= FRAC_PI_2 {
        return BoundingBox {
            min_latitude: to_degrees(min_lat).max(-90.0),
            max_latitude: to_degrees(max_lat).min(90.0),
            longitude_spans: vec![(-180.0, 180.0)],
        };
    }

    // longitude offset of the circle's tangent points, grows towards the poles
    let delta_lon = (angular_radius.sin() / lat_rad.cos()).asin();
    let min_lon = to_degrees(lon_rad - delta_lon);
    let max_lon = to_degrees(lon_rad + delta_lon);

    let longitude_spans = if max_lon - min_lon >= 360.0 {
        vec![(-180.0, 180.0)]
    } else if min_lon < -180.0 {
        vec![(min_lon + 360.0, 180.0), (-180.0, max_lon)]
    } else if max_lon > 180.0 {
        vec![(min_lon, 180.0), (-180.0, max_lon - 360.0)]
    } else {
        vec![(min_lon, max_lon)]
    };

    BoundingBox {
        min_latitude: to_degrees(min_lat),
        max_latitude: to_degrees(max_lat),
        longitude_spans,
    }
}

/// Great-circle distance in meters between two points given in degrees.
pub fn haversine_distance(
    latitude_1: f64,
    longitude_1: f64,
    latitude_2: f64,
    longitude_2: f64,
) -> f64 {
    let lat1_rad = to_radians(latitude_1);
    let lon1_rad = to_radians(longitude_1);
    let lat2_rad = to_radians(latitude_2);
    let lon2_rad = to_radians(longitude_2);

    let dlat = lat2_rad - lat1_rad;
    let dlon = lon2_rad - lon1_rad;

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}
