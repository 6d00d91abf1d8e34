/// Earth's mean radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates in kilometers.
///
/// The central-angle argument is clamped to [-1, 1] so identical and
/// antipodal points stay inside `acos`'s domain despite rounding.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().clamp(-1.0, 1.0).asin();

    EARTH_RADIUS_KM * c
}

/// A degree-space bounding box that fully contains the circle of
/// `radius_km` around a point. Used to pre-filter SQL queries before the
/// exact Haversine check; near the poles it degenerates to the full
/// longitude range.
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

pub fn bounding_box(lat: f64, lon: f64, radius_km: f64) -> BoundingBox {
    // One degree of latitude is ~111 km everywhere.
    let lat_delta = radius_km / 111.0;
    let cos_lat = lat.to_radians().cos().abs();
    let lon_delta = if cos_lat < 1e-6 {
        180.0
    } else {
        (radius_km / (111.0 * cos_lat)).min(180.0)
    };

    BoundingBox {
        min_lat: (lat - lat_delta).max(-90.0),
        max_lat: (lat + lat_delta).min(90.0),
        min_lon: (lon - lon_delta).max(-180.0),
        max_lon: (lon + lon_delta).min(180.0),
    }
}

pub fn valid_coordinate(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}
