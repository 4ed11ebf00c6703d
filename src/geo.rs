use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Great-circle distance in kilometers (Haversine, spherical earth).
///
/// Inputs are degrees. NaN in, NaN out.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn within_radius(origin: Coordinates, point: Coordinates, radius_km: f64) -> bool {
    haversine_km(origin, point) <= radius_km
}

/// Stable ascending sort by distance from `origin`; NaN distances go last.
pub fn sort_by_distance<T, F>(items: &mut [T], origin: Coordinates, coords: F)
where
    F: Fn(&T) -> Coordinates,
{
    items.sort_by(|a, b| {
        let da = haversine_km(origin, coords(a));
        let db = haversine_km(origin, coords(b));
        match (da.is_nan(), db.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => da.total_cmp(&db),
        }
    });
}
