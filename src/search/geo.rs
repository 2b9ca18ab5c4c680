//! Geo predicate math: haversine distances, bounding boxes, polygon
//! containment and human-readable distance parsing.
//!
//! Geo fields are stored as two f64 fast columns; no spatial index exists,
//! so these predicates are evaluated per candidate document.

use crate::spec::GeoPoint;
use crate::{Error, Result};

/// Mean earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A distance with unit, parsed from forms like "0.5km", "200m" or "3mi".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance {
    pub kilometers: f64,
}

impl Distance {
    pub fn parse(text: &str) -> Result<Distance> {
        let text = text.trim();
        let split = text
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(text.len());
        let (value, unit) = text.split_at(split);
        let value: f64 = value.trim().parse().map_err(|_| {
            Error::InvalidSpec(format!("invalid distance '{text}'"))
        })?;
        let kilometers = match unit.trim() {
            "km" => value,
            "m" | "" => value / 1000.0,
            "mi" | "miles" => value * 1.609_344,
            other => {
                return Err(Error::InvalidSpec(format!(
                    "unknown distance unit '{other}' in '{text}'"
                )))
            }
        };
        Ok(Distance { kilometers })
    }
}

/// Great-circle distance in kilometres between two points.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

pub fn in_bounding_box(point: GeoPoint, top_left: GeoPoint, bottom_right: GeoPoint) -> bool {
    point.lat <= top_left.lat
        && point.lat >= bottom_right.lat
        && point.lon >= top_left.lon
        && point.lon <= bottom_right.lon
}

/// Ray-cast containment check; points on an edge count as inside closely
/// enough for filter purposes.
pub fn in_polygon(point: GeoPoint, vertices: &[GeoPoint]) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (vi, vj) = (vertices[i], vertices[j]);
        if (vi.lat > point.lat) != (vj.lat > point.lat) {
            let lon_at =
                vi.lon + (point.lat - vi.lat) / (vj.lat - vi.lat) * (vj.lon - vi.lon);
            if point.lon < lon_at {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
