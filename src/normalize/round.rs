//! Fixed-precision coordinate rounding.
//!
//! Every longitude/latitude is rounded to a fixed number of decimal digits
//! using banker's rounding (round half to even) so that reruns produce
//! identical bytes regardless of platform printf behavior.

use geo::{Coord, LineString, MultiPolygon, Polygon};

/// Round one value to `digits` decimal places, ties to even.
pub fn round_value(value: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    (value * scale).round_ties_even() / scale
}

pub fn round_coord(coord: Coord<f64>, digits: u32) -> Coord<f64> {
    Coord {
        x: round_value(coord.x, digits),
        y: round_value(coord.y, digits),
    }
}

/// Round every coordinate of a MultiPolygon. Rounding can collapse adjacent
/// vertices onto the same point, so callers re-clean rings afterwards.
pub fn round_multi_polygon(mp: &MultiPolygon<f64>, digits: u32) -> MultiPolygon<f64> {
    MultiPolygon(
        mp.0
            .iter()
            .map(|poly| {
                Polygon::new(
                    round_ring(poly.exterior(), digits),
                    poly.interiors().iter().map(|r| round_ring(r, digits)).collect(),
                )
            })
            .collect(),
    )
}

fn round_ring(ring: &LineString<f64>, digits: u32) -> LineString<f64> {
    LineString(ring.0.iter().map(|c| round_coord(*c, digits)).collect())
}

/// True when the value has at most `digits` decimal digits (within one ulp
/// of the scaled integer).
pub fn has_precision(value: f64, digits: u32) -> bool {
    let scale = 10f64.powi(digits as i32);
    let scaled = value * scale;
    (scaled - scaled.round_ties_even()).abs() < 1e-6
}
