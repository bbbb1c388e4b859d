//! Ring-level cleanup: closure, duplicate removal, degeneracy checks, and
//! winding enforcement (CCW exteriors, CW interiors).

use geo::{Coord, LineString, MultiPolygon, Polygon};

/// Signed area of a closed coordinate ring (positive for CCW).
pub fn signed_area(pts: &[Coord<f64>]) -> f64 {
    let mut a = 0.0;
    for w in pts.windows(2) {
        a += w[0].x * w[1].y - w[1].x * w[0].y;
    }
    a / 2.0
}

/// Ensure first and last coordinates are the same.
pub fn ensure_closed(coords: &mut Vec<Coord<f64>>) {
    if !coords.is_empty() && coords[0] != coords[coords.len() - 1] {
        coords.push(coords[0]);
    }
}

/// Remove consecutive duplicate coordinates, keeping closure intact.
pub fn dedupe_consecutive(coords: &mut Vec<Coord<f64>>) {
    coords.dedup();
    // Closure may have collapsed; restore it.
    ensure_closed(coords);
}

/// Clean one ring: dedupe, close, and require at least 4 points (triangle
/// plus closure). Returns None when too few points remain.
///
/// Zero area alone does not fail a ring here: a crossing ring (bow-tie) has
/// zero signed area yet is repairable. Callers pair this with
/// [`ring_is_degenerate`] once simplicity is known.
pub fn clean_ring(ring: &LineString<f64>) -> Option<LineString<f64>> {
    let mut coords = ring.0.clone();
    dedupe_consecutive(&mut coords);
    if coords.len() < 4 {
        return None;
    }
    Some(LineString(coords))
}

/// A ring enclosing no area (collinear spike, or a crossing ring whose
/// lobes cancel).
#[inline]
pub fn ring_is_degenerate(ring: &LineString<f64>) -> bool {
    signed_area(&ring.0) == 0.0
}

/// Force the right-hand rule: exterior rings counter-clockwise, interior
/// rings clockwise.
pub fn enforce_winding(polygon: &mut Polygon<f64>) {
    let mut exterior = polygon.exterior().0.clone();
    if signed_area(&exterior) < 0.0 {
        exterior.reverse();
    }
    let interiors: Vec<LineString<f64>> = polygon
        .interiors()
        .iter()
        .map(|ring| {
            let mut coords = ring.0.clone();
            if signed_area(&coords) > 0.0 {
                coords.reverse();
            }
            LineString(coords)
        })
        .collect();
    *polygon = Polygon::new(LineString(exterior), interiors);
}

/// True when every exterior is CCW and every interior CW.
pub fn winding_is_canonical(mp: &MultiPolygon<f64>) -> bool {
    mp.0.iter().all(|poly| {
        signed_area(&poly.exterior().0) > 0.0
            && poly.interiors().iter().all(|ring| signed_area(&ring.0) < 0.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_cw() -> LineString<f64> {
        LineString(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 0.0, y: 1.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 0.0, y: 0.0 },
        ])
    }

    #[test]
    fn winding_flips_to_right_hand_rule() {
        let hole = LineString(vec![
            Coord { x: 0.2, y: 0.2 },
            Coord { x: 0.4, y: 0.2 },
            Coord { x: 0.4, y: 0.4 },
            Coord { x: 0.2, y: 0.4 },
            Coord { x: 0.2, y: 0.2 },
        ]); // CCW hole, must flip to CW
        let mut poly = Polygon::new(square_cw(), vec![hole]);
        enforce_winding(&mut poly);
        assert!(signed_area(&poly.exterior().0) > 0.0);
        assert!(signed_area(&poly.interiors()[0].0) < 0.0);
        assert!(winding_is_canonical(&MultiPolygon(vec![poly])));
    }

    #[test]
    fn degenerate_rings_detected() {
        // Repeated points collapse below the 4-point floor.
        let sliver = LineString(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 0.0, y: 0.0 },
        ]);
        assert!(clean_ring(&sliver).is_none());

        // Zero-area spike survives cleaning but reads as degenerate.
        let spike = LineString(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 2.0, y: 0.0 },
            Coord { x: 0.0, y: 0.0 },
        ]);
        let cleaned = clean_ring(&spike).unwrap();
        assert!(ring_is_degenerate(&cleaned));

        let good = clean_ring(&square_cw()).unwrap();
        assert_eq!(good.0.len(), 5);
        assert!(!ring_is_degenerate(&good));
    }

    #[test]
    fn dedupe_keeps_closure() {
        let mut coords = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 0.0, y: 0.0 },
        ];
        dedupe_consecutive(&mut coords);
        assert_eq!(coords.len(), 4);
        assert_eq!(coords.first(), coords.last());
    }
}
