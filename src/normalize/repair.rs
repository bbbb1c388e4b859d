//! Self-intersection detection and single-attempt canonical repair.
//!
//! A self-intersecting ring (bow-tie, figure-eight) is split at the first
//! crossing into separate loops; loops that survive cleaning become rings of
//! the repaired polygon. One attempt only: if any ring is still non-simple
//! after the split, the feature is rejected.

use geo::{Contains, Coord, LineString, Point, Polygon};

use super::rings::{clean_ring, signed_area};

/// Proper crossing between two segments, excluding shared endpoints.
/// Returns the intersection point when the interiors cross.
fn segment_crossing(p1: Coord<f64>, p2: Coord<f64>, q1: Coord<f64>, q2: Coord<f64>) -> Option<Coord<f64>> {
    let d1 = Coord { x: p2.x - p1.x, y: p2.y - p1.y };
    let d2 = Coord { x: q2.x - q1.x, y: q2.y - q1.y };
    let denom = d1.x * d2.y - d1.y * d2.x;
    if denom == 0.0 {
        // Parallel or collinear; collinear overlap is caught by the duplicate
        // vertex cleanup upstream, proper crossings cannot occur here.
        return None;
    }
    let t = ((q1.x - p1.x) * d2.y - (q1.y - p1.y) * d2.x) / denom;
    let u = ((q1.x - p1.x) * d1.y - (q1.y - p1.y) * d1.x) / denom;
    const EPS: f64 = 1e-12;
    if t > EPS && t < 1.0 - EPS && u > EPS && u < 1.0 - EPS {
        return Some(Coord { x: p1.x + t * d1.x, y: p1.y + t * d1.y });
    }
    None
}

/// Find the first self-intersection of a closed ring, scanning segment pairs
/// in index order so the result is deterministic.
pub fn find_self_intersection(ring: &LineString<f64>) -> Option<(usize, usize, Coord<f64>)> {
    let coords = &ring.0;
    if coords.len() < 4 {
        return None;
    }
    let n = coords.len() - 1; // closed ring: last == first
    for i in 0..n {
        for j in (i + 1)..n {
            // Adjacent segments share an endpoint, including the closure pair.
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            if let Some(point) =
                segment_crossing(coords[i], coords[i + 1], coords[j], coords[j + 1])
            {
                return Some((i, j, point));
            }
        }
    }
    None
}

#[inline]
pub fn ring_is_simple(ring: &LineString<f64>) -> bool {
    find_self_intersection(ring).is_none()
}

pub fn polygon_is_simple(polygon: &Polygon<f64>) -> bool {
    ring_is_simple(polygon.exterior()) && polygon.interiors().iter().all(ring_is_simple)
}

/// Split a ring at its first self-intersection into two loops.
fn split_ring(ring: &LineString<f64>) -> Option<Vec<LineString<f64>>> {
    let (i, j, point) = find_self_intersection(ring)?;
    let open = &ring.0[..ring.0.len() - 1];

    let mut first = Vec::with_capacity(j - i + 2);
    first.push(point);
    first.extend_from_slice(&open[i + 1..=j]);
    first.push(point);

    let mut second = Vec::with_capacity(open.len() - (j - i) + 2);
    second.push(point);
    second.extend_from_slice(&open[j + 1..]);
    second.extend_from_slice(&open[..=i]);
    second.push(point);

    let loops: Vec<LineString<f64>> = [first, second]
        .into_iter()
        .filter_map(|coords| clean_ring(&LineString(coords)))
        .filter(|ring| signed_area(&ring.0) != 0.0)
        .collect();
    (!loops.is_empty()).then_some(loops)
}

/// Attempt canonical repair of a polygon: split self-intersecting rings into
/// simple loops, reassemble holes by containment. Returns the repaired
/// polygons, or None when the single attempt fails.
pub fn repair_polygon(polygon: &Polygon<f64>) -> Option<Vec<Polygon<f64>>> {
    // Exterior loops.
    let exterior_loops: Vec<LineString<f64>> = if ring_is_simple(polygon.exterior()) {
        vec![polygon.exterior().clone()]
    } else {
        let loops = split_ring(polygon.exterior())?;
        if !loops.iter().all(ring_is_simple) {
            return None;
        }
        loops
    };

    // Interior loops, split the same way.
    let mut interior_loops: Vec<LineString<f64>> = Vec::with_capacity(polygon.interiors().len());
    for ring in polygon.interiors() {
        if ring_is_simple(ring) {
            interior_loops.push(ring.clone());
        } else {
            let loops = split_ring(ring)?;
            if !loops.iter().all(ring_is_simple) {
                return None;
            }
            interior_loops.extend(loops);
        }
    }

    // Assemble: each hole belongs to exactly one exterior loop.
    let mut shells: Vec<(LineString<f64>, Vec<LineString<f64>>)> = exterior_loops
        .into_iter()
        .map(|shell| (shell, Vec::new()))
        .collect();
    for hole in interior_loops {
        let anchor = interior_anchor(&hole);
        let owner = shells.iter_mut().find(|(shell, _)| {
            Polygon::new(shell.clone(), vec![]).contains(&Point(anchor))
        });
        match owner {
            Some((_, holes)) => holes.push(hole),
            None => return None, // hole outside every shell: repair failed
        }
    }

    Some(
        shells
            .into_iter()
            .map(|(shell, holes)| Polygon::new(shell, holes))
            .collect(),
    )
}

/// A point strictly inside the hole, used for containment assignment. The
/// ring centroid of a simple ring works for the convex-ish holes produced by
/// splitting; fall back to the first vertex when area vanishes.
fn interior_anchor(ring: &LineString<f64>) -> Coord<f64> {
    let coords = &ring.0;
    let area = signed_area(coords);
    if area == 0.0 {
        return coords[0];
    }
    let mut cx = 0.0;
    let mut cy = 0.0;
    for w in coords.windows(2) {
        let cross = w[0].x * w[1].y - w[1].x * w[0].y;
        cx += (w[0].x + w[1].x) * cross;
        cy += (w[0].y + w[1].y) * cross;
    }
    Coord { x: cx / (6.0 * area), y: cy / (6.0 * area) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn figure_eight() -> LineString<f64> {
        LineString(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 0.0, y: 1.0 },
            Coord { x: 0.0, y: 0.0 },
        ])
    }

    #[test]
    fn detects_bow_tie() {
        assert!(!ring_is_simple(&figure_eight()));
        let (i, j, point) = find_self_intersection(&figure_eight()).unwrap();
        assert_eq!((i, j), (0, 2));
        assert!((point.x - 0.5).abs() < 1e-12);
        assert!((point.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn square_is_simple() {
        let square = LineString(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 0.0, y: 1.0 },
            Coord { x: 0.0, y: 0.0 },
        ]);
        assert!(ring_is_simple(&square));
    }

    #[test]
    fn bow_tie_splits_into_two_triangles() {
        let polygon = Polygon::new(figure_eight(), vec![]);
        let repaired = repair_polygon(&polygon).unwrap();
        assert_eq!(repaired.len(), 2);
        for poly in &repaired {
            assert!(polygon_is_simple(poly));
            assert_eq!(poly.exterior().0.len(), 4); // triangle + closure
        }
    }

    #[test]
    fn simple_polygon_passes_through() {
        let square = Polygon::new(
            LineString(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 2.0, y: 0.0 },
                Coord { x: 2.0, y: 2.0 },
                Coord { x: 0.0, y: 2.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![LineString(vec![
                Coord { x: 0.5, y: 0.5 },
                Coord { x: 0.5, y: 1.0 },
                Coord { x: 1.0, y: 1.0 },
                Coord { x: 1.0, y: 0.5 },
                Coord { x: 0.5, y: 0.5 },
            ])],
        );
        let repaired = repair_polygon(&square).unwrap();
        assert_eq!(repaired.len(), 1);
        assert_eq!(repaired[0].interiors().len(), 1);
    }
}
