use crate::polygon::Coord;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("polygon must contain at least 4 points (including closure), got {got}")]
    InsufficientPoints { got: usize },

    #[error("coordinate {index} must be an [lng, lat] pair of finite numbers")]
    MalformedCoordinate { index: usize },

    #[error("invalid polygon: {reason}")]
    InvalidGeometry {
        reason: String,
        /// Offending coordinate, when one could be pinned down.
        coord: Option<Coord>,
    },
}

/// Check that a closed ring describes a simple polygon: no repeated
/// consecutive vertices, no spikes, no edge crossing or touching another
/// non-adjacent edge.
pub(crate) fn check_simple(ring: &[Coord]) -> Result<(), ValidationError> {
    for w in ring.windows(2) {
        if w[0] == w[1] {
            return Err(ValidationError::InvalidGeometry {
                reason: format!("repeated consecutive vertex at {}", w[0]),
                coord: Some(w[0]),
            });
        }
    }

    let n = ring.len() - 1; // edge count; edge i runs ring[i] -> ring[i+1]

    // Adjacent edges share exactly one vertex. They may be collinear only if
    // the ring keeps moving forward; doubling back is a spike.
    for i in 0..n {
        let p = ring[i];
        let q = ring[i + 1];
        let r = ring[(i + 2) % n];
        if cross(p, q, r) == 0.0 {
            let forward = (r.x - q.x) * (p.x - q.x) + (r.y - q.y) * (p.y - q.y);
            if forward > 0.0 {
                return Err(ValidationError::InvalidGeometry {
                    reason: format!("ring doubles back on itself at {q}"),
                    coord: Some(q),
                });
            }
        }
    }

    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                continue;
            }
            if let Some(at) = segment_intersection(ring[i], ring[i + 1], ring[j], ring[j + 1]) {
                return Err(ValidationError::InvalidGeometry {
                    reason: format!("self-intersection at {at}"),
                    coord: Some(at),
                });
            }
        }
    }

    Ok(())
}

fn cross(o: Coord, a: Coord, b: Coord) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// `p` is known collinear with `a`-`b`; is it within the segment's box?
fn on_segment(a: Coord, b: Coord, p: Coord) -> bool {
    p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

/// Intersection point of segments `a`-`b` and `c`-`d`, if any. A shared
/// endpoint or a touch counts; the ring has already excluded adjacency.
fn segment_intersection(a: Coord, b: Coord, c: Coord, d: Coord) -> Option<Coord> {
    let d1 = cross(c, d, a);
    let d2 = cross(c, d, b);
    let d3 = cross(a, b, c);
    let d4 = cross(a, b, d);

    let straddles_cd = (d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0);
    let straddles_ab = (d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0);
    if straddles_cd && straddles_ab {
        let t = d1 / (d1 - d2);
        return Some(Coord::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y)));
    }

    if d1 == 0.0 && on_segment(c, d, a) {
        return Some(a);
    }
    if d2 == 0.0 && on_segment(c, d, b) {
        return Some(b);
    }
    if d3 == 0.0 && on_segment(a, b, c) {
        return Some(c);
    }
    if d4 == 0.0 && on_segment(a, b, d) {
        return Some(d);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proper_crossing_reports_point() {
        let at = segment_intersection(
            Coord::new(0.0, 0.0),
            Coord::new(2.0, 2.0),
            Coord::new(0.0, 2.0),
            Coord::new(2.0, 0.0),
        )
        .unwrap();
        assert!((at.x - 1.0).abs() < 1e-12);
        assert!((at.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn disjoint_segments_do_not_intersect() {
        assert_eq!(
            segment_intersection(
                Coord::new(0.0, 0.0),
                Coord::new(1.0, 0.0),
                Coord::new(0.0, 1.0),
                Coord::new(1.0, 1.0),
            ),
            None
        );
    }

    #[test]
    fn endpoint_touch_counts() {
        let at = segment_intersection(
            Coord::new(0.0, 0.0),
            Coord::new(2.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(1.0, 5.0),
        )
        .unwrap();
        assert_eq!(at, Coord::new(1.0, 0.0));
    }

    #[test]
    fn collinear_vertex_is_allowed() {
        // straight-through midpoint on an edge is not a spike
        let ring = [
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(2.0, 0.0),
            Coord::new(2.0, 2.0),
            Coord::new(0.0, 0.0),
        ];
        assert!(check_simple(&ring).is_ok());
    }
}
