//! Area measurement via spherical Web Mercator projection.

use crate::polygon::{Coord, ValidPolygon};

const EARTH_RADIUS_M: f64 = 6_378_137.0;

fn to_web_mercator(c: Coord) -> Coord {
    let x = EARTH_RADIUS_M * c.x.to_radians();
    let y = EARTH_RADIUS_M
        * (std::f64::consts::FRAC_PI_4 + c.y.to_radians() / 2.0)
            .tan()
            .ln();
    Coord::new(x, y)
}

/// Shoelace area of the projected exterior ring, in km².
pub(crate) fn area_km2(polygon: &ValidPolygon) -> f64 {
    let projected: Vec<Coord> = polygon
        .exterior()
        .iter()
        .copied()
        .map(to_web_mercator)
        .collect();

    let mut twice_area = 0.0;
    for w in projected.windows(2) {
        twice_area += w[0].x * w[1].y - w[1].x * w[0].y;
    }

    (twice_area / 2.0).abs() / 1_000_000.0
}
