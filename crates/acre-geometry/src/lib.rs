//! Planar geometry for map areas: ring validation and area measurement.
//!
//! All coordinates are `[lng, lat]` pairs on WGS84 (SRID 4326). One
//! `GeometryFactory` is constructed per process and passed to whoever needs
//! to validate user-drawn rings.

mod area;
mod polygon;
mod validate;

pub use polygon::{Coord, ValidPolygon, SRID_WGS84};
pub use validate::ValidationError;

/// Builds validated polygons with a fixed spatial reference.
#[derive(Clone, Debug)]
pub struct GeometryFactory {
    srid: u32,
}

impl GeometryFactory {
    /// Factory for WGS84 longitude/latitude geometry.
    pub fn wgs84() -> Self {
        Self { srid: SRID_WGS84 }
    }

    pub fn srid(&self) -> u32 {
        self.srid
    }

    /// Validate a user-drawn ring of `[lng, lat]` pairs into a simple
    /// polygon.
    ///
    /// An unclosed ring gets a synthetic closing point equal to the first
    /// coordinate; the caller's shape is never altered otherwise. Fails on
    /// fewer than 4 pairs, on pairs that are not exactly two finite numbers,
    /// and on rings that are not simple (repeated or self-intersecting).
    pub fn validate(&self, coords: &[Vec<f64>]) -> Result<ValidPolygon, ValidationError> {
        if coords.len() < 4 {
            return Err(ValidationError::InsufficientPoints { got: coords.len() });
        }

        let mut ring = Vec::with_capacity(coords.len() + 1);
        for (index, pair) in coords.iter().enumerate() {
            if pair.len() != 2 || !pair[0].is_finite() || !pair[1].is_finite() {
                return Err(ValidationError::MalformedCoordinate { index });
            }
            ring.push(Coord::new(pair[0], pair[1]));
        }

        if ring.first() != ring.last() {
            ring.push(ring[0]);
        }

        validate::check_simple(&ring)?;

        Ok(ValidPolygon::new(ring, self.srid))
    }
}

impl Default for GeometryFactory {
    fn default() -> Self {
        Self::wgs84()
    }
}
