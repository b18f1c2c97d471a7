//! Footprints and padded bounding boxes in lon/lat.
use geo::{Area, BoundingRect, Coord, LineString, Polygon, Rect};

use crate::error::{Error, Result};

/// A glacier outline: the exterior ring of a polygon in geographic
/// coordinates. The ring is always closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    polygon: Polygon<f64>,
}

impl Footprint {
    pub fn new(ring: Vec<(f64, f64)>) -> Result<Self> {
        Self::from_polygon(Polygon::new(LineString::from(ring), vec![]))
    }

    pub fn from_polygon(polygon: Polygon<f64>) -> Result<Self> {
        let exterior = polygon.exterior();
        // Polygon::new closes the ring, so a triangle has four coordinates
        if exterior.0.len() < 4 {
            return Err(Error::InvalidGeometry(format!(
                "footprint ring needs at least 3 distinct points, got {}",
                exterior.0.len().saturating_sub(1)
            )));
        }
        if exterior.coords().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err(Error::InvalidGeometry(
                "footprint contains non-finite coordinates".to_string(),
            ));
        }
        Ok(Self { polygon })
    }

    pub fn polygon(self: &Self) -> &Polygon<f64> {
        &self.polygon
    }

    pub fn ring(self: &Self) -> Vec<(f64, f64)> {
        self.polygon.exterior().coords().map(|c| (c.x, c.y)).collect()
    }

    /// Axis-aligned envelope of the footprint.
    pub fn envelope(self: &Self) -> Result<Rect<f64>> {
        self.polygon
            .bounding_rect()
            .ok_or(Error::InvalidGeometry("empty footprint".to_string()))
    }
}

/// Axis-aligned padded rectangle used to bound imagery searches and exports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    rect: Rect<f64>,
}

impl BoundingBox {
    /// Envelope of `footprint` scaled about its centre by `scale_fact` in both
    /// axes independently.
    pub fn around(footprint: &Footprint, scale_fact: f64) -> Result<Self> {
        if !scale_fact.is_finite() || scale_fact < 1.0 {
            return Err(Error::InvalidGeometry(format!(
                "scale factor must be >= 1.0, got {scale_fact}"
            )));
        }
        let envelope = footprint.envelope()?;
        Ok(Self::from_rect(scale_rect(envelope, scale_fact, scale_fact)))
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self { rect }
    }

    pub fn rect(self: &Self) -> Rect<f64> {
        self.rect
    }

    pub fn center(self: &Self) -> (f64, f64) {
        let c = self.rect.center();
        (c.x, c.y)
    }

    pub fn width(self: &Self) -> f64 {
        self.rect.width()
    }

    pub fn height(self: &Self) -> f64 {
        self.rect.height()
    }

    pub fn area(self: &Self) -> f64 {
        self.rect.unsigned_area()
    }

    /// `[min_lon, min_lat, max_lon, max_lat]`, the STAC `bbox` layout.
    pub fn bounds(self: &Self) -> [f64; 4] {
        let (min, max) = (self.rect.min(), self.rect.max());
        [min.x, min.y, max.x, max.y]
    }

    /// Closed ring of 4+1 corner points.
    pub fn ring(self: &Self) -> Vec<(f64, f64)> {
        self.rect
            .to_polygon()
            .exterior()
            .coords()
            .map(|c| (c.x, c.y))
            .collect()
    }
}

fn scale_rect(rect: Rect<f64>, xfact: f64, yfact: f64) -> Rect<f64> {
    let center = rect.center();
    let half_width = rect.width() * xfact / 2.0;
    let half_height = rect.height() * yfact / 2.0;
    Rect::new(
        Coord {
            x: center.x - half_width,
            y: center.y - half_height,
        },
        Coord {
            x: center.x + half_width,
            y: center.y + half_height,
        },
    )
}
