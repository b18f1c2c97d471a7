use geo::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "feature_collection_type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_type")]
    pub kind: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub geometry: Option<Geometry>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Vec<f64>),
    Polygon(Vec<Vec<Vec<f64>>>),
    MultiPolygon(Vec<Vec<Vec<Vec<f64>>>>),
}

fn feature_collection_type() -> String {
    "FeatureCollection".to_string()
}

fn feature_type() -> String {
    "Feature".to_string()
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: feature_collection_type(),
            features,
        }
    }
}

impl Feature {
    pub fn new(properties: Map<String, Value>, geometry: Geometry) -> Self {
        Self {
            kind: feature_type(),
            properties,
            geometry: Some(geometry),
        }
    }

    /// String form of a property, accepting numeric identifiers too.
    pub fn property_str(self: &Self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl Geometry {
    pub fn from_polygon(polygon: &Polygon<f64>) -> Self {
        let ring = |line: &LineString<f64>| {
            line.coords()
                .map(|c| vec![c.x, c.y])
                .collect::<Vec<_>>()
        };
        let mut rings = vec![ring(polygon.exterior())];
        rings.extend(polygon.interiors().iter().map(ring));
        Geometry::Polygon(rings)
    }

    /// Polygon geometry; a multipolygon is accepted only when it has a
    /// single part.
    pub fn to_polygon(self: &Self) -> Result<Polygon<f64>> {
        match self {
            Geometry::Polygon(rings) => polygon_from_rings(rings),
            Geometry::MultiPolygon(parts) if parts.len() == 1 => polygon_from_rings(&parts[0]),
            Geometry::MultiPolygon(parts) => Err(Error::InvalidGeometry(format!(
                "expected a single polygon, got a multipolygon with {} parts",
                parts.len()
            ))),
            Geometry::Point(_) => Err(Error::InvalidGeometry(
                "expected a polygon, got a point".to_string(),
            )),
        }
    }
}

fn coord(position: &[f64]) -> Result<Coord<f64>> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(Error::InvalidGeometry(format!(
            "position needs two coordinates, got {}",
            position.len()
        ))),
    }
}

fn line(ring: &[Vec<f64>]) -> Result<LineString<f64>> {
    let coords = ring
        .iter()
        .map(|position| coord(position))
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::new(coords))
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let (exterior, interiors) = rings
        .split_first()
        .ok_or(Error::InvalidGeometry("polygon without rings".to_string()))?;
    let interiors = interiors
        .iter()
        .map(|ring| line(ring))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(line(exterior)?, interiors))
}
