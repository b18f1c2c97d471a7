//! Offline construction of the joined glacier dataset.
//!
//! Glacier outlines (one polygon per observation) are reduced to the most
//! recent observation per identifier, then inner-joined with inventory points
//! of valley glaciers: an outline is kept when it intersects at least one
//! point, and that point's attributes are merged into its properties.
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use geo::{Intersects, Point};
use serde_json::{Map, Value};

use super::geojson::{Feature, FeatureCollection, Geometry};
use crate::error::{Error, Result};

/// Inventory columns carried over into the joined dataset.
pub const WANTED_COLUMNS: [&str; 7] = [
    "POLITICAL_UNIT",
    "NAME",
    "WGMS_ID",
    "LATITUDE",
    "LONGITUDE",
    "PRIM_CLASSIFIC",
    "GLIMS_ID",
];

const VALLEY_GLACIER: i64 = 5;
const ANALYSIS_TIME: &str = "anlys_time";

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryPoint {
    pub location: Point<f64>,
    pub attributes: Map<String, Value>,
}

/// Read inventory points from CSV, keeping valley glaciers only. Cells are
/// decoded lossily since inventory exports are often latin-1.
pub fn read_inventory_points<R: Read>(reader: R) -> Result<Vec<InventoryPoint>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim().to_string())
        .collect();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or(Error::dataset(format!("inventory is missing column {name}")))
    };
    let (lat_col, lon_col, class_col) = (
        column("LATITUDE")?,
        column("LONGITUDE")?,
        column("PRIM_CLASSIFIC")?,
    );

    let mut points = vec![];
    for record in reader.byte_records() {
        let record = record?;
        let cell = |i: usize| {
            record
                .get(i)
                .map(|b| String::from_utf8_lossy(b).trim().to_string())
                .unwrap_or_default()
        };

        if cell(class_col).parse::<f64>().ok() != Some(VALLEY_GLACIER as f64) {
            continue;
        }
        let (Ok(lat), Ok(lon)) = (cell(lat_col).parse::<f64>(), cell(lon_col).parse::<f64>())
        else {
            log::warn!("Skipping inventory row with unreadable coordinates");
            continue;
        };

        let attributes = headers
            .iter()
            .enumerate()
            .filter(|(i, name)| {
                WANTED_COLUMNS.contains(&name.as_str()) && *i != lat_col && *i != lon_col
            })
            .map(|(i, name)| (name.clone(), cell_value(&cell(i))))
            .collect();

        points.push(InventoryPoint {
            location: Point::new(lon, lat),
            attributes,
        });
    }
    Ok(points)
}

fn cell_value(cell: &str) -> Value {
    if let Ok(n) = cell.parse::<i64>() {
        return Value::from(n);
    }
    match cell.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::from(f),
        _ => Value::String(cell.to_string()),
    }
}

/// Keep the most recent outline per identifier, ordered by `anlys_time`
/// when present; otherwise the last one read wins. The analysis time column
/// is dropped from the output.
pub fn latest_outlines(collection: FeatureCollection, id_column: &str) -> Vec<Feature> {
    let mut order: Vec<String> = vec![];
    let mut latest: HashMap<String, (Option<String>, Feature)> = HashMap::new();

    for mut feature in collection.features {
        let Some(id) = feature.property_str(id_column) else {
            continue;
        };
        let analysed = feature.property_str(ANALYSIS_TIME);
        feature.properties.remove(ANALYSIS_TIME);

        match latest.get(&id) {
            None => order.push(id.clone()),
            // ISO timestamps order lexicographically
            Some((Some(previous), _)) if analysed.as_ref().is_some_and(|t| t < previous) => {
                continue
            }
            Some(_) => {}
        }
        latest.insert(id, (analysed, feature));
    }

    order
        .into_iter()
        .filter_map(|id| latest.remove(&id).map(|(_, feature)| feature))
        .collect()
}

/// Inner join of outlines with inventory points by intersection. Outlines
/// without a usable single polygon are skipped.
pub fn spatial_join(
    outlines: Vec<Feature>,
    points: &[InventoryPoint],
    id_column: &str,
) -> FeatureCollection {
    let mut joined = vec![];
    let mut seen: HashMap<String, usize> = HashMap::new();

    for mut outline in outlines {
        let id = outline.property_str(id_column).unwrap_or_default();
        let Some(geometry) = outline.geometry.as_ref() else {
            log::warn!("Skipping outline {id} without geometry");
            continue;
        };
        let polygon = match geometry.to_polygon() {
            Ok(polygon) => polygon,
            Err(e) => {
                log::warn!("Skipping outline {id}: {e}");
                continue;
            }
        };
        let Some(point) = points.iter().find(|p| polygon.intersects(&p.location)) else {
            continue;
        };

        for (key, value) in &point.attributes {
            outline
                .properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        outline.geometry = Some(Geometry::from_polygon(&polygon));

        match seen.get(&id) {
            Some(&i) => joined[i] = outline,
            None => {
                seen.insert(id, joined.len());
                joined.push(outline);
            }
        }
    }
    FeatureCollection::new(joined)
}

/// Read outlines and inventory from disk, join them and write the result as
/// GeoJSON. Returns the number of joined glaciers.
pub fn build_joined<P: AsRef<Path>>(
    outlines_path: P,
    points_path: P,
    output_path: P,
    id_column: &str,
) -> Result<usize> {
    let outlines: FeatureCollection = serde_json::from_str(&fs::read_to_string(outlines_path)?)?;
    log::info!("Read {} outline observations", outlines.features.len());
    let outlines = latest_outlines(outlines, id_column);

    let points = read_inventory_points(fs::File::open(points_path)?)?;
    log::info!("Read {} valley glacier inventory points", points.len());

    let joined = spatial_join(outlines, &points, id_column);
    let output_path = output_path.as_ref();
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, serde_json::to_string(&joined)?)?;

    log::info!(
        "Wrote {} joined glaciers to {}",
        joined.features.len(),
        output_path.display()
    );
    Ok(joined.features.len())
}
