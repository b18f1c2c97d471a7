//! Spatial catalog: the pre-joined glacier dataset, indexed by identifier.
//!
//! The index is built once per process and queried read-only afterwards.
//! Building the joined dataset itself is an offline step, see [`join`].
pub mod geojson;
pub mod join;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Footprint};
use crate::s3::{S3Object, S3Reader};
use self::geojson::FeatureCollection;

pub const DEFAULT_SCALE_FACT: f64 = 1.1;

/// How to read the joined dataset.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct CatalogSettings {
    /// Path relative to the data directory, or an S3 url.
    pub dataset: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Columns that never become record attributes, besides the id column.
    #[serde(default = "default_drop_columns")]
    pub drop_columns: Vec<String>,
    #[serde(default = "default_scale_fact")]
    pub scale_fact: f64,
    #[serde(default)]
    pub filters: Vec<AttributeFilter>,
}

/// Keep only rows whose `column` equals `equals`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct AttributeFilter {
    pub column: String,
    pub equals: Value,
}

fn default_id_column() -> String {
    "glac_id".to_string()
}

fn default_drop_columns() -> Vec<String> {
    vec!["GLIMS_ID".to_string(), "WGMS_ID".to_string()]
}

fn default_scale_fact() -> f64 {
    DEFAULT_SCALE_FACT
}

impl CatalogSettings {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            id_column: default_id_column(),
            drop_columns: default_drop_columns(),
            scale_fact: default_scale_fact(),
            filters: vec![],
        }
    }
}

impl AttributeFilter {
    fn matches(self: &Self, properties: &serde_json::Map<String, Value>) -> bool {
        properties
            .get(&self.column)
            .map(|value| values_match(value, &self.equals))
            .unwrap_or(false)
    }
}

/// Loose equality so that `5`, `5.0` and `"5"` agree, as they do once a
/// shapefile has been round-tripped through a few tools.
fn values_match(a: &Value, b: &Value) -> bool {
    let as_number = |v: &Value| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// One glacier as seen by the rest of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GlacierRecord {
    pub id: String,
    pub footprint: Footprint,
    pub bbox: BoundingBox,
    pub attributes: BTreeMap<String, Value>,
}

impl GlacierRecord {
    pub fn to_json(self: &Self) -> Value {
        let ring = |points: Vec<(f64, f64)>| {
            points
                .into_iter()
                .map(|(x, y)| serde_json::json!([x, y]))
                .collect::<Vec<_>>()
        };
        serde_json::json!({
            "glac_id": self.id,
            "coords": ring(self.footprint.ring()),
            "bbox": ring(self.bbox.ring()),
            "attributes": self.attributes,
        })
    }
}

#[derive(Debug, Clone)]
struct CatalogRow {
    footprint: Footprint,
    attributes: BTreeMap<String, Value>,
}

/// In-memory dataset keyed by glacier identifier. Exactly one row per
/// identifier; later rows replace earlier ones.
#[derive(Debug, Clone)]
pub struct CatalogIndex {
    rows: HashMap<String, CatalogRow>,
    scale_fact: f64,
}

impl CatalogIndex {
    pub fn from_features(collection: FeatureCollection, settings: &CatalogSettings) -> Self {
        let mut rows = HashMap::new();
        let mut skipped = 0_usize;

        for feature in collection.features {
            if !settings.filters.iter().all(|f| f.matches(&feature.properties)) {
                skipped += 1;
                continue;
            }
            let Some(id) = feature.property_str(&settings.id_column) else {
                log::warn!("Skipping feature without '{}'", settings.id_column);
                skipped += 1;
                continue;
            };
            let Some(geometry) = feature.geometry.as_ref() else {
                log::warn!("Skipping glacier {id} without geometry");
                skipped += 1;
                continue;
            };
            let footprint = match geometry
                .to_polygon()
                .and_then(Footprint::from_polygon)
            {
                Ok(footprint) => footprint,
                Err(e) => {
                    log::warn!("Skipping glacier {id}: {e}");
                    skipped += 1;
                    continue;
                }
            };

            let attributes = feature
                .properties
                .into_iter()
                .filter(|(key, _)| key != &settings.id_column && !settings.drop_columns.contains(key))
                .collect();

            rows.insert(id, CatalogRow { footprint, attributes });
        }

        log::debug!("Catalog indexed {} glaciers ({} rows skipped)", rows.len(), skipped);
        Self {
            rows,
            scale_fact: settings.scale_fact,
        }
    }

    pub fn from_geojson_str(content: &str, settings: &CatalogSettings) -> Result<Self> {
        let collection: FeatureCollection = serde_json::from_str(content)?;
        Ok(Self::from_features(collection, settings))
    }

    /// Read the dataset from the local filesystem, relative to `data_dir`.
    pub fn read<P: AsRef<Path>>(data_dir: P, settings: &CatalogSettings) -> Result<Self> {
        let path = data_dir.as_ref().join(&settings.dataset);
        log::info!("Loading glacier catalog from {}", path.display());
        let content = fs::read_to_string(&path)?;
        Self::from_geojson_str(&content, settings)
    }

    /// Read the dataset from an S3 object.
    pub async fn fetch(reader: &impl S3Reader, settings: &CatalogSettings) -> Result<Self> {
        let object = S3Object::from_url(&settings.dataset)?;
        log::info!("Loading glacier catalog from s3://{}/{}", object.bucket, object.key);
        let data = reader.read_object(&object).await?;
        let content = String::from_utf8(data).map_err(Error::dataset)?;
        Self::from_geojson_str(&content, settings)
    }

    pub fn len(self: &Self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(self: &Self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(self: &Self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    /// Keep only the requested identifiers.
    pub fn subset<S: AsRef<str>>(self: &Self, ids: &[S]) -> Self {
        let rows = ids
            .iter()
            .filter_map(|id| {
                let id = id.as_ref();
                self.rows.get(id).map(|row| (id.to_string(), row.clone()))
            })
            .collect();
        Self {
            rows,
            scale_fact: self.scale_fact,
        }
    }

    /// Record for `id`, with its bounding box padded by the catalog's scale
    /// factor.
    pub fn query(self: &Self, id: &str) -> Result<GlacierRecord> {
        let row = self.rows.get(id).ok_or(Error::not_found("glacier", id))?;
        Ok(GlacierRecord {
            id: id.to_string(),
            footprint: row.footprint.clone(),
            bbox: BoundingBox::around(&row.footprint, self.scale_fact)?,
            attributes: row.attributes.clone(),
        })
    }
}
