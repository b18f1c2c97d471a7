//! Export dispatch: find qualifying scenes per sensor generation and submit
//! one-way export jobs for them, plus the elevation rasters.
mod dispatch;
mod export;
mod sensor;
mod stac_catalog;

pub use dispatch::{DispatchFlags, DispatchReport, Dispatcher, SCENE_SCALE};
pub use export::{EarthEngineExports, EARTH_ENGINE_API};
pub use sensor::{DateRange, ElevationDataset, Sensor};
pub use stac_catalog::{StacCatalog, LANDSAT_COLLECTION, STAC_SEARCH_API};

use std::fmt;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::Result;
use crate::geometry::BoundingBox;

/// One catalog search, scoped to a single platform.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub collection: String,
    pub platform: String,
    pub bbox: [f64; 4],
    pub range: DateRange,
    /// Exclusive upper bound on `eo:cloud_cover`, in percent.
    pub max_cloud_cover: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneItem {
    pub id: String,
    pub acquired: NaiveDate,
    pub cloud_cover: Option<f64>,
}

impl SceneItem {
    /// Earth Engine image id (`LC08_044034_20140318`) for a USGS product id
    /// (`LC08_L2SP_044034_20140318_20200911_02_T1`). Ids in any other form
    /// are returned unchanged.
    pub fn earth_engine_id(self: &Self) -> String {
        let re = Regex::new(
            r"^(?<sensor>L[CTEO]0\d)_[A-Z0-9]{4}_(?<path_row>\d{6})_(?<acquired>\d{8})(_\d{8})?_\d{2}_[A-Z0-9]{2}$",
        )
        .expect("Regex pattern should always compile");
        match re.captures(&self.id) {
            Some(caps) => format!("{}_{}_{}", &caps["sensor"], &caps["path_row"], &caps["acquired"]),
            None => self.id.clone(),
        }
    }
}

/// Remote scene enumeration with date, bounds and cloud filters.
pub trait ImageryCatalog {
    async fn search(self: &Self, request: &SearchRequest) -> Result<Vec<SceneItem>>;
}

impl<T: ImageryCatalog> ImageryCatalog for &T {
    async fn search(self: &Self, request: &SearchRequest) -> Result<Vec<SceneItem>> {
        (**self).search(request).await
    }
}

/// Handle returned for a submitted export. Completion is never awaited.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(self: &Self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single raster written to a folder of the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportJob {
    /// Image asset id to export.
    pub source: String,
    /// Destination folder name. Earth Engine resolves Drive folders by name,
    /// creating one at the Drive root when none matches.
    pub folder_name: String,
    /// Provisioned folder the name refers to.
    pub folder_id: String,
    pub output_name: String,
    /// Output resolution in metres.
    pub scale: f64,
    pub region: BoundingBox,
    /// Bands to keep; empty keeps all of them.
    pub bands: Vec<String>,
}

pub trait ExportService {
    async fn submit(self: &Self, job: &ExportJob) -> Result<JobId>;
}

impl<T: ExportService> ExportService for &T {
    async fn submit(self: &Self, job: &ExportJob) -> Result<JobId> {
        (**self).submit(job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(id: &str) -> SceneItem {
        SceneItem {
            id: id.to_string(),
            acquired: NaiveDate::from_ymd_opt(2014, 3, 18).unwrap(),
            cloud_cover: Some(1.0),
        }
    }

    #[test]
    fn test_earth_engine_id_from_product_id() {
        assert_eq!(
            scene("LC08_L1TP_044034_20140318_20200911_02_T1").earth_engine_id(),
            "LC08_044034_20140318"
        );
        assert_eq!(
            scene("LE07_L2SP_140041_20020110_02_T1").earth_engine_id(),
            "LE07_140041_20020110"
        );
    }

    #[test]
    fn test_earth_engine_id_passthrough() {
        assert_eq!(scene("LC08_044034_20140318").earth_engine_id(), "LC08_044034_20140318");
    }
}
