use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    DateRange, ElevationDataset, ExportJob, ExportService, ImageryCatalog, JobId, SearchRequest,
    Sensor,
};
use crate::catalog::GlacierRecord;
use crate::error::{Error, Result};

/// Output resolution of scene exports, in metres.
pub const SCENE_SCALE: f64 = 30.0;

/// Which exports a dispatch submits.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchFlags {
    /// Landsat scenes, one export per kept scene.
    #[serde(default = "enabled")]
    pub imagery: bool,
    #[serde(default = "enabled")]
    pub regional_dem: bool,
    #[serde(default)]
    pub high_res_dem: bool,
    /// Only the coarse elevation raster; everything else is skipped.
    #[serde(default)]
    pub coarse_dem_only: bool,
}

fn enabled() -> bool {
    true
}

impl Default for DispatchFlags {
    fn default() -> Self {
        Self {
            imagery: true,
            regional_dem: true,
            high_res_dem: false,
            coarse_dem_only: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Acquisition dates of the submitted scene exports, per sensor.
    pub dates: BTreeMap<Sensor, Vec<NaiveDate>>,
    pub elevation: Vec<ElevationDataset>,
    /// Every submitted job, in submission order.
    pub jobs: Vec<JobId>,
}

impl DispatchReport {
    pub fn dates_for(self: &Self, sensor: Sensor) -> &[NaiveDate] {
        self.dates.get(&sensor).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn scene_count(self: &Self) -> usize {
        self.dates.values().map(Vec::len).sum()
    }
}

pub struct Dispatcher<C: ImageryCatalog, E: ExportService> {
    catalog: C,
    exports: E,
    collection: String,
}

impl<C: ImageryCatalog, E: ExportService> Dispatcher<C, E> {
    pub fn new(catalog: C, exports: E, collection: impl Into<String>) -> Self {
        Self {
            catalog,
            exports,
            collection: collection.into(),
        }
    }

    /// Submit every export for one glacier. Jobs are queued, never awaited,
    /// and nothing is deduplicated: dispatching twice submits twice.
    pub async fn dispatch(
        self: &Self,
        record: &GlacierRecord,
        folder_id: &str,
        range: &DateRange,
        cloud_tol: f64,
        flags: &DispatchFlags,
    ) -> Result<DispatchReport> {
        if !(0.0..=100.0).contains(&cloud_tol) {
            return Err(Error::config(format!(
                "cloud tolerance must be a percentage in [0, 100], got {cloud_tol}"
            )));
        }
        let mut report = DispatchReport::default();

        if flags.coarse_dem_only {
            self.submit_elevation(record, folder_id, ElevationDataset::Coarse, &mut report)
                .await?;
            return Ok(report);
        }

        if flags.imagery {
            for sensor in Sensor::ALL {
                self.dispatch_sensor(sensor, record, folder_id, range, cloud_tol, &mut report)
                    .await?;
            }
        }

        if flags.regional_dem {
            self.submit_elevation(record, folder_id, ElevationDataset::Regional, &mut report)
                .await?;
        }
        if flags.high_res_dem {
            self.submit_elevation(record, folder_id, ElevationDataset::HighRes, &mut report)
                .await?;
        }
        Ok(report)
    }

    async fn dispatch_sensor(
        self: &Self,
        sensor: Sensor,
        record: &GlacierRecord,
        folder_id: &str,
        range: &DateRange,
        cloud_tol: f64,
        report: &mut DispatchReport,
    ) -> Result<()> {
        let Some(window) = range.intersect(&sensor.window()) else {
            log::debug!("{}: {} is outside {}", record.id, range, sensor);
            return Ok(());
        };

        let request = SearchRequest {
            collection: self.collection.clone(),
            platform: sensor.platform().to_string(),
            bbox: record.bbox.bounds(),
            range: window,
            max_cloud_cover: cloud_tol,
        };
        let scenes = self.catalog.search(&request).await?;
        let found = scenes.len();

        let mut dates = vec![];
        for scene in scenes {
            let clear = scene.cloud_cover.is_some_and(|cloud| cloud < cloud_tol);
            if !clear || !window.contains(scene.acquired) {
                continue;
            }
            let output_name = scene.acquired.format("%Y-%m-%d").to_string();
            let job = ExportJob {
                source: format!("{}/{}", sensor.export_collection(), scene.earth_engine_id()),
                folder_name: record.id.clone(),
                folder_id: folder_id.to_string(),
                output_name,
                scale: SCENE_SCALE,
                region: record.bbox,
                bands: sensor.bands().iter().map(|b| b.to_string()).collect(),
            };
            report.jobs.push(self.exports.submit(&job).await?);
            dates.push(scene.acquired);
        }

        log::info!(
            "{}: {} scenes sent to Drive ({} found in {}, cloud < {})",
            record.id,
            dates.len(),
            found,
            sensor,
            cloud_tol
        );
        report.dates.insert(sensor, dates);
        Ok(())
    }

    async fn submit_elevation(
        self: &Self,
        record: &GlacierRecord,
        folder_id: &str,
        dataset: ElevationDataset,
        report: &mut DispatchReport,
    ) -> Result<()> {
        let job = ExportJob {
            source: dataset.asset_id().to_string(),
            folder_name: record.id.clone(),
            folder_id: folder_id.to_string(),
            output_name: dataset.output_name(),
            scale: dataset.scale(),
            region: record.bbox,
            bands: vec![],
        };
        report.jobs.push(self.exports.submit(&job).await?);
        report.elevation.push(dataset);
        log::info!("{}: {} sent to Drive", record.id, dataset.asset_id());
        Ok(())
    }
}
