//! Append-only CSV record of what was dispatched for each glacier.
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::GlacierRecord;
use crate::error::Result;
use crate::imagery::{DispatchReport, Sensor};

/// One row per processed glacier. List-valued columns hold JSON arrays.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ExtractionLogRow {
    pub glac_id: String,
    pub footprint: String,
    #[serde(rename = "L5Dates")]
    pub l5_dates: String,
    #[serde(rename = "L7Dates")]
    pub l7_dates: String,
    #[serde(rename = "L8Dates")]
    pub l8_dates: String,
    #[serde(rename = "fileaddress")]
    pub file_address: String,
    #[serde(rename = "drivefile_id")]
    pub folder_id: String,
}

impl ExtractionLogRow {
    pub fn new(record: &GlacierRecord, report: &DispatchReport, folder_id: &str) -> Result<Self> {
        let dates = |sensor: Sensor| -> Result<String> {
            let dates: Vec<String> = report
                .dates_for(sensor)
                .iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect();
            Ok(serde_json::to_string(&dates)?)
        };
        let footprint: Vec<[f64; 2]> = record
            .footprint
            .ring()
            .into_iter()
            .map(|(x, y)| [x, y])
            .collect();

        Ok(Self {
            glac_id: record.id.clone(),
            footprint: serde_json::to_string(&footprint)?,
            l5_dates: dates(Sensor::Landsat5)?,
            l7_dates: dates(Sensor::Landsat7)?,
            l8_dates: dates(Sensor::Landsat8)?,
            file_address: record.id.clone(),
            folder_id: folder_id.to_string(),
        })
    }

    pub fn dates(self: &Self, sensor: Sensor) -> Result<Vec<NaiveDate>> {
        let cell = match sensor {
            Sensor::Landsat5 => &self.l5_dates,
            Sensor::Landsat7 => &self.l7_dates,
            Sensor::Landsat8 => &self.l8_dates,
        };
        let dates: Vec<NaiveDate> = serde_json::from_str(cell)?;
        Ok(dates)
    }
}

pub struct ExtractionLog {
    path: PathBuf,
}

impl ExtractionLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(self: &Self) -> &Path {
        &self.path
    }

    /// Append a row. The header is written only when the file does not exist
    /// yet; existing content is never rewritten.
    pub fn append(self: &Self, row: &ExtractionLogRow) -> Result<()> {
        let exists = self.path.exists();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(!exists)
            .from_writer(file);
        writer.serialize(row)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_all(self: &Self) -> Result<Vec<ExtractionLogRow>> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<ExtractionLogRow>, _>>()?;
        Ok(rows)
    }
}
