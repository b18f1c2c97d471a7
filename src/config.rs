//! TOML run configuration.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogSettings;
use crate::drive::DRIVE_API;
use crate::error::{Error, Result};
use crate::imagery::{
    DateRange, DispatchFlags, EARTH_ENGINE_API, LANDSAT_COLLECTION, STAC_SEARCH_API,
};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RunConfig {
    /// Text file of identifiers, split on `delimiter`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_fp: Option<PathBuf>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Identifiers listed inline, used when `id_fp` is not set.
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Parent folder, in the root of the remote store, holding one folder
    /// per glacier.
    #[serde(default = "default_folder_name")]
    pub folder_name: String,
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_catalog")]
    pub catalog: CatalogSettings,
    #[serde(default)]
    pub extraction: ExtractionSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub endpoints: Endpoints,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ExtractionSettings {
    #[serde(default = "default_begin_date")]
    pub begin_date: NaiveDate,
    /// Exclusive.
    #[serde(default = "default_end_date")]
    pub end_date: NaiveDate,
    /// Maximum cloud cover in percent, exclusive.
    #[serde(default = "default_cloud_tol")]
    pub cloud_tol: f64,
    #[serde(default)]
    pub flags: DispatchFlags,
}

/// Backoff between attempts at one glacier, in units of `unit_ms`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RetrySettings {
    #[serde(default = "default_min_delay")]
    pub min_delay: u32,
    #[serde(default = "default_max_delay")]
    pub max_delay: u32,
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Endpoints {
    #[serde(default = "default_drive")]
    pub drive: String,
    #[serde(default = "default_stac_search")]
    pub stac_search: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_earth_engine")]
    pub earth_engine: String,
    /// Cloud project the exports are billed to.
    #[serde(default)]
    pub project: String,
    /// AWS profile for an `s3://` catalog dataset; anonymous access if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,
}

fn default_delimiter() -> String {
    "\n".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_folder_name() -> String {
    "glaciers".to_string()
}

fn default_log_path() -> PathBuf {
    PathBuf::from("glacierInfo.csv")
}

fn default_token_path() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_max_concurrent() -> usize {
    1
}

fn default_catalog() -> CatalogSettings {
    CatalogSettings::new("joined/joined.geojson")
}

fn default_begin_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1984, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn default_end_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn default_cloud_tol() -> f64 {
    20.0
}

fn default_min_delay() -> u32 {
    2
}

fn default_max_delay() -> u32 {
    20
}

fn default_unit_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_drive() -> String {
    DRIVE_API.to_string()
}

fn default_stac_search() -> String {
    STAC_SEARCH_API.to_string()
}

fn default_collection() -> String {
    LANDSAT_COLLECTION.to_string()
}

fn default_earth_engine() -> String {
    EARTH_ENGINE_API.to_string()
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            begin_date: default_begin_date(),
            end_date: default_end_date(),
            cloud_tol: default_cloud_tol(),
            flags: DispatchFlags::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
            unit_ms: default_unit_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            drive: default_drive(),
            stac_search: default_stac_search(),
            collection: default_collection(),
            earth_engine: default_earth_engine(),
            project: String::new(),
            aws_profile: None,
            aws_region: None,
        }
    }
}

impl ExtractionSettings {
    pub fn range(self: &Self) -> Result<DateRange> {
        DateRange::new(self.begin_date, self.end_date)
    }
}

impl RunConfig {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn write<P: AsRef<Path>>(self: &Self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn from_template(table: &toml::Table) -> Result<Self> {
        let config: Self = toml::from_str(&table.to_string())?;
        Ok(config)
    }

    pub fn validate(self: &Self) -> Result<()> {
        self.extraction.range()?;
        if !(0.0..=100.0).contains(&self.extraction.cloud_tol) {
            return Err(Error::config(format!(
                "cloud_tol must be within [0, 100], got {}",
                self.extraction.cloud_tol
            )));
        }
        let scale_fact = self.catalog.scale_fact;
        if !scale_fact.is_finite() || scale_fact < 1.0 {
            return Err(Error::config(format!(
                "catalog.scale_fact must be at least 1.0, got {scale_fact}"
            )));
        }
        if self.max_concurrent == 0 {
            return Err(Error::config("max_concurrent must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.min_delay > self.retry.max_delay {
            return Err(Error::config("retry.min_delay exceeds retry.max_delay"));
        }
        Ok(())
    }

    pub fn identifier_source(self: &Self) -> IdentifierSource {
        match &self.id_fp {
            Some(path) => IdentifierSource::File {
                path: path.clone(),
                delimiter: self.delimiter.clone(),
            },
            None => IdentifierSource::List(self.ids.clone()),
        }
    }
}

/// Where the glacier identifiers of a run come from.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifierSource {
    List(Vec<String>),
    File { path: PathBuf, delimiter: String },
}

impl IdentifierSource {
    /// Identifiers in input order, trimmed, without empty entries.
    pub fn load(self: &Self) -> Result<Vec<String>> {
        let ids = match self {
            Self::List(ids) => clean(ids.iter().map(String::as_str)),
            Self::File { path, delimiter } => {
                if delimiter.is_empty() {
                    return Err(Error::config("identifier delimiter is empty"));
                }
                let content = fs::read_to_string(path)?;
                clean(content.split(delimiter.as_str()))
            }
        };
        Ok(ids)
    }
}

fn clean<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    ids.map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Template written by `glacier-extract template`.
pub fn template() -> toml::Table {
    toml::toml! {
        id_fp = "data/glacier_ids.txt"

        delimiter = ","

        data_dir = "data"

        folder_name = "glaciers"

        log_path = "glacierInfo.csv"

        token_path = "token.json"

        max_concurrent = 1

        [catalog]
        dataset = "joined/joined.geojson"
        id_column = "glac_id"
        drop_columns = ["GLIMS_ID", "WGMS_ID"]
        scale_fact = 1.1

        [[catalog.filters]]
        column = "PRIM_CLASSIFIC"
        equals = 5

        [extraction]
        begin_date = "1984-01-01"
        end_date = "2020-01-01"
        cloud_tol = 20.0

        [extraction.flags]
        imagery = true
        regional_dem = true
        high_res_dem = false
        coarse_dem_only = false

        [retry]
        min_delay = 2
        max_delay = 20
        unit_ms = 1000
        max_attempts = 5

        [endpoints]
        drive = "https://www.googleapis.com/drive/v3/"
        stac_search = "https://planetarycomputer.microsoft.com/api/stac/v1/search"
        collection = "landsat-c2-l2"
        earth_engine = "https://earthengine.googleapis.com/"
        project = "my-earth-engine-project"
    }
}
