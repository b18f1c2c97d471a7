//! In-memory stand-ins for the remote services, with call counters, queued
//! failures and recorded submissions.
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::catalog::{CatalogIndex, CatalogSettings, GlacierRecord, DEFAULT_SCALE_FACT};
use crate::drive::{FolderApi, FolderPage, FolderQuery, RemoteFolder};
use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Footprint};
use crate::imagery::{ExportJob, ExportService, ImageryCatalog, JobId, SceneItem, SearchRequest};
use crate::s3::{S3Object, S3Reader};

fn square(lon: f64, lat: f64, side: f64) -> Vec<(f64, f64)> {
    vec![
        (lon, lat),
        (lon + side, lat),
        (lon + side, lat + side),
        (lon, lat + side),
        (lon, lat),
    ]
}

/// GeoJSON feature for a square outline with its lower-left corner at
/// `(lon, lat)`, carrying `glac_id` plus the `extra` properties.
pub fn outline_feature(id: &str, lon: f64, lat: f64, side: f64, extra: Value) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("glac_id".to_string(), json!(id));
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }
    let ring: Vec<[f64; 2]> = square(lon, lat, side).into_iter().map(|(x, y)| [x, y]).collect();
    json!({
        "type": "Feature",
        "properties": properties,
        "geometry": {"type": "Polygon", "coordinates": [ring]},
    })
}

pub fn glacier(id: &str, lon: f64, lat: f64, side: f64) -> GlacierRecord {
    let footprint = Footprint::new(square(lon, lat, side)).unwrap();
    GlacierRecord {
        id: id.to_string(),
        bbox: BoundingBox::around(&footprint, DEFAULT_SCALE_FACT).unwrap(),
        footprint,
        attributes: BTreeMap::new(),
    }
}

pub fn catalog(glaciers: &[(&str, f64, f64, f64)]) -> CatalogIndex {
    let features: Vec<Value> = glaciers
        .iter()
        .map(|(id, lon, lat, side)| outline_feature(id, *lon, *lat, *side, json!({})))
        .collect();
    let dataset = json!({"type": "FeatureCollection", "features": features}).to_string();
    CatalogIndex::from_geojson_str(&dataset, &CatalogSettings::new("joined.geojson")).unwrap()
}

pub struct MockS3 {
    content: Vec<u8>,
    requested: Mutex<Vec<String>>,
}

impl MockS3 {
    pub fn new(content: String) -> Self {
        Self {
            content: content.into_bytes(),
            requested: Mutex::new(vec![]),
        }
    }

    pub fn requested(self: &Self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl S3Reader for MockS3 {
    async fn read_object(self: &Self, object: &S3Object) -> Result<Vec<u8>> {
        self.requested
            .lock()
            .unwrap()
            .push(format!("{}/{}", object.bucket, object.key));
        Ok(self.content.clone())
    }
}

/// Folder store paginating `page_size` folders per listing. Failures queued
/// with `fail_next` are returned by the next call of either kind, before it
/// is counted.
pub struct MockDrive {
    folders: Mutex<Vec<RemoteFolder>>,
    hidden: Mutex<Vec<RemoteFolder>>,
    page_size: usize,
    ignore_names: bool,
    hide_created: bool,
    list_calls: Mutex<usize>,
    create_calls: Mutex<usize>,
    failures: Mutex<VecDeque<Error>>,
}

impl MockDrive {
    pub fn new() -> Self {
        Self::with_folders(vec![], 2)
    }

    pub fn with_folders(folders: Vec<RemoteFolder>, page_size: usize) -> Self {
        Self {
            folders: Mutex::new(folders),
            hidden: Mutex::new(vec![]),
            page_size: page_size.max(1),
            ignore_names: false,
            hide_created: false,
            list_calls: Mutex::new(0),
            create_calls: Mutex::new(0),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Named listings return every folder under the parent.
    pub fn ignoring_names(mut self) -> Self {
        self.ignore_names = true;
        self
    }

    /// Created folders never show up in listings.
    pub fn hiding_created(mut self) -> Self {
        self.hide_created = true;
        self
    }

    pub fn fail_next(self: &Self, error: Error) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn list_calls(self: &Self) -> usize {
        *self.list_calls.lock().unwrap()
    }

    pub fn create_calls(self: &Self) -> usize {
        *self.create_calls.lock().unwrap()
    }

    /// Everything stored, including hidden folders.
    pub fn folders(self: &Self) -> Vec<RemoteFolder> {
        let mut folders = self.folders.lock().unwrap().clone();
        folders.extend(self.hidden.lock().unwrap().iter().cloned());
        folders
    }
}

impl FolderApi for MockDrive {
    async fn list_folders(
        self: &Self,
        query: &FolderQuery,
        page_token: Option<&str>,
    ) -> Result<FolderPage> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        *self.list_calls.lock().unwrap() += 1;

        let parent = query.parent().unwrap_or("root");
        let matching: Vec<RemoteFolder> = self
            .folders
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.parents.iter().any(|p| p == parent))
            .filter(|f| match query {
                FolderQuery::Named { name, .. } if !self.ignore_names => &f.name == name,
                _ => true,
            })
            .cloned()
            .collect();

        let start: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let end = (start + self.page_size).min(matching.len());
        let next_page_token = (end < matching.len()).then(|| end.to_string());
        Ok(FolderPage {
            folders: matching[start.min(end)..end].to_vec(),
            next_page_token,
        })
    }

    async fn create_folder(self: &Self, name: &str, parent: Option<&str>) -> Result<RemoteFolder> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut calls = self.create_calls.lock().unwrap();
        *calls += 1;
        let folder = RemoteFolder {
            id: format!("folder-{}", *calls),
            name: name.to_string(),
            parents: vec![parent.unwrap_or("root").to_string()],
            created: None,
        };
        if self.hide_created {
            self.hidden.lock().unwrap().push(folder.clone());
        } else {
            self.folders.lock().unwrap().push(folder.clone());
        }
        Ok(folder)
    }
}

/// Scene catalog that honours platform and date range but not the cloud
/// bound, so callers must filter clouds themselves.
pub struct MockCatalog {
    scenes: Mutex<Vec<(String, SceneItem)>>,
    searches: Mutex<Vec<SearchRequest>>,
    failures: Mutex<VecDeque<Error>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            scenes: Mutex::new(vec![]),
            searches: Mutex::new(vec![]),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    fn push(self: &Self, platform: &str, date: &str, cloud_cover: Option<f64>) {
        let scene = SceneItem {
            id: format!("{platform}_{date}"),
            acquired: date.parse().unwrap(),
            cloud_cover,
        };
        self.scenes
            .lock()
            .unwrap()
            .push((platform.to_string(), scene));
    }

    pub fn add_scene(self: &Self, platform: &str, date: &str, cloud_cover: f64) {
        self.push(platform, date, Some(cloud_cover));
    }

    pub fn add_scene_without_cloud(self: &Self, platform: &str, date: &str) {
        self.push(platform, date, None);
    }

    pub fn fail_next(self: &Self, error: Error) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn searches(self: &Self) -> Vec<SearchRequest> {
        self.searches.lock().unwrap().clone()
    }
}

impl ImageryCatalog for MockCatalog {
    async fn search(self: &Self, request: &SearchRequest) -> Result<Vec<SceneItem>> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.searches.lock().unwrap().push(request.clone());
        let scenes = self
            .scenes
            .lock()
            .unwrap()
            .iter()
            .filter(|(platform, scene)| {
                platform == &request.platform && request.range.contains(scene.acquired)
            })
            .map(|(_, scene)| scene.clone())
            .collect();
        Ok(scenes)
    }
}

pub struct MockExports {
    submitted: Mutex<Vec<ExportJob>>,
    failures: Mutex<VecDeque<Error>>,
}

impl MockExports {
    pub fn new() -> Self {
        Self {
            submitted: Mutex::new(vec![]),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn fail_next(self: &Self, error: Error) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn submitted(self: &Self) -> Vec<ExportJob> {
        self.submitted.lock().unwrap().clone()
    }
}

impl ExportService for MockExports {
    async fn submit(self: &Self, job: &ExportJob) -> Result<JobId> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(job.clone());
        Ok(JobId(format!("operations/{}", submitted.len())))
    }
}
