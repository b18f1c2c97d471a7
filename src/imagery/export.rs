use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

use super::{ExportJob, ExportService, JobId};
use crate::error::Result;
use crate::session::{check_status, Session};

pub const EARTH_ENGINE_API: &str = "https://earthengine.googleapis.com/";

/// Long-running operation returned by `image:export`.
#[derive(Deserialize)]
struct Operation {
    name: String,
}

/// Earth Engine REST exports to Drive. Submission returns as soon as the
/// task is queued.
pub struct EarthEngineExports<'s> {
    session: &'s Session,
    export_url: Url,
}

impl<'s> EarthEngineExports<'s> {
    pub fn new(session: &'s Session, base_url: &str, project: &str) -> Result<Self> {
        let export_url =
            Url::parse(base_url)?.join(&format!("v1/projects/{project}/image:export"))?;
        Ok(Self {
            session,
            export_url,
        })
    }
}

fn invoke(function: &str, arguments: Value) -> Value {
    json!({
        "functionInvocationValue": {
            "functionName": function,
            "arguments": arguments,
        }
    })
}

fn reference(node: &str) -> Value {
    json!({ "valueReference": node })
}

/// Serialized expression graph for load, select bands, clip to the region
/// and resample.
fn expression(job: &ExportJob) -> Value {
    let mut values = Map::new();
    values.insert(
        "image".to_string(),
        invoke("Image.load", json!({"id": {"constantValue": job.source}})),
    );

    let mut input = "image";
    if !job.bands.is_empty() {
        values.insert(
            "bands".to_string(),
            invoke(
                "Image.select",
                json!({
                    "input": reference("image"),
                    "bandSelectors": {"constantValue": job.bands},
                }),
            ),
        );
        input = "bands";
    }

    let ring: Vec<[f64; 2]> = job.region.ring().into_iter().map(|(x, y)| [x, y]).collect();
    values.insert(
        "region".to_string(),
        invoke(
            "GeometryConstructors.Polygon",
            json!({"coordinates": {"constantValue": [ring]}}),
        ),
    );
    values.insert(
        "result".to_string(),
        invoke(
            "Image.clipToBoundsAndScale",
            json!({
                "input": reference(input),
                "geometry": reference("region"),
                "scale": {"constantValue": job.scale},
            }),
        ),
    );

    json!({ "result": "result", "values": values })
}

fn export_request(job: &ExportJob) -> Value {
    json!({
        "expression": expression(job),
        "description": job.output_name,
        "fileExportOptions": {
            "fileFormat": "GEO_TIFF",
            "driveDestination": {
                "folder": job.folder_name,
                "filenamePrefix": job.output_name,
            },
        },
    })
}

impl ExportService for EarthEngineExports<'_> {
    async fn submit(self: &Self, job: &ExportJob) -> Result<JobId> {
        let request = self
            .session
            .http()
            .post(self.export_url.clone())
            .json(&export_request(job));
        let response = self.session.authorized(request).send().await?;
        let operation = check_status("earth engine image:export", response)
            .await?
            .json::<Operation>()
            .await?;
        log::debug!(
            "Queued export {} into {} ({}) as {}",
            job.output_name,
            job.folder_name,
            job.folder_id,
            operation.name
        );
        Ok(JobId(operation.name))
    }
}
