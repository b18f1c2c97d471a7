use std::future::Future;

use reqwest::Client;
use serde_json::{json, Value};
use stac::{Item, ItemCollection};
use url::Url;

use super::{DateRange, ImageryCatalog, SceneItem, SearchRequest};
use crate::error::{Error, Result};
use crate::session::check_status;

pub const STAC_SEARCH_API: &str = "https://planetarycomputer.microsoft.com/api/stac/v1/search";
pub const LANDSAT_COLLECTION: &str = "landsat-c2-l2";

const PAGE_LIMIT: usize = 250;
const COLLECTION_CATEGORY: &str = "T1";

impl SceneItem {
    pub fn from_item(item: &Item) -> Result<Self> {
        let properties = serde_json::to_value(&item.properties)?;
        let datetime = properties
            .get("datetime")
            .and_then(Value::as_str)
            .or_else(|| properties.get("start_datetime").and_then(Value::as_str))
            .ok_or(Error::dataset(format!("item {} has no datetime", item.id)))?;
        let acquired = chrono::DateTime::parse_from_rfc3339(datetime)?.date_naive();
        let cloud_cover = properties.get("eo:cloud_cover").and_then(Value::as_f64);

        Ok(Self {
            id: item.id.to_owned(),
            acquired,
            cloud_cover,
        })
    }
}

/// STAC API item search, following `next` links until exhausted.
pub struct StacCatalog<'c> {
    http: &'c Client,
    search_url: Url,
}

impl<'c> StacCatalog<'c> {
    pub fn new(http: &'c Client, search_url: &str) -> Result<Self> {
        Ok(Self {
            http,
            search_url: Url::parse(search_url)?,
        })
    }

    async fn fetch_page(self: &Self, request: PageRequest) -> Result<ItemCollection> {
        let builder = match request {
            PageRequest::Get(href) => self.http.get(href),
            PageRequest::Post { href, body } => self.http.post(href).json(&body),
        };
        let response = check_status("stac search", builder.send().await?).await?;
        let page: ItemCollection = response.json().await?;
        Ok(page)
    }
}

/// Search body for a request. STAC datetime intervals are closed, so the
/// exclusive end becomes the last second of the previous day. Only tier 1
/// scenes have a counterpart in the export collections.
fn search_body(request: &SearchRequest) -> Value {
    json!({
        "collections": [request.collection],
        "bbox": request.bbox,
        "datetime": datetime_interval(&request.range),
        "query": {
            "platform": {"eq": request.platform},
            "landsat:collection_category": {"eq": COLLECTION_CATEGORY},
            "eo:cloud_cover": {"lt": request.max_cloud_cover},
        },
        "sortby": [{"field": "properties.datetime", "direction": "asc"}],
        "limit": PAGE_LIMIT,
    })
}

fn datetime_interval(range: &DateRange) -> String {
    let end = range
        .last_day()
        .map(|day| format!("{day}T23:59:59Z"))
        .unwrap_or("..".to_string());
    format!("{}T00:00:00Z/{}", range.begin, end)
}

/// One page of a search.
#[derive(Debug, Clone, PartialEq)]
enum PageRequest {
    Get(String),
    Post { href: String, body: Value },
}

/// Request for the page after `page`, if any. A POST link without a body
/// repeats `body`; with `merge` set its body is laid over `body`.
fn next_request(page: &ItemCollection, body: &Value) -> Result<Option<PageRequest>> {
    for link in &page.links {
        let link = serde_json::to_value(link)?;
        if link.get("rel").and_then(Value::as_str) != Some("next") {
            continue;
        }
        let Some(href) = link.get("href").and_then(Value::as_str) else {
            continue;
        };
        let method = link
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();
        if method != "POST" {
            return Ok(Some(PageRequest::Get(href.to_string())));
        }

        let merge = link.get("merge").and_then(Value::as_bool).unwrap_or(false);
        let next_body = match link.get("body") {
            None | Some(Value::Null) => body.clone(),
            Some(link_body) if merge => merged(body, link_body),
            Some(link_body) => link_body.clone(),
        };
        return Ok(Some(PageRequest::Post {
            href: href.to_string(),
            body: next_body,
        }));
    }
    Ok(None)
}

fn merged(base: &Value, overlay: &Value) -> Value {
    let mut merged = base.clone();
    if let (Some(target), Some(fields)) = (merged.as_object_mut(), overlay.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Fetch pages starting at `first` until no `next` link remains.
async fn collect_scenes<F, Fut>(
    first: PageRequest,
    body: &Value,
    mut fetch: F,
) -> Result<Vec<SceneItem>>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<ItemCollection>>,
{
    let mut scenes = vec![];
    let mut next = Some(first);
    while let Some(request) = next {
        let page = fetch(request).await?;
        for item in &page.items {
            match SceneItem::from_item(item) {
                Ok(scene) => scenes.push(scene),
                Err(e) => log::warn!("Skipping STAC item {}: {}", item.id, e),
            }
        }
        next = next_request(&page, body)?;
    }
    Ok(scenes)
}

impl ImageryCatalog for StacCatalog<'_> {
    async fn search(self: &Self, request: &SearchRequest) -> Result<Vec<SceneItem>> {
        let body = search_body(request);
        let first = PageRequest::Post {
            href: self.search_url.to_string(),
            body: body.clone(),
        };
        let scenes = collect_scenes(first, &body, |page| self.fetch_page(page)).await?;

        log::debug!(
            "{} {} scenes in {}",
            scenes.len(),
            request.platform,
            request.range
        );
        Ok(scenes)
    }
}
