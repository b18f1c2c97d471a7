use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{FolderApi, FolderQuery, RemoteFolder};
use crate::error::{Error, Result};

type FolderKey = (String, Option<String>);

/// Name-based view over a [`FolderApi`].
///
/// Names are treated as unique within a parent. The store does not enforce
/// that, so lookups drain every page before deciding, and
/// [`get_or_create`](Self::get_or_create) serialises provisioning per
/// `(name, parent)` and remembers what it provisioned for the life of the
/// directory.
pub struct FolderDirectory<A: FolderApi> {
    api: A,
    locks: Mutex<HashMap<FolderKey, Arc<Mutex<()>>>>,
    provisioned: Mutex<HashMap<FolderKey, String>>,
}

impl<A: FolderApi> FolderDirectory<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            locks: Mutex::new(HashMap::new()),
            provisioned: Mutex::new(HashMap::new()),
        }
    }

    pub fn api(self: &Self) -> &A {
        &self.api
    }

    async fn drain(self: &Self, query: &FolderQuery) -> Result<Vec<RemoteFolder>> {
        let mut folders = vec![];
        let mut page_token: Option<String> = None;
        let mut pages = 0_usize;
        loop {
            let page = self.api.list_folders(query, page_token.as_deref()).await?;
            pages += 1;
            folders.extend(page.folders);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        log::debug!("Listed {} folders over {} pages", folders.len(), pages);
        Ok(folders)
    }

    /// Id of the folder called `name` directly under `parent`.
    ///
    /// When several folders share the name, the most recently created one
    /// wins; without creation times the last one listed wins.
    pub async fn find_folder_id(self: &Self, name: &str, parent: Option<&str>) -> Result<String> {
        let folders = self.drain(&FolderQuery::named(name, parent)).await?;
        let matches: Vec<&RemoteFolder> = folders
            .iter()
            .filter(|f| f.name == name)
            .filter(|f| match parent {
                Some(parent) => f.parents.is_empty() || f.parents.iter().any(|p| p == parent),
                None => true,
            })
            .collect();

        if matches.len() > 1 {
            log::warn!(
                "{} folders named '{}' under {}; using the newest",
                matches.len(),
                name,
                parent.unwrap_or("root")
            );
        }

        matches
            .into_iter()
            .enumerate()
            .max_by_key(|(i, f)| (f.created, *i))
            .map(|(_, f)| f.id.clone())
            .ok_or(Error::not_found("folder", describe(name, parent)))
    }

    /// Create a folder unconditionally. Prefer [`get_or_create`](Self::get_or_create).
    pub async fn create_folder(self: &Self, name: &str, parent: Option<&str>) -> Result<RemoteFolder> {
        let folder = self.api.create_folder(name, parent).await?;
        log::info!("Created folder {} ({})", describe(name, parent), folder.id);
        Ok(folder)
    }

    /// Name to id for every folder directly under `parent`, optionally
    /// restricted to `subset`. Always drains the full listing.
    pub async fn list_children(
        self: &Self,
        parent: Option<&str>,
        subset: Option<&[&str]>,
    ) -> Result<BTreeMap<String, String>> {
        let folders = self.drain(&FolderQuery::children(parent)).await?;
        let children = folders
            .into_iter()
            .filter(|f| subset.map_or(true, |names| names.contains(&f.name.as_str())))
            .map(|f| (f.name, f.id))
            .collect();
        Ok(children)
    }

    /// Find the folder, creating it only when it does not exist.
    pub async fn get_or_create(self: &Self, name: &str, parent: Option<&str>) -> Result<String> {
        let key: FolderKey = (name.to_string(), parent.map(str::to_string));
        let lock = Arc::clone(self.locks.lock().await.entry(key.clone()).or_default());
        let _guard = lock.lock().await;

        if let Some(id) = self.provisioned.lock().await.get(&key) {
            return Ok(id.clone());
        }

        let id = match self.find_folder_id(name, parent).await {
            Ok(id) => id,
            Err(e) if e.is_not_found() => self.create_folder(name, parent).await?.id,
            Err(e) => return Err(e),
        };
        self.provisioned.lock().await.insert(key, id.clone());
        Ok(id)
    }
}

fn describe(name: &str, parent: Option<&str>) -> String {
    format!("{}/{}", parent.unwrap_or("root"), name)
}
