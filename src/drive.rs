//! Remote folder store: a hierarchical namespace of folders addressed by
//! opaque ids, listed page by page.
mod api;
mod directory;

pub use api::{DriveFolders, DRIVE_API};
pub use directory::FolderDirectory;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Result;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Alias the store uses for the top of the namespace.
const ROOT_ALIAS: &str = "root";

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default, rename = "createdTime")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct FolderPage {
    #[serde(default, rename = "files")]
    pub folders: Vec<RemoteFolder>,
    #[serde(default, rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// What to list. A `None` parent is the root of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderQuery {
    Named { name: String, parent: Option<String> },
    Children { parent: Option<String> },
}

impl FolderQuery {
    pub fn named(name: &str, parent: Option<&str>) -> Self {
        Self::Named {
            name: name.to_string(),
            parent: parent.map(str::to_string),
        }
    }

    pub fn children(parent: Option<&str>) -> Self {
        Self::Children {
            parent: parent.map(str::to_string),
        }
    }

    pub fn parent(self: &Self) -> Option<&str> {
        match self {
            Self::Named { parent, .. } | Self::Children { parent } => parent.as_deref(),
        }
    }

    /// Drive `files.list` search expression.
    pub fn to_drive_query(self: &Self) -> String {
        let parent = escape(self.parent().unwrap_or(ROOT_ALIAS));
        let mut q = format!(
            "mimeType = '{FOLDER_MIME_TYPE}' and trashed = false and '{parent}' in parents"
        );
        if let Self::Named { name, .. } = self {
            q.push_str(&format!(" and name = '{}'", escape(name)));
        }
        q
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// The two calls the folder store offers.
pub trait FolderApi {
    async fn list_folders(
        self: &Self,
        query: &FolderQuery,
        page_token: Option<&str>,
    ) -> Result<FolderPage>;

    async fn create_folder(self: &Self, name: &str, parent: Option<&str>) -> Result<RemoteFolder>;
}

impl<T: FolderApi> FolderApi for &T {
    async fn list_folders(
        self: &Self,
        query: &FolderQuery,
        page_token: Option<&str>,
    ) -> Result<FolderPage> {
        (**self).list_folders(query, page_token).await
    }

    async fn create_folder(self: &Self, name: &str, parent: Option<&str>) -> Result<RemoteFolder> {
        (**self).create_folder(name, parent).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_query() {
        let query = FolderQuery::named("G1", Some("abc123"));
        assert_eq!(
            query.to_drive_query(),
            "mimeType = 'application/vnd.google-apps.folder' and trashed = false \
             and 'abc123' in parents and name = 'G1'"
        );
    }

    #[test]
    fn test_children_of_root() {
        let query = FolderQuery::children(None);
        assert!(query.to_drive_query().ends_with("'root' in parents"));
    }

    #[test]
    fn test_names_are_escaped() {
        let query = FolderQuery::named(r"O'Brien\glacier", None);
        assert!(query
            .to_drive_query()
            .ends_with(r"name = 'O\'Brien\\glacier'"));
    }

    #[test]
    fn test_parse_drive_page() {
        let page: FolderPage = serde_json::from_str(
            r#"{
                "nextPageToken": "~!!~AI9FV7",
                "files": [
                    {"id": "1a", "name": "glaciers", "parents": ["0AB"], "createdTime": "2020-03-01T10:00:00.000Z"},
                    {"id": "1b", "name": "G1"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("~!!~AI9FV7"));
        assert_eq!(page.folders.len(), 2);
        assert!(page.folders[0].created.is_some());
        assert!(page.folders[1].parents.is_empty());
    }
}
