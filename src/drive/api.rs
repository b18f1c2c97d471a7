use serde::Serialize;
use url::Url;

use super::{FolderApi, FolderPage, FolderQuery, RemoteFolder, FOLDER_MIME_TYPE};
use crate::error::Result;
use crate::session::{check_status, Session};

pub const DRIVE_API: &str = "https://www.googleapis.com/drive/v3/";

const LIST_FIELDS: &str = "nextPageToken, files(id, name, size, parents, createdTime)";
const CREATE_FIELDS: &str = "id, name, parents, createdTime";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewFolder<'a> {
    name: &'a str,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<&'a str>,
}

/// Google Drive v3 folders, including shared drives.
pub struct DriveFolders<'s> {
    session: &'s Session,
    files: Url,
}

impl<'s> DriveFolders<'s> {
    pub fn new(session: &'s Session, base_url: &str) -> Result<Self> {
        let files = Url::parse(base_url)?.join("files")?;
        Ok(Self { session, files })
    }

    fn list_url(self: &Self, query: &FolderQuery, page_token: Option<&str>) -> Url {
        let mut url = self.files.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", &query.to_drive_query())
                .append_pair("spaces", "drive")
                .append_pair("fields", LIST_FIELDS)
                .append_pair("supportsAllDrives", "true")
                .append_pair("includeItemsFromAllDrives", "true");
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }
        url
    }

    fn create_url(self: &Self) -> Url {
        let mut url = self.files.clone();
        url.query_pairs_mut()
            .append_pair("supportsAllDrives", "true")
            .append_pair("fields", CREATE_FIELDS);
        url
    }
}

impl FolderApi for DriveFolders<'_> {
    async fn list_folders(
        self: &Self,
        query: &FolderQuery,
        page_token: Option<&str>,
    ) -> Result<FolderPage> {
        let request = self.session.http().get(self.list_url(query, page_token));
        let response = self.session.authorized(request).send().await?;
        let page = check_status("drive files.list", response)
            .await?
            .json::<FolderPage>()
            .await?;
        Ok(page)
    }

    async fn create_folder(self: &Self, name: &str, parent: Option<&str>) -> Result<RemoteFolder> {
        let body = NewFolder {
            name,
            mime_type: FOLDER_MIME_TYPE,
            parents: parent.into_iter().collect(),
        };
        let request = self.session.http().post(self.create_url()).json(&body);
        let response = self.session.authorized(request).send().await?;
        let folder = check_status("drive files.create", response)
            .await?
            .json::<RemoteFolder>()
            .await?;
        Ok(folder)
    }
}
