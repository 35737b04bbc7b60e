//! Microsoft Graph drive item types.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DriveItem {
    pub id: String,
    pub name: String,
    /// Present when the item is a folder
    pub folder: Option<FolderFacet>,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolderFacet {
    #[serde(rename = "childCount", default)]
    pub child_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct ChildrenResponse {
    #[serde(default)]
    pub value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}
